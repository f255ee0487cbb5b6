//! PROXY protocol v2 support
//!
//! Multi-tenant deployments attribute queries to the original client by having
//! the connection announce a declared source address before any MySQL traffic.
//! `mysql_async` dials its own sockets, so the header is injected by a local
//! relay: the pool connects to the relay on loopback, and every accepted socket
//! is forwarded to the real server after the header has been written.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Fixed 12-byte signature that opens every v2 header
const SIGNATURE: [u8; 12] = [
    0x0D, 0x0A, 0x0D, 0x0A, 0x00, 0x0D, 0x0A, 0x51, 0x55, 0x49, 0x54, 0x0A,
];
/// Version 2, PROXY command
const VERSION_PROXY: u8 = 0x21;
const TCP_OVER_IPV4: u8 = 0x11;
const TCP_OVER_IPV6: u8 = 0x21;

/// Timeout for dialing the upstream server
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Error types for PROXY header injection
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid client IP: {0:?}")]
    InvalidClientIp(String),

    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        source: std::io::Error,
    },

    #[error("timed out dialing {0}")]
    DialTimeout(String),

    #[error("proxy relay I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A PROXY v2 header for a TCP stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyHeader {
    source: SocketAddr,
    destination: SocketAddr,
}

impl ProxyHeader {
    /// Header declaring `client_ip` as the source, with a dummy loopback destination
    pub fn for_client_ip(client_ip: &str) -> Result<Self, ProxyError> {
        let ip: IpAddr = client_ip
            .trim()
            .parse()
            .map_err(|_| ProxyError::InvalidClientIp(client_ip.to_string()))?;
        let destination = match ip {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
        };
        Ok(Self {
            source: SocketAddr::new(ip, 0),
            destination: SocketAddr::new(destination, 0),
        })
    }

    pub fn source(&self) -> SocketAddr {
        self.source
    }

    /// Encode the binary header
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + 36);
        buf.extend_from_slice(&SIGNATURE);
        buf.push(VERSION_PROXY);

        match (self.source.ip(), self.destination.ip()) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                buf.push(TCP_OVER_IPV4);
                buf.extend_from_slice(&12u16.to_be_bytes());
                buf.extend_from_slice(&src.octets());
                buf.extend_from_slice(&dst.octets());
            }
            (src, dst) => {
                buf.push(TCP_OVER_IPV6);
                buf.extend_from_slice(&36u16.to_be_bytes());
                buf.extend_from_slice(&to_v6(src).octets());
                buf.extend_from_slice(&to_v6(dst).octets());
            }
        }
        buf.extend_from_slice(&self.source.port().to_be_bytes());
        buf.extend_from_slice(&self.destination.port().to_be_bytes());
        buf
    }
}

fn to_v6(ip: IpAddr) -> Ipv6Addr {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    }
}

/// Dial `addr` and write the header before returning the stream
pub async fn dial_with_header(addr: &str, header: &ProxyHeader) -> Result<TcpStream, ProxyError> {
    let mut stream = tokio::time::timeout(DIAL_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| ProxyError::DialTimeout(addr.to_string()))?
        .map_err(|source| ProxyError::Dial {
            addr: addr.to_string(),
            source,
        })?;
    stream.write_all(&header.encode()).await?;
    Ok(stream)
}

/// Loopback relay that prefixes every forwarded connection with a PROXY header.
///
/// The accept loop is aborted when the relay is dropped.
pub struct ProxyRelay {
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

impl ProxyRelay {
    /// Bind an ephemeral loopback port and start forwarding to `upstream`
    pub async fn start(upstream: String, header: ProxyHeader) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, %upstream, source = %header.source(), "PROXY v2 relay started");

        let accept_task = tokio::spawn(async move {
            loop {
                let (inbound, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!(error = %e, "PROXY relay accept failed");
                        continue;
                    }
                };
                let upstream = upstream.clone();
                tokio::spawn(async move {
                    if let Err(e) = forward(inbound, &upstream, &header).await {
                        tracing::warn!(error = %e, %peer, "PROXY relay connection closed with error");
                    }
                });
            }
        });

        Ok(Self {
            local_addr,
            accept_task,
        })
    }

    /// Loopback address the pool should connect to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Drop for ProxyRelay {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn forward(mut inbound: TcpStream, upstream: &str, header: &ProxyHeader) -> Result<(), ProxyError> {
    let mut outbound = dial_with_header(upstream, header).await?;
    let (up, down) = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await?;
    tracing::trace!(bytes_up = up, bytes_down = down, "PROXY relay connection finished");
    Ok(())
}
