//! MySQL-protocol connection for stmtq

mod connection;
mod proxy;

pub use connection::MySqlConnection;
pub use proxy::{DIAL_TIMEOUT, ProxyError, ProxyHeader, ProxyRelay, dial_with_header};
