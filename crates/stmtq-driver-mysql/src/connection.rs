//! MySQL connection implementation

use async_trait::async_trait;
use chrono::{Datelike, Timelike};
use mysql_async::{
    Conn, Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts, Row as MySqlRow,
    consts::ColumnType, prelude::*,
};
use std::sync::atomic::{AtomicBool, Ordering};
use stmtq_core::{
    ColumnMeta, Connection, DatabaseConfig, QueryResult, Result, Row, StmtqError, Value,
};

use crate::proxy::{ProxyHeader, ProxyRelay};

/// Pooled MySQL connection
pub struct MySqlConnection {
    pool: Pool,
    /// Keeps the PROXY relay alive for as long as the pool may dial through it
    _relay: Option<ProxyRelay>,
    closed: AtomicBool,
}

impl MySqlConnection {
    /// Connect to the store described by `config`.
    ///
    /// When `ppv2_enabled` is set every pooled socket goes through a local relay
    /// that writes the PROXY v2 header carrying `client_ip` first.
    #[tracing::instrument(skip(config), fields(host = %config.host, port = config.port, database = %config.database))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;

        let relay = if config.ppv2_enabled {
            let header = ProxyHeader::for_client_ip(&config.client_ip)
                .map_err(|e| StmtqError::Configuration(e.to_string()))?;
            let upstream = format!("{}:{}", config.host, config.port);
            let relay = ProxyRelay::start(upstream, header).await.map_err(|e| {
                StmtqError::Connection(format!("Failed to start PROXY relay: {}", e))
            })?;
            Some(relay)
        } else {
            None
        };

        let (host, port) = match &relay {
            Some(relay) => (relay.local_addr().ip().to_string(), relay.local_addr().port()),
            None => (config.host.clone(), config.port),
        };

        let constraints = PoolConstraints::new(1, config.max_open_conns).ok_or_else(|| {
            StmtqError::Configuration(format!(
                "Failed to configure MySQL pool constraints (min=1, max={})",
                config.max_open_conns
            ))
        })?;
        let pool_opts = PoolOpts::default()
            .with_constraints(constraints)
            .with_abs_conn_ttl(Some(config.conn_max_lifetime()));

        let mut opts_builder = OptsBuilder::from_opts(Opts::default())
            .ip_or_hostname(host)
            .tcp_port(port)
            .pool_opts(pool_opts);
        if !config.database.is_empty() {
            opts_builder = opts_builder.db_name(Some(config.database.clone()));
        }
        if !config.username.is_empty() {
            opts_builder = opts_builder.user(Some(config.username.clone()));
        }
        if !config.password.is_empty() {
            opts_builder = opts_builder.pass(Some(config.password.clone()));
        }

        let pool = Pool::new(Opts::from(opts_builder));

        // Verify connectivity by acquiring and releasing a connection
        let conn = tokio::time::timeout(config.connect_timeout(), pool.get_conn())
            .await
            .map_err(|_| {
                StmtqError::Connection(format!(
                    "Timed out connecting to MySQL after {}s",
                    config.connect_timeout_secs
                ))
            })?
            .map_err(|e| StmtqError::Connection(format!("Failed to connect to MySQL: {}", e)))?;
        drop(conn);

        tracing::info!(
            max_open_conns = config.max_open_conns,
            proxy_header = config.ppv2_enabled,
            "MySQL connection established"
        );
        Ok(Self {
            pool,
            _relay: relay,
            closed: AtomicBool::new(false),
        })
    }

    async fn get_conn(&self) -> Result<Conn> {
        if self.is_closed() {
            return Err(StmtqError::Connection("connection pool is closed".into()));
        }
        self.pool
            .get_conn()
            .await
            .map_err(|e| StmtqError::Connection(format!("Failed to get MySQL connection: {}", e)))
    }
}

/// Convert a bound parameter to the wire value
fn value_to_mysql(value: &Value) -> mysql_async::Value {
    match value {
        Value::Null => mysql_async::Value::NULL,
        Value::Bool(v) => mysql_async::Value::Int(*v as i64),
        Value::Int64(v) => mysql_async::Value::Int(*v),
        Value::UInt64(v) => mysql_async::Value::UInt(*v),
        Value::Float64(v) => mysql_async::Value::Double(*v),
        Value::Decimal(v) | Value::String(v) => mysql_async::Value::Bytes(v.clone().into_bytes()),
        Value::Bytes(v) => mysql_async::Value::Bytes(v.clone()),
        Value::Date(d) => {
            mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
        Value::DateTime(dt) => mysql_async::Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        ),
        Value::Json(v) => mysql_async::Value::Bytes(v.to_string().into_bytes()),
    }
}

/// Convert mysql_async Value to our Value type, using column type metadata
/// to interpret byte strings.
fn mysql_value_to_value(val: mysql_async::Value, col_type: ColumnType) -> Value {
    match val {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => match String::from_utf8(bytes) {
            Ok(s) => match col_type {
                ColumnType::MYSQL_TYPE_TINY
                | ColumnType::MYSQL_TYPE_SHORT
                | ColumnType::MYSQL_TYPE_LONG
                | ColumnType::MYSQL_TYPE_LONGLONG
                | ColumnType::MYSQL_TYPE_INT24
                | ColumnType::MYSQL_TYPE_YEAR => {
                    s.parse::<i64>().map(Value::Int64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
                    s.parse::<f64>().map(Value::Float64).unwrap_or(Value::String(s))
                }
                ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
                    Value::Decimal(s)
                }
                _ => Value::String(s),
            },
            Err(e) => Value::Bytes(e.into_bytes()),
        },
        mysql_async::Value::Int(i) => Value::Int64(i),
        mysql_async::Value::UInt(u) => Value::UInt64(u),
        mysql_async::Value::Float(f) => Value::Float64(f as f64),
        mysql_async::Value::Double(d) => Value::Float64(d),
        mysql_async::Value::Date(year, month, day, hour, min, sec, micro) => {
            let date = chrono::NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32);
            let is_date_only = matches!(col_type, ColumnType::MYSQL_TYPE_DATE);
            match date {
                Some(date) if is_date_only => Value::Date(date),
                Some(date) => date
                    .and_hms_micro_opt(hour as u32, min as u32, sec as u32, micro)
                    .map(Value::DateTime)
                    .unwrap_or_else(|| Value::Date(date)),
                None => Value::String(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, min, sec
                )),
            }
        }
        mysql_async::Value::Time(negative, days, hours, mins, secs, micros) => {
            let total_hours = days * 24 + hours as u32;
            let sign = if negative { "-" } else { "" };
            Value::String(format!(
                "{}{:02}:{:02}:{:02}.{:06}",
                sign, total_hours, mins, secs, micros
            ))
        }
    }
}

fn rows_to_result(mysql_rows: Vec<MySqlRow>) -> (Vec<ColumnMeta>, Vec<Row>) {
    let mut columns = Vec::new();
    let mut column_names = Vec::new();
    let mut column_types = Vec::new();

    if let Some(first_row) = mysql_rows.first() {
        for (idx, col) in first_row.columns_ref().iter().enumerate() {
            let name = col.name_str().to_string();
            column_names.push(name.clone());
            column_types.push(col.column_type());
            columns.push(ColumnMeta {
                name,
                data_type: format!("{:?}", col.column_type()),
                ordinal: idx,
            });
        }
    }

    let rows = mysql_rows
        .into_iter()
        .map(|mysql_row| {
            let values = (0..column_names.len())
                .map(|idx| {
                    let mysql_val: mysql_async::Value =
                        mysql_row.get(idx).unwrap_or(mysql_async::Value::NULL);
                    let col_type = column_types
                        .get(idx)
                        .copied()
                        .unwrap_or(ColumnType::MYSQL_TYPE_STRING);
                    mysql_value_to_value(mysql_val, col_type)
                })
                .collect();
            Row::new(column_names.clone(), values)
        })
        .collect();

    (columns, rows)
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>(), params = params.len()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let mut conn = self.get_conn().await?;

        let fetched = if params.is_empty() {
            conn.query::<MySqlRow, _>(sql).await
        } else {
            let bound = Params::Positional(params.iter().map(value_to_mysql).collect());
            conn.exec::<MySqlRow, _, _>(sql, bound).await
        };
        let mysql_rows =
            fetched.map_err(|e| StmtqError::Query(format!("Failed to execute query: {}", e)))?;

        let (columns, rows) = rows_to_result(mysql_rows);
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms,
        })
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("closing MySQL connection pool");
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|e| StmtqError::Connection(format!("Failed to close MySQL connection: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bound_values_keep_their_type() {
        assert_eq!(value_to_mysql(&Value::Null), mysql_async::Value::NULL);
        assert_eq!(value_to_mysql(&Value::UInt64(5)), mysql_async::Value::UInt(5));
        assert_eq!(
            value_to_mysql(&Value::from("acct1' OR 1=1 --")),
            mysql_async::Value::Bytes(b"acct1' OR 1=1 --".to_vec())
        );
    }

    #[test]
    fn test_datetime_parameter_carries_micros() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 25)
            .and_then(|d| d.and_hms_micro_opt(18, 40, 16, 250))
            .expect("valid timestamp");
        assert_eq!(
            value_to_mysql(&Value::DateTime(ts)),
            mysql_async::Value::Date(2024, 3, 25, 18, 40, 16, 250)
        );
    }

    #[test]
    fn test_text_protocol_values_follow_column_type() {
        let bytes = |s: &str| mysql_async::Value::Bytes(s.as_bytes().to_vec());

        assert_eq!(
            mysql_value_to_value(bytes("42"), ColumnType::MYSQL_TYPE_LONGLONG),
            Value::Int64(42)
        );
        assert_eq!(
            mysql_value_to_value(bytes("1.2500"), ColumnType::MYSQL_TYPE_NEWDECIMAL),
            Value::Decimal("1.2500".into())
        );
        assert_eq!(
            mysql_value_to_value(bytes("[4,1,2]"), ColumnType::MYSQL_TYPE_JSON),
            Value::String("[4,1,2]".into())
        );
    }

    #[test]
    fn test_binary_datetime_conversion() {
        let value = mysql_value_to_value(
            mysql_async::Value::Date(2024, 3, 25, 18, 40, 16, 0),
            ColumnType::MYSQL_TYPE_DATETIME,
        );
        assert_eq!(value.to_string(), "2024-03-25 18:40:16");

        let date = mysql_value_to_value(
            mysql_async::Value::Date(2024, 3, 25, 0, 0, 0, 0),
            ColumnType::MYSQL_TYPE_DATE,
        );
        assert!(matches!(date, Value::Date(_)));
    }
}
