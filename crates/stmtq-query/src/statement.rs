//! Statement record model
//!
//! One `StatementInfo` is one row of `system.statement_info`, materialized
//! fresh per call from whatever subset of columns the projection selected.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use stmtq_core::{Result, Row, StmtqError, Value};

/// How the client reached the service that executed the statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnType {
    #[default]
    Unknown = 0,
    Internal = 1,
    External = 2,
}

impl ConnType {
    /// Decode the numeric tag stored in the stats array; unknown tags map to `Unknown`
    pub fn from_f64(raw: f64) -> Self {
        match raw as i64 {
            1 => ConnType::Internal,
            2 => ConnType::External,
            _ => ConnType::Unknown,
        }
    }

    pub fn as_f64(self) -> f64 {
        self as i64 as f64
    }
}

/// Execution statistics, stored as a single JSON array column.
///
/// The first seven elements have fixed meaning; anything after them is kept
/// in `extra` so versioned payloads survive a round trip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stats {
    pub version: f64,
    pub time_consumed: f64,
    pub memory_size: f64,
    pub s3_io_input: f64,
    pub s3_io_output: f64,
    pub network_io: f64,
    pub conn_type: ConnType,
    pub extra: Vec<f64>,
}

const FIXED_STATS_LEN: usize = 7;

impl Stats {
    pub fn from_array(raw: &[f64]) -> Self {
        let at = |idx: usize| raw.get(idx).copied().unwrap_or_default();
        Self {
            version: at(0),
            time_consumed: at(1),
            memory_size: at(2),
            s3_io_input: at(3),
            s3_io_output: at(4),
            network_io: at(5),
            conn_type: ConnType::from_f64(at(6)),
            extra: raw.iter().skip(FIXED_STATS_LEN).copied().collect(),
        }
    }

    pub fn to_array(&self) -> Vec<f64> {
        let mut raw = vec![
            self.version,
            self.time_consumed,
            self.memory_size,
            self.s3_io_input,
            self.s3_io_output,
            self.network_io,
            self.conn_type.as_f64(),
        ];
        raw.extend_from_slice(&self.extra);
        raw
    }

    /// Element `idx` of the stored array (`$[idx]` in SQL)
    pub fn element(&self, idx: usize) -> Option<f64> {
        match idx {
            0 => Some(self.version),
            1 => Some(self.time_consumed),
            2 => Some(self.memory_size),
            3 => Some(self.s3_io_input),
            4 => Some(self.s3_io_output),
            5 => Some(self.network_io),
            6 => Some(self.conn_type.as_f64()),
            _ => self.extra.get(idx - FIXED_STATS_LEN).copied(),
        }
    }

    /// Parse the JSON text stored in the `stats` column
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Serialize for Stats {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}

/// Numbers pass through, quoted numbers are parsed, anything else reads as 0
fn stats_element(element: &serde_json::Value) -> f64 {
    match element {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or_default(),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    }
}

impl<'de> Deserialize<'de> for Stats {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw: Vec<f64> = Vec::<serde_json::Value>::deserialize(deserializer)?
            .iter()
            .map(stats_element)
            .collect();
        Ok(Stats::from_array(&raw))
    }
}

/// One execution-trace row
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatementInfo {
    pub statement_id: String,
    pub transaction_id: String,
    pub session_id: String,
    pub account: String,
    pub user: String,
    pub host: String,
    pub database: String,
    pub statement: String,
    pub statement_tag: String,
    pub statement_fingerprint: String,
    pub node_uuid: String,
    pub node_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_at: Option<NaiveDateTime>,
    /// Nanoseconds; recomputed at query time for running statements
    pub duration: u64,
    pub status: String,
    #[serde(rename = "error_code")]
    pub err_code: String,
    pub error: String,
    pub exec_plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_read: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_scan: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    pub statement_type: String,
    pub query_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_id: Option<u64>,
    pub sql_source_type: String,
    pub result_count: i64,
    /// Present only when CU enrichment was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cu: Option<f64>,
    pub plan: String,
}

impl StatementInfo {
    /// Materialize a record from a result row.
    ///
    /// Columns the projection did not select keep their defaults; columns
    /// this model does not know (e.g. from the joined cost table) are ignored.
    pub fn from_row(row: &Row) -> Result<Self> {
        let mut record = StatementInfo::default();
        for (name, value) in row.columns().iter().zip(row.values.iter()) {
            match name.as_str() {
                "statement_id" => record.statement_id = text(value),
                "transaction_id" => record.transaction_id = text(value),
                "session_id" => record.session_id = text(value),
                "account" => record.account = text(value),
                "user" => record.user = text(value),
                "host" => record.host = text(value),
                "database" => record.database = text(value),
                "statement" => record.statement = text(value),
                "statement_tag" => record.statement_tag = text(value),
                "statement_fingerprint" => record.statement_fingerprint = text(value),
                "node_uuid" => record.node_uuid = text(value),
                "node_type" => record.node_type = text(value),
                "request_at" => record.request_at = value.as_datetime(),
                "response_at" => record.response_at = value.as_datetime(),
                "duration" => record.duration = non_negative(value),
                "status" => record.status = text(value),
                "err_code" => record.err_code = text(value),
                "error" => record.error = text(value),
                "exec_plan" => record.exec_plan = text(value),
                "rows_read" => record.rows_read = value.as_u64(),
                "bytes_scan" => record.bytes_scan = value.as_u64(),
                "stats" => record.stats = stats(value)?,
                "statement_type" => record.statement_type = text(value),
                "query_type" => record.query_type = text(value),
                "role_id" => record.role_id = value.as_u64(),
                "sql_source_type" => record.sql_source_type = text(value),
                "result_count" => record.result_count = value.as_i64().unwrap_or_default(),
                "cu" => record.cu = value.as_f64(),
                "plan" => record.plan = text(value),
                _ => {}
            }
        }
        Ok(record)
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| other.to_string()),
    }
}

fn non_negative(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_i64().map(|v| v.max(0) as u64))
        .or_else(|| value.as_f64().map(|v| v.max(0.0) as u64))
        .unwrap_or_default()
}

fn stats(value: &Value) -> Result<Option<Stats>> {
    match value {
        Value::Null => Ok(None),
        Value::Json(json) => Ok(Some(serde_json::from_value(json.clone())?)),
        other => match other.as_str() {
            Some(text) if text.trim().is_empty() => Ok(None),
            Some(text) => Stats::parse(text).map(Some),
            None => Err(StmtqError::Query(format!(
                "unexpected value for stats column: {}",
                other
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use stmtq_core::QueryResult;

    #[test]
    fn test_stats_array_layout() {
        let stats = Stats::parse("[4, 10.5, 2048, 1, 2, 3, 2, 0, 0.125]").expect("valid stats");

        assert_eq!(stats.version, 4.0);
        assert_eq!(stats.memory_size, 2048.0);
        assert_eq!(stats.conn_type, ConnType::External);
        assert_eq!(stats.element(8), Some(0.125));
        assert_eq!(stats.element(9), None);
        assert_eq!(
            serde_json::to_string(&stats).expect("serialize"),
            "[4.0,10.5,2048.0,1.0,2.0,3.0,2.0,0.0,0.125]"
        );
    }

    #[test]
    fn test_short_stats_array_defaults() {
        let stats = Stats::parse("[1, 5]").expect("valid stats");
        assert_eq!(stats.time_consumed, 5.0);
        assert_eq!(stats.conn_type, ConnType::Unknown);
        assert!(stats.extra.is_empty());
    }

    #[test]
    fn test_stats_elements_read_leniently() {
        let stats = Stats::parse(r#"[4, "10.5", null, " 1 ", "n/a", 3, "2", true]"#).expect("array still decodes");
        assert_eq!(stats.version, 4.0);
        assert_eq!(stats.time_consumed, 10.5);
        assert_eq!(stats.memory_size, 0.0);
        assert_eq!(stats.s3_io_input, 1.0);
        assert_eq!(stats.s3_io_output, 0.0);
        assert_eq!(stats.conn_type, ConnType::External);
        assert_eq!(stats.extra, vec![0.0]);
    }

    #[test]
    fn test_conn_type_unknown_tag() {
        assert_eq!(ConnType::from_f64(7.0), ConnType::Unknown);
        assert_eq!(ConnType::from_f64(1.0), ConnType::Internal);
    }

    #[test]
    fn test_from_row_partial_projection() {
        let result = QueryResult::from_rows(
            vec![
                "statement_id".into(),
                "statement".into(),
                "status".into(),
                "duration".into(),
                "rows_read".into(),
                "stats".into(),
                "cu".into(),
                "tmpcu_only".into(),
            ],
            vec![vec![
                Value::from("018eb819-4048-7e69-aaa6-feb99965eb97"),
                Value::from("select 1"),
                Value::from("Success"),
                Value::Int64(1_500),
                Value::Null,
                Value::from("[3, 1, 1, 0, 0, 0, 1]"),
                Value::Decimal("0.0420".into()),
                Value::from("ignored"),
            ]],
        );

        let record = StatementInfo::from_row(&result.rows[0]).expect("decodes");
        assert_eq!(record.statement_id, "018eb819-4048-7e69-aaa6-feb99965eb97");
        assert_eq!(record.duration, 1_500);
        assert_eq!(record.rows_read, None);
        assert_eq!(record.cu, Some(0.042));
        assert_eq!(record.stats.map(|s| s.conn_type), Some(ConnType::Internal));
        assert!(record.account.is_empty());
    }

    #[test]
    fn test_negative_running_duration_clamps_to_zero() {
        let result = QueryResult::from_rows(vec!["duration".into()], vec![vec![Value::Int64(-3)]]);
        let record = StatementInfo::from_row(&result.rows[0]).expect("decodes");
        assert_eq!(record.duration, 0);
    }

    #[test]
    fn test_malformed_stats_is_an_error() {
        let result = QueryResult::from_rows(vec!["stats".into()], vec![vec![Value::from("{oops")]]);
        assert!(matches!(
            StatementInfo::from_row(&result.rows[0]),
            Err(StmtqError::Serialization(_))
        ));
    }
}
