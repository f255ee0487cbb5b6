//! Projection composition and the compute-unit rule
//!
//! Each statement's compute-unit cost comes from one of three places, decided
//! per row: nothing while it is still running, the value recorded in its stats
//! when the stats layout is new enough, otherwise an estimate from the stats
//! and duration. The same decision exists in SQL (for the projection) and in
//! Rust (for records that were fetched without it).

use stmtq_core::{Result, StmtqError};

use crate::statement::{StatementInfo, Stats};

/// Status of a statement that has not finished
pub const RUNNING_STATUS: &str = "Running";
/// First stats layout version that records its own CU
pub const RECORDED_CU_MIN_VERSION: f64 = 4.0;
/// Index of the recorded CU in the stats array
pub const RECORDED_CU_INDEX: usize = 8;
/// Output column of the CU expression
pub const CU_COLUMN: &str = "cu";

/// Default column list for statement queries
const STATEMENT_COLUMNS: &str = "`statement`, system.statement_info.statement_id, \
IF(`status`='Running', TIMESTAMPDIFF(MICROSECOND,`request_at`,now())*1000, `duration`) AS `duration`, \
`status`, `request_at`, system.statement_info.response_at, `user`, system.statement_info.account, \
`database`, `transaction_id`, `session_id`, `rows_read`, `bytes_scan`, `stats`, `error`, `err_code`, \
`result_count`";

/// Where a row's CU comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CuSource {
    /// Still running: no cost yet
    Pending,
    /// Stats carry the CU the engine recorded
    Recorded,
    /// Estimated from stats and duration
    Estimated,
}

impl CuSource {
    pub fn decide(status: &str, stats: Option<&Stats>) -> Self {
        if status == RUNNING_STATUS {
            CuSource::Pending
        } else if stats.is_some_and(|s| s.version >= RECORDED_CU_MIN_VERSION) {
            CuSource::Recorded
        } else {
            CuSource::Estimated
        }
    }

    /// The value this source yields for `stats`, when it can be computed locally.
    ///
    /// `Estimated` needs the server-side cost model and is never computed here.
    pub fn local_value(self, stats: Option<&Stats>) -> Option<f64> {
        match self {
            CuSource::Recorded => stats.and_then(|s| s.element(RECORDED_CU_INDEX)),
            CuSource::Pending | CuSource::Estimated => None,
        }
    }

    fn sql_arm(self) -> String {
        match self {
            CuSource::Pending => "NULL".to_string(),
            CuSource::Recorded => format!("JSON_UNQUOTE(JSON_EXTRACT(stats, '$[{}]'))", RECORDED_CU_INDEX),
            CuSource::Estimated => "mo_cu_v1(stats, duration)".to_string(),
        }
    }

    /// The three-way rule as a projected column named `cu`
    pub fn sql_expression() -> String {
        let finished = format!(
            "CAST(IF(JSON_UNQUOTE(JSON_EXTRACT(stats, '$[0]')) >= {}, {}, {}) AS DECIMAL(32,4))",
            RECORDED_CU_MIN_VERSION,
            CuSource::Recorded.sql_arm(),
            CuSource::Estimated.sql_arm(),
        );
        format!(
            "IF(status = '{}', {}, {}) AS `{}`",
            RUNNING_STATUS,
            CuSource::Pending.sql_arm(),
            finished,
            CU_COLUMN
        )
    }
}

impl StatementInfo {
    pub fn cu_source(&self) -> CuSource {
        CuSource::decide(&self.status, self.stats.as_ref())
    }
}

/// A caller's column list, optionally extended with the CU expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    columns: String,
}

impl Projection {
    pub fn new(columns: impl Into<String>) -> Self {
        Self {
            columns: columns.into(),
        }
    }

    /// The column list used when the caller does not pick one
    pub fn statement_columns() -> Self {
        Self::new(STATEMENT_COLUMNS)
    }

    pub fn columns(&self) -> &str {
        &self.columns
    }

    /// Final select list; the CU column is appended only when requested
    pub fn compose(&self, with_cu: bool) -> Result<String> {
        let base = self.columns.trim();
        if base.is_empty() {
            return Err(StmtqError::InvalidParams("projection is empty".to_string()));
        }
        if with_cu {
            Ok(format!("{}, {}", base, CuSource::sql_expression()))
        } else {
            Ok(base.to_string())
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::statement_columns()
    }
}
