//! Caller intents for list and point-lookup queries

use chrono::NaiveDateTime;

use crate::predicate::{Predicate, TimeRange};
use crate::projection::Projection;

/// Comment tag used when the caller does not supply one
pub const DEFAULT_SQL_COMMENT: &str = "cloud_nonuser";

/// Page size used when the caller does not supply one
pub const DEFAULT_LIMIT: u64 = 20;

/// Leading `/* tag */` comment attached to every statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlComment(String);

impl SqlComment {
    /// A closing `*/` inside the tag would end the comment early, so it is broken up
    pub fn new(tag: impl Into<String>) -> Self {
        let tag: String = tag.into();
        Self(tag.trim().replace("*/", "* /"))
    }

    pub fn none() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `/* tag */ ` or nothing for an empty tag
    pub fn prefix(&self) -> String {
        if self.0.is_empty() {
            String::new()
        } else {
            format!("/* {} */ ", self.0)
        }
    }
}

impl Default for SqlComment {
    fn default() -> Self {
        Self::new(DEFAULT_SQL_COMMENT)
    }
}

/// CU enrichment switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CuOptions {
    /// The caller wants the `cu` column
    pub requested: bool,
    /// Deployment has the precomputed cost side table
    pub statement_cu_enabled: bool,
}

impl CuOptions {
    pub fn new(requested: bool, statement_cu_enabled: bool) -> Self {
        Self {
            requested,
            statement_cu_enabled,
        }
    }

    /// The side-table join needs both switches
    pub fn joins_side_table(&self) -> bool {
        self.requested && self.statement_cu_enabled
    }
}

/// A paged list request over the trace table
#[derive(Debug, Clone)]
pub struct StatementQuery {
    pub projection: Projection,
    pub predicate: Predicate,
    pub join_predicate: Predicate,
    pub order_by: String,
    pub limit: u64,
    pub offset: u64,
    /// Lower CU bound, applied on the outer query when CU is requested
    pub min_cu: Option<u64>,
    pub cu: CuOptions,
    pub comment: SqlComment,
}

impl StatementQuery {
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            ..Self::default()
        }
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_join_predicate(mut self, join_predicate: Predicate) -> Self {
        self.join_predicate = join_predicate;
        self
    }

    pub fn with_order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = order_by.into();
        self
    }

    pub fn with_page(mut self, limit: u64, offset: u64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn with_min_cu(mut self, min_cu: u64) -> Self {
        self.min_cu = Some(min_cu);
        self
    }

    pub fn with_cu(mut self, cu: CuOptions) -> Self {
        self.cu = cu;
        self
    }

    pub fn with_comment(mut self, comment: SqlComment) -> Self {
        self.comment = comment;
        self
    }

    /// Effective CU threshold: zero means no filter
    pub(crate) fn cu_threshold(&self) -> Option<u64> {
        if self.cu.requested {
            self.min_cu.filter(|min| *min > 0)
        } else {
            None
        }
    }
}

impl Default for StatementQuery {
    fn default() -> Self {
        Self {
            projection: Projection::statement_columns(),
            predicate: Predicate::new(),
            join_predicate: Predicate::new(),
            order_by: String::new(),
            limit: DEFAULT_LIMIT,
            offset: 0,
            min_cu: None,
            cu: CuOptions::default(),
            comment: SqlComment::default(),
        }
    }
}

/// A point lookup of one statement
#[derive(Debug, Clone)]
pub struct StatementLookup {
    pub statement_id: String,
    pub account: String,
    pub request_at: TimeRange,
    /// Upper bound on the side table's response time
    pub response_end: Option<NaiveDateTime>,
    /// `None` is rejected before any query is issued
    pub projection: Option<Projection>,
    pub cu: CuOptions,
    pub comment: SqlComment,
}

impl StatementLookup {
    pub fn new(statement_id: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            statement_id: statement_id.into(),
            account: account.into(),
            request_at: TimeRange::default(),
            response_end: None,
            projection: Some(Projection::statement_columns()),
            cu: CuOptions::default(),
            comment: SqlComment::default(),
        }
    }

    pub fn with_request_at(mut self, range: TimeRange) -> Self {
        self.request_at = range;
        self
    }

    pub fn with_response_end(mut self, response_end: Option<NaiveDateTime>) -> Self {
        self.response_end = response_end;
        self
    }

    pub fn with_projection(mut self, projection: Option<Projection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_cu(mut self, cu: CuOptions) -> Self {
        self.cu = cu;
        self
    }

    pub fn with_comment(mut self, comment: SqlComment) -> Self {
        self.comment = comment;
        self
    }
}
