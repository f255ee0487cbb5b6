//! Predicate assembly
//!
//! A [`Predicate`] is an ordered list of condition fragments joined by `and`,
//! paired with the positional arguments its `?` placeholders consume. Values
//! never enter the SQL text; they travel in `args` and are bound by the driver.

use chrono::NaiveDateTime;
use stmtq_core::{Result, StmtqError, Value};

use crate::render::STATEMENT_INFO_TABLE;

/// Byte offsets of `?` placeholders outside quoted strings and identifiers
pub(crate) fn placeholder_offsets(sql: &str) -> Vec<usize> {
    let bytes = sql.as_bytes();
    let mut offsets = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q != b'`' {
                    i += 1;
                } else if b == q {
                    // doubled quote stays inside the literal
                    if bytes.get(i + 1) == Some(&q) {
                        i += 1;
                    } else {
                        quote = None;
                    }
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'?' => offsets.push(i),
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = match sql[i + 2..].find("*/") {
                        Some(end) => i + 2 + end + 1,
                        None => bytes.len(),
                    };
                }
                _ => {}
            },
        }
        i += 1;
    }
    offsets
}

/// Number of bindable placeholders in `sql`
pub fn count_placeholders(sql: &str) -> usize {
    placeholder_offsets(sql).len()
}

/// Conjunction of condition fragments with their bound arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    fragments: Vec<String>,
    args: Vec<Value>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Predicate made of a single caller-supplied fragment
    pub fn raw(condition: impl Into<String>, args: Vec<Value>) -> Result<Self> {
        Self::new().and(condition, args)
    }

    /// Append `condition`, checking that its placeholders match `args`.
    ///
    /// Caller fragments are always parenthesized, so an `or`, `||` or `xor`
    /// inside one cannot escape the conjunction. Blank conditions with no args
    /// are skipped.
    pub fn and(mut self, condition: impl Into<String>, args: Vec<Value>) -> Result<Self> {
        let condition = condition.into();
        let trimmed = condition.trim();
        let expected = count_placeholders(trimmed);

        if expected != args.len() {
            return Err(StmtqError::InvalidParams(format!(
                "condition {:?} has {} placeholder(s) but {} argument(s)",
                trimmed,
                expected,
                args.len()
            )));
        }
        if trimmed.is_empty() {
            return Ok(self);
        }

        self.fragments.push(format!("({})", trimmed));
        self.args.extend(args);
        Ok(self)
    }

    /// Append `column op ?` only when `value` is present
    fn and_bound(mut self, column: &str, op: &str, value: Option<Value>) -> Self {
        if let Some(value) = value {
            self.fragments.push(format!("{} {} ?", column, op));
            self.args.push(value);
        }
        self
    }

    pub fn and_at_least(self, column: &str, value: Option<Value>) -> Self {
        self.and_bound(column, ">=", value)
    }

    pub fn and_at_most(self, column: &str, value: Option<Value>) -> Self {
        self.and_bound(column, "<=", value)
    }

    pub fn and_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_bound(column, "=", Some(value.into()))
    }

    /// Append a range on `column`: `between` when both ends are set, a single
    /// comparison when one is, nothing when neither is
    pub fn and_range(mut self, column: &str, range: &TimeRange) -> Self {
        match (range.start, range.end) {
            (Some(start), Some(end)) => {
                self.fragments.push(format!("{} between ? and ?", column));
                self.args.push(start.into());
                self.args.push(end.into());
                self
            }
            (start, end) => self
                .and_at_least(column, start.map(Value::from))
                .and_at_most(column, end.map(Value::from)),
        }
    }

    /// Append every fragment of `other`
    pub fn merge(mut self, other: Predicate) -> Self {
        self.fragments.extend(other.fragments);
        self.args.extend(other.args);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Conjunction text, empty when there are no fragments
    pub fn sql(&self) -> String {
        self.fragments.join(" and ")
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// Optional inclusive time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl TimeRange {
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }
}

/// Typed filter over the trace table, the usual way to build a list predicate
#[derive(Debug, Clone, Default)]
pub struct StatementFilter {
    pub account: Option<String>,
    pub request_at: TimeRange,
    pub status: Option<String>,
    pub user: Option<String>,
    pub database: Option<String>,
    pub session_id: Option<String>,
    pub transaction_id: Option<String>,
    /// Free-form trailing condition with its own arguments
    pub condition: Option<(String, Vec<Value>)>,
}

impl StatementFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn request_at(mut self, range: TimeRange) -> Self {
        self.request_at = range;
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn condition(mut self, condition: impl Into<String>, args: Vec<Value>) -> Self {
        self.condition = Some((condition.into(), args));
        self
    }

    pub fn to_predicate(&self) -> Result<Predicate> {
        let mut predicate = Predicate::new();
        let equalities = [
            ("account", &self.account),
            ("status", &self.status),
            ("`user`", &self.user),
            ("`database`", &self.database),
            ("session_id", &self.session_id),
            ("transaction_id", &self.transaction_id),
        ];
        for (column, value) in equalities {
            if let Some(value) = value {
                predicate = predicate.and_eq(column, value.as_str());
            }
        }
        predicate = predicate.and_range("request_at", &self.request_at);

        match &self.condition {
            Some((condition, args)) => predicate.and(condition.as_str(), args.clone()),
            None => Ok(predicate),
        }
    }
}

/// Filter applied inside the cost side-table subquery.
///
/// Response times bound the side table because cost rows are written when a
/// statement finishes.
#[derive(Debug, Clone, Default)]
pub struct CuJoinFilter {
    pub account: Option<String>,
    pub response_at: TimeRange,
}

impl CuJoinFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn response_at(mut self, range: TimeRange) -> Self {
        self.response_at = range;
        self
    }

    pub fn to_predicate(&self) -> Predicate {
        let mut predicate = Predicate::new();
        if let Some(account) = &self.account {
            predicate = predicate.and_eq("account", account.as_str());
        }
        predicate
            .and_at_least("response_at", self.response_at.start.map(Value::from))
            .and_at_most("response_at", self.response_at.end.map(Value::from))
    }
}

/// WHERE clause for a point lookup on the trace table
pub(crate) fn lookup_predicate(
    statement_id: &str,
    account: &str,
    request_at: &TimeRange,
) -> Predicate {
    Predicate::new()
        .and_eq(&format!("{}.statement_id", STATEMENT_INFO_TABLE), statement_id)
        .and_eq(&format!("{}.account", STATEMENT_INFO_TABLE), account)
        .and_at_least("request_at", request_at.start.map(Value::from))
        .and_at_most("request_at", request_at.end.map(Value::from))
}

/// Side-table condition for a point lookup
pub(crate) fn lookup_join_predicate(
    statement_id: &str,
    account: &str,
    request_start: Option<NaiveDateTime>,
    response_end: Option<NaiveDateTime>,
) -> Predicate {
    Predicate::new()
        .and_eq("statement_id", statement_id)
        .and_eq("account", account)
        .and_at_least("response_at", request_start.map(Value::from))
        .and_at_most("response_at", response_end.map(Value::from))
}
