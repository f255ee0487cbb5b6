//! Statement execution
//!
//! A list request runs three branches at once: the page itself, the debug
//! rendering of that page, and the total count. The group succeeds only when
//! every branch does; the first failure drops the others.

use std::future::Future;
use std::time::Duration;

use stmtq_core::{Connection, QueryConfig, QueryResult, Result, Row, StmtqError, Value};
use tokio::time::Instant;

use crate::render::{ListPlan, RenderedQuery};
use crate::trace::SqlTracer;

/// Cause reported when the caller's deadline expires
pub const DEFAULT_TIMEOUT_CAUSE: &str = "client-timeout";

/// Per-call deadline and the cause reported when it expires
#[derive(Debug, Clone)]
pub struct CallContext {
    timeout: Option<Duration>,
    cause: String,
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            timeout: None,
            cause: DEFAULT_TIMEOUT_CAUSE.to_string(),
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        let ctx = Self::new();
        match config.timeout() {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = cause.into();
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn cause(&self) -> &str {
        &self.cause
    }

    /// Drive `work` under this context's deadline.
    ///
    /// On expiry `work` is dropped, which cancels every branch it still owns.
    pub async fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(limit) = self.timeout else {
            return work.await;
        };

        let started = Instant::now();
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(cause = %self.cause, elapsed_ms, "statement query deadline exceeded");
                Err(StmtqError::Timeout {
                    cause: self.cause.clone(),
                    elapsed_ms,
                })
            }
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefix store failures with the branch that raised them
fn with_branch(branch: &str, err: StmtqError) -> StmtqError {
    match err {
        StmtqError::Query(msg) => StmtqError::Query(format!("{} query failed: {}", branch, msg)),
        StmtqError::Connection(msg) => {
            StmtqError::Connection(format!("{} query failed: {}", branch, msg))
        }
        other => other,
    }
}

fn decode_count(result: &QueryResult) -> Result<u64> {
    result
        .rows
        .first()
        .and_then(|row| row.get(0))
        .and_then(Value::as_u64)
        .ok_or_else(|| StmtqError::Query("count query failed: no count returned".to_string()))
}

/// Runs rendered statements over one connection, tracing each
pub struct QueryExecutor<'a> {
    conn: &'a dyn Connection,
    tracer: &'a SqlTracer,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(conn: &'a dyn Connection, tracer: &'a SqlTracer) -> Self {
        Self { conn, tracer }
    }

    pub async fn fetch(&self, branch: &str, query: &RenderedQuery) -> Result<QueryResult> {
        let started = Instant::now();
        let result = self
            .conn
            .query(&query.sql, &query.params)
            .await
            .map_err(|e| with_branch(branch, e));

        match &result {
            Ok(rows) => self.tracer.trace(branch, &query.sql, started.elapsed(), Some(rows.row_count()), None),
            Err(e) => self.tracer.trace(branch, &query.sql, started.elapsed(), None, Some(e)),
        };
        result
    }

    /// First row of the result; an empty result is `NotFound`
    pub async fn fetch_one(
        &self,
        branch: &str,
        query: &RenderedQuery,
        missing: impl FnOnce() -> String,
    ) -> Result<Row> {
        let started = Instant::now();
        let result = match self.conn.query(&query.sql, &query.params).await {
            Ok(found) => found
                .rows
                .into_iter()
                .next()
                .ok_or_else(|| StmtqError::NotFound(missing())),
            Err(e) => Err(with_branch(branch, e)),
        };

        match &result {
            Ok(_) => self.tracer.trace(branch, &query.sql, started.elapsed(), Some(1), None),
            Err(e) => self.tracer.trace(branch, &query.sql, started.elapsed(), None, Some(e)),
        };
        result
    }

    /// Render the page for the log without ever failing the group
    async fn debug_render(&self, query: &RenderedQuery) -> Result<()> {
        match query.debug_sql() {
            Ok(sql) => self.tracer.rendered(&sql),
            Err(e) => tracing::warn!(error = %e, "failed to render statement for debug"),
        }
        Ok(())
    }

    /// Fetch a page and its total count concurrently
    pub async fn fetch_page(&self, plan: &ListPlan) -> Result<(QueryResult, u64)> {
        let (page, (), count) = tokio::try_join!(
            self.fetch("list", &plan.list),
            self.debug_render(&plan.list),
            self.fetch("count", &plan.count)
        )?;
        let total = decode_count(&count)?;
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests;
