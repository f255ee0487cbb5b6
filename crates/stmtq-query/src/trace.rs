//! SQL execution tracing
//!
//! Each executed statement is classified once: failed, slow, or ordinary.
//! Which classes are emitted depends on the trace level, which by default
//! follows the most verbose level the tracing subscriber has enabled.

use std::time::Duration;

use stmtq_core::{QueryConfig, StmtqError};
use tracing::level_filters::LevelFilter;

/// How much of the SQL traffic gets logged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    Silent,
    Error,
    Warn,
    Info,
}

impl TraceLevel {
    /// Map a subscriber filter onto trace levels one step quieter, so that
    /// per-statement lines only appear when debug logging is on
    pub fn from_filter(filter: LevelFilter) -> Self {
        if filter >= LevelFilter::DEBUG {
            TraceLevel::Info
        } else if filter >= LevelFilter::INFO {
            TraceLevel::Warn
        } else if filter >= LevelFilter::ERROR {
            TraceLevel::Error
        } else {
            TraceLevel::Silent
        }
    }
}

/// What the tracer logged for one statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    Failed,
    Slow,
    Executed,
}

/// Logs executed SQL with timing
#[derive(Debug, Clone)]
pub struct SqlTracer {
    level: TraceLevel,
    slow_threshold: Duration,
    ignore_not_found: bool,
}

impl SqlTracer {
    pub fn new(slow_threshold: Duration) -> Self {
        Self {
            level: TraceLevel::from_filter(LevelFilter::current()),
            slow_threshold,
            ignore_not_found: false,
        }
    }

    pub fn from_config(config: &QueryConfig) -> Self {
        Self::new(config.slow_threshold()).with_ignore_not_found(config.ignore_not_found)
    }

    pub fn with_level(mut self, level: TraceLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_ignore_not_found(mut self, ignore: bool) -> Self {
        self.ignore_not_found = ignore;
        self
    }

    pub fn level(&self) -> TraceLevel {
        self.level
    }

    pub fn slow_threshold(&self) -> Duration {
        self.slow_threshold
    }

    /// Log one finished statement; returns what was emitted, if anything
    pub fn trace(
        &self,
        branch: &str,
        sql: &str,
        elapsed: Duration,
        rows: Option<usize>,
        error: Option<&StmtqError>,
    ) -> Option<TraceEvent> {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let rows = rows.map_or(-1, |r| r as i64);

        match error {
            Some(err)
                if self.level >= TraceLevel::Error
                    && !(self.ignore_not_found && err.is_not_found()) =>
            {
                tracing::error!(branch, error = %err, elapsed_ms, rows, sql, "statement failed");
                Some(TraceEvent::Failed)
            }
            _ if elapsed > self.slow_threshold
                && !self.slow_threshold.is_zero()
                && self.level >= TraceLevel::Warn =>
            {
                tracing::warn!(
                    branch,
                    threshold_ms = self.slow_threshold.as_millis() as u64,
                    elapsed_ms,
                    rows,
                    sql,
                    "slow statement"
                );
                Some(TraceEvent::Slow)
            }
            _ if self.level == TraceLevel::Info => {
                tracing::debug!(branch, elapsed_ms, rows, sql, "statement executed");
                Some(TraceEvent::Executed)
            }
            _ => None,
        }
    }

    /// Emit the human-readable form of a statement
    pub fn rendered(&self, sql: &str) {
        if self.level == TraceLevel::Info {
            tracing::debug!(sql, "query");
        }
    }
}

impl Default for SqlTracer {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tracer(level: TraceLevel) -> SqlTracer {
        SqlTracer::new(Duration::from_millis(100)).with_level(level)
    }

    #[rstest]
    #[case(LevelFilter::TRACE, TraceLevel::Info)]
    #[case(LevelFilter::DEBUG, TraceLevel::Info)]
    #[case(LevelFilter::INFO, TraceLevel::Warn)]
    #[case(LevelFilter::WARN, TraceLevel::Error)]
    #[case(LevelFilter::ERROR, TraceLevel::Error)]
    #[case(LevelFilter::OFF, TraceLevel::Silent)]
    fn test_level_from_filter(#[case] filter: LevelFilter, #[case] expected: TraceLevel) {
        assert_eq!(TraceLevel::from_filter(filter), expected);
    }

    #[test]
    fn test_errors_take_priority() {
        let err = StmtqError::Query("boom".into());
        let event = tracer(TraceLevel::Info).trace(
            "list",
            "SELECT 1",
            Duration::from_secs(1),
            None,
            Some(&err),
        );
        assert_eq!(event, Some(TraceEvent::Failed));
    }

    #[test]
    fn test_not_found_can_be_suppressed() {
        let err = StmtqError::NotFound("statement id-1".into());
        let quiet = tracer(TraceLevel::Info).with_ignore_not_found(true);
        let event = quiet.trace("detail", "SELECT 1", Duration::from_millis(1), Some(0), Some(&err));
        assert_eq!(event, Some(TraceEvent::Executed));
    }

    #[rstest]
    #[case(TraceLevel::Info, 150, Some(TraceEvent::Slow))]
    #[case(TraceLevel::Warn, 150, Some(TraceEvent::Slow))]
    #[case(TraceLevel::Error, 150, None)]
    #[case(TraceLevel::Info, 100, Some(TraceEvent::Executed))]
    #[case(TraceLevel::Warn, 10, None)]
    #[case(TraceLevel::Silent, 150, None)]
    fn test_slow_and_ordinary(
        #[case] level: TraceLevel,
        #[case] elapsed_ms: u64,
        #[case] expected: Option<TraceEvent>,
    ) {
        let event = tracer(level).trace(
            "count",
            "SELECT count(*) FROM t",
            Duration::from_millis(elapsed_ms),
            Some(1),
            None,
        );
        assert_eq!(event, expected);
    }

    #[test]
    fn test_zero_threshold_disables_slow() {
        let tracer = SqlTracer::new(Duration::ZERO).with_level(TraceLevel::Warn);
        assert_eq!(tracer.trace("list", "SELECT 1", Duration::from_secs(5), None, None), None);
    }
}
