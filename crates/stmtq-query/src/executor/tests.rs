use super::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use crate::trace::TraceLevel;

/// Answers count statements with `total` and everything else with one row
struct ScriptedConnection {
    total: Option<u64>,
    fail_on: Option<&'static str>,
    delay: Duration,
    seen: Mutex<Vec<String>>,
}

impl ScriptedConnection {
    fn new(total: Option<u64>) -> Self {
        Self {
            total,
            fail_on: None,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn driver_name(&self) -> &str {
        "scripted"
    }

    async fn query(&self, sql: &str, _params: &[Value]) -> Result<QueryResult> {
        self.seen.lock().push(sql.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on.is_some_and(|needle| sql.contains(needle)) {
            return Err(StmtqError::Query("lost connection".into()));
        }
        if sql.contains("count(*)") {
            let rows = self.total.map(|t| vec![vec![Value::UInt64(t)]]).unwrap_or_default();
            return Ok(QueryResult::from_rows(vec!["count(*)".into()], rows));
        }
        Ok(QueryResult::from_rows(
            vec!["statement".into()],
            vec![vec![Value::from("select 1")]],
        ))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

fn plan() -> ListPlan {
    ListPlan {
        list: RenderedQuery {
            sql: "SELECT `statement` FROM t WHERE a = ? LIMIT 20 OFFSET 0".into(),
            params: vec![Value::from("x")],
        },
        count: RenderedQuery {
            sql: "SELECT count(*) FROM t WHERE a = ?".into(),
            params: vec![Value::from("x")],
        },
    }
}

fn tracer() -> SqlTracer {
    SqlTracer::new(Duration::from_millis(100)).with_level(TraceLevel::Info)
}

#[tokio::test]
async fn test_fetch_page_returns_count() {
    let conn = ScriptedConnection::new(Some(42));
    let tracer = tracer();
    let (page, total) = QueryExecutor::new(&conn, &tracer)
        .fetch_page(&plan())
        .await
        .expect("both branches succeed");

    assert_eq!(page.row_count(), 1);
    assert_eq!(total, 42);
    assert_eq!(conn.seen.lock().len(), 2);
}

#[tokio::test]
async fn test_count_failure_fails_group() {
    let mut conn = ScriptedConnection::new(Some(42));
    conn.fail_on = Some("count(*)");
    let tracer = tracer();

    let err = QueryExecutor::new(&conn, &tracer)
        .fetch_page(&plan())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Query error: count query failed: lost connection");
}

#[tokio::test]
async fn test_list_failure_carries_branch() {
    let mut conn = ScriptedConnection::new(Some(1));
    conn.fail_on = Some("LIMIT");
    let tracer = tracer();

    let err = QueryExecutor::new(&conn, &tracer)
        .fetch_page(&plan())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("list query failed"));
}

#[tokio::test]
async fn test_empty_count_is_an_error() {
    let conn = ScriptedConnection::new(None);
    let tracer = tracer();
    let err = QueryExecutor::new(&conn, &tracer)
        .fetch_page(&plan())
        .await
        .unwrap_err();
    assert!(matches!(err, StmtqError::Query(_)));
}

#[tokio::test]
async fn test_debug_render_problem_is_not_fatal() {
    let conn = ScriptedConnection::new(Some(3));
    let tracer = tracer();
    let mut broken = plan();
    broken.list.params.clear();

    let (_, total) = QueryExecutor::new(&conn, &tracer)
        .fetch_page(&broken)
        .await
        .expect("debug rendering never fails the group");
    assert_eq!(total, 3);
}

#[tokio::test]
async fn test_fetch_one_empty_is_not_found() {
    let conn = ScriptedConnection::new(None);
    let tracer = tracer();
    let query = RenderedQuery {
        sql: "SELECT count(*) FROM t".into(),
        params: vec![],
    };

    let err = QueryExecutor::new(&conn, &tracer)
        .fetch_one("detail", &query, || "statement id-1".to_string())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Not found: statement id-1");
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_group() {
    let mut conn = ScriptedConnection::new(Some(1));
    conn.delay = Duration::from_secs(10);
    let tracer = tracer();
    let ctx = CallContext::new().with_timeout(Duration::from_secs(3));

    let err = ctx
        .run(QueryExecutor::new(&conn, &tracer).fetch_page(&plan()))
        .await
        .unwrap_err();
    match err {
        StmtqError::Timeout { cause, elapsed_ms } => {
            assert_eq!(cause, DEFAULT_TIMEOUT_CAUSE);
            assert!(elapsed_ms >= 3_000);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_custom_cause_is_reported() {
    let ctx = CallContext::new()
        .with_timeout(Duration::from_millis(5))
        .with_cause("console-cancel");
    let err = ctx
        .run(async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, StmtqError>(())
        })
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert!(err.to_string().contains("console-cancel"));
}

#[tokio::test]
async fn test_no_deadline_passes_through() {
    let ctx = CallContext::default();
    assert_eq!(ctx.timeout(), None);
    let value = ctx.run(async { Ok::<_, StmtqError>(7) }).await.expect("no deadline");
    assert_eq!(value, 7);
}

#[test]
fn test_context_from_config() {
    let config = QueryConfig {
        timeout_ms: Some(1_500),
        ..QueryConfig::default()
    };
    let ctx = CallContext::from_config(&config);
    assert_eq!(ctx.timeout(), Some(Duration::from_millis(1_500)));
    assert_eq!(ctx.cause(), "client-timeout");
}
