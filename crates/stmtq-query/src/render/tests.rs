use super::*;
use crate::intent::{CuOptions, SqlComment};
use crate::predicate::{CuJoinFilter, StatementFilter, TimeRange};
use crate::projection::{CuSource, Projection};
use chrono::{NaiveDate, NaiveDateTime};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn ts(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .and_then(|d| d.and_hms_opt(hour, 0, 0))
        .expect("valid timestamp")
}

fn account_window() -> StatementQuery {
    let predicate = StatementFilter::new()
        .account("acct1")
        .request_at(TimeRange::new(Some(ts(25, 0)), Some(ts(26, 0))))
        .to_predicate()
        .expect("valid filter");
    StatementQuery::new(predicate)
        .with_projection(Projection::new("`statement`, `status`"))
        .with_order_by("request_at desc")
        .with_page(20, 0)
}

#[test]
fn test_list_without_cu_uses_base_table() {
    let plan = render_list(&account_window()).expect("renders");

    assert_eq!(
        plan.list.sql,
        "/* cloud_nonuser */ SELECT `statement`, `status` FROM system.statement_info \
         WHERE account = ? and request_at between ? and ? ORDER BY request_at desc LIMIT 20 OFFSET 0"
    );
    assert_eq!(
        plan.count.sql,
        "/* cloud_nonuser */ SELECT count(*) FROM system.statement_info \
         WHERE account = ? and request_at between ? and ?"
    );
    let expected: Vec<Value> = vec!["acct1".into(), ts(25, 0).into(), ts(26, 0).into()];
    assert_eq!(plan.list.params, expected);
    assert_eq!(plan.count.params, expected);
}

#[test]
fn test_list_with_cu_threshold_filters_outer_query() {
    let join = CuJoinFilter::new()
        .account("acct1")
        .response_at(TimeRange::new(Some(ts(25, 0)), None))
        .to_predicate();
    let query = account_window()
        .with_join_predicate(join)
        .with_cu(CuOptions::new(true, true))
        .with_min_cu(5);

    let plan = render_list(&query).expect("renders");
    let derived = format!(
        "(select `statement`, `status`, {} from system.statement_info \
         left join (select * from mo_catalog.statement_cu where account = ? and response_at >= ?)tmpcu \
         ON system.statement_info.statement_id = tmpcu.statement_id \
         where account = ? and request_at between ? and ?)t",
        CuSource::sql_expression()
    );

    assert_eq!(
        plan.list.sql,
        format!(
            "/* cloud_nonuser */ SELECT * FROM {} WHERE cu > ? ORDER BY request_at desc LIMIT 20 OFFSET 0",
            derived
        )
    );
    assert_eq!(
        plan.count.sql,
        format!("/* cloud_nonuser */ SELECT count(*) FROM {} WHERE cu > ?", derived)
    );
    assert_eq!(
        plan.list.params,
        vec![
            Value::from("acct1"),
            Value::from(ts(25, 0)),
            Value::from("acct1"),
            Value::from(ts(25, 0)),
            Value::from(ts(26, 0)),
            Value::UInt64(5),
        ]
    );
    assert_eq!(plan.count.params, plan.list.params);
}

#[test]
fn test_cu_without_side_table_skips_join() {
    let join = CuJoinFilter::new().account("acct1").to_predicate();
    let query = account_window()
        .with_join_predicate(join)
        .with_cu(CuOptions::new(true, false));

    let plan = render_list(&query).expect("renders");
    assert!(plan.list.sql.contains("SELECT * FROM (select `statement`, `status`, IF(status"));
    assert!(!plan.list.sql.contains("tmpcu"));
    assert!(!plan.list.sql.contains("cu > ?"));
    assert_eq!(plan.list.params.len(), 3);
    // no threshold: count stays on the base table
    assert_eq!(
        plan.count.sql,
        "/* cloud_nonuser */ SELECT count(*) FROM system.statement_info \
         WHERE account = ? and request_at between ? and ?"
    );
}

#[rstest]
#[case(Some(0))]
#[case(None)]
fn test_zero_or_missing_threshold_is_ignored(#[case] min_cu: Option<u64>) {
    let mut query = account_window().with_cu(CuOptions::new(true, true));
    query.min_cu = min_cu;

    let plan = render_list(&query).expect("renders");
    assert!(!plan.list.sql.contains("cu > ?"));
    assert!(!plan.count.sql.contains("cu > ?"));
}

#[test]
fn test_threshold_needs_cu_request() {
    let query = account_window().with_min_cu(5);
    let plan = render_list(&query).expect("renders");
    assert!(!plan.list.sql.contains("cu > ?"));
    assert!(!plan.list.params.contains(&Value::UInt64(5)));
}

#[test]
fn test_empty_predicate_and_order_are_omitted() {
    let query = StatementQuery::default()
        .with_projection(Projection::new("`statement`"))
        .with_comment(SqlComment::none());
    let plan = render_list(&query).expect("renders");

    assert_eq!(plan.list.sql, "SELECT `statement` FROM system.statement_info LIMIT 20 OFFSET 0");
    assert_eq!(plan.count.sql, "SELECT count(*) FROM system.statement_info");
    assert!(plan.list.params.is_empty());
}

#[test]
fn test_rendering_is_deterministic() {
    let query = account_window()
        .with_cu(CuOptions::new(true, true))
        .with_min_cu(3);
    assert_eq!(render_list(&query).expect("first"), render_list(&query).expect("second"));
}

#[test]
fn test_empty_projection_fails_before_rendering() {
    let query = account_window().with_projection(Projection::new(""));
    assert!(render_list(&query).unwrap_err().is_invalid_params());
}

#[test]
fn test_comment_cannot_close_early() {
    let query = account_window().with_comment(SqlComment::new("evil */ DROP TABLE x; /*"));
    let plan = render_list(&query).expect("renders");
    assert!(plan.list.sql.starts_with("/* evil * / DROP TABLE x; /* */ SELECT"));
}

#[test]
fn test_debug_sql_inlines_literals() {
    let plan = render_list(&account_window()).expect("renders");
    let debug = plan.list.debug_sql().expect("balanced");

    assert_eq!(
        debug,
        "/* cloud_nonuser */ SELECT `statement`, `status` FROM system.statement_info \
         WHERE account = 'acct1' and request_at between '2024-03-25 00:00:00' and '2024-03-26 00:00:00' \
         ORDER BY request_at desc LIMIT 20 OFFSET 0"
    );
}

#[test]
fn test_debug_sql_reports_mismatch() {
    let broken = RenderedQuery {
        sql: "SELECT 1 FROM t WHERE a = ?".to_string(),
        params: vec![],
    };
    assert!(broken.debug_sql().is_err());
}

#[test]
fn test_lookup_with_start_bound_only() {
    let lookup = StatementLookup::new("018eb819-4048-7e69-aaa6-feb99965eb97", "sys")
        .with_projection(Some(Projection::new("`statement`")))
        .with_request_at(TimeRange::new(Some(ts(25, 18)), None))
        .with_cu(CuOptions::new(true, true));

    let rendered = render_lookup(&lookup).expect("renders");
    assert_eq!(
        rendered.sql,
        format!(
            "/* cloud_nonuser */ SELECT `statement`, {} FROM system.statement_info \
             left join (select * from mo_catalog.statement_cu where statement_id = ? and account = ? and response_at >= ?)tmpcu \
             ON system.statement_info.statement_id = tmpcu.statement_id \
             WHERE system.statement_info.statement_id = ? and system.statement_info.account = ? and request_at >= ? \
             ORDER BY system.statement_info.response_at DESC LIMIT 1",
            CuSource::sql_expression()
        )
    );
    assert!(!rendered.sql.contains("response_at <= ?"));
    assert_eq!(rendered.params.len(), 6);
}

#[test]
fn test_lookup_with_all_bounds() {
    let lookup = StatementLookup::new("id-1", "sys")
        .with_request_at(TimeRange::new(Some(ts(25, 18)), Some(ts(25, 19))))
        .with_response_end(Some(ts(25, 20)))
        .with_cu(CuOptions::new(true, true));

    let rendered = render_lookup(&lookup).expect("renders");
    assert!(rendered.sql.contains("response_at >= ? and response_at <= ?)tmpcu"));
    assert!(rendered.sql.contains("request_at >= ? and request_at <= ? ORDER BY"));
    assert_eq!(rendered.params[3], Value::from(ts(25, 20)));
}

#[test]
fn test_lookup_without_cu_has_no_join() {
    let rendered = render_lookup(&StatementLookup::new("id-1", "sys")).expect("renders");
    assert!(!rendered.sql.contains("tmpcu"));
    assert!(!rendered.sql.contains("AS `cu`"));
    assert_eq!(rendered.params, vec![Value::from("id-1"), Value::from("sys")]);
}

#[rstest]
#[case("", "sys")]
#[case("  ", "sys")]
#[case("id-1", "")]
fn test_lookup_requires_identity(#[case] statement_id: &str, #[case] account: &str) {
    let err = render_lookup(&StatementLookup::new(statement_id, account)).unwrap_err();
    assert!(err.is_invalid_params());
}

#[test]
fn test_lookup_requires_projection() {
    let lookup = StatementLookup::new("id-1", "sys").with_projection(None);
    assert!(render_lookup(&lookup).unwrap_err().is_invalid_params());
}
