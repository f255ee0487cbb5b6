//! Statement query layer
//!
//! Builds and runs the SQL behind two read paths over the execution-trace
//! table: a point lookup of one statement, and a paged list with a total
//! count. Both can be enriched with a compute-unit (`cu`) column.
//!
//! # Example
//!
//! ```ignore
//! use stmtq_query::{CallContext, StatementFilter, StatementQuery, StatementStore};
//!
//! let predicate = StatementFilter::new().account("sys").to_predicate()?;
//! let query = StatementQuery::new(predicate).with_order_by("request_at desc");
//! let page = store.select_statements(&CallContext::new(), &query).await?;
//! ```

mod executor;
mod intent;
mod normalize;
mod predicate;
mod projection;
mod render;
mod statement;
mod store;
mod trace;

pub use executor::{CallContext, DEFAULT_TIMEOUT_CAUSE, QueryExecutor};
pub use intent::{CuOptions, DEFAULT_LIMIT, DEFAULT_SQL_COMMENT, SqlComment, StatementLookup, StatementQuery};
pub use normalize::{STATEMENT_TERMINATOR, ensure_terminated};
pub use predicate::{CuJoinFilter, Predicate, StatementFilter, TimeRange, count_placeholders};
pub use projection::{CU_COLUMN, CuSource, Projection, RECORDED_CU_INDEX, RECORDED_CU_MIN_VERSION, RUNNING_STATUS};
pub use render::{ListPlan, RenderedQuery, STATEMENT_CU_TABLE, STATEMENT_INFO_TABLE, render_list, render_lookup};
pub use statement::{ConnType, StatementInfo, Stats};
pub use store::{StatementPage, StatementStore};
pub use trace::{SqlTracer, TraceEvent, TraceLevel};
