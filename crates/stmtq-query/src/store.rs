//! Statement store: the entry points callers use

use std::sync::Arc;

use serde::Serialize;
use stmtq_core::{Connection, QueryConfig, Result};

use crate::executor::{CallContext, QueryExecutor};
use crate::intent::{StatementLookup, StatementQuery};
use crate::render::{render_list, render_lookup};
use crate::statement::StatementInfo;
use crate::trace::SqlTracer;

/// One page of records and the size of the whole filtered set
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatementPage {
    pub records: Vec<StatementInfo>,
    pub total: u64,
}

/// Reads execution traces through a shared connection
pub struct StatementStore {
    conn: Arc<dyn Connection>,
    tracer: SqlTracer,
}

impl StatementStore {
    pub fn new(conn: Arc<dyn Connection>, tracer: SqlTracer) -> Self {
        Self { conn, tracer }
    }

    pub fn from_config(conn: Arc<dyn Connection>, config: &QueryConfig) -> Self {
        Self::new(conn, SqlTracer::from_config(config))
    }

    /// Newest record for one statement of one account.
    ///
    /// The statement text always comes back `;`-terminated.
    #[tracing::instrument(skip(self, ctx, lookup), fields(statement_id = %lookup.statement_id, account = %lookup.account))]
    pub async fn select_by_statement_id(
        &self,
        ctx: &CallContext,
        lookup: &StatementLookup,
    ) -> Result<StatementInfo> {
        let query = render_lookup(lookup)?;
        let executor = QueryExecutor::new(self.conn.as_ref(), &self.tracer);

        let row = ctx
            .run(executor.fetch_one("detail", &query, || {
                format!("statement {} in account {}", lookup.statement_id, lookup.account)
            }))
            .await?;

        Ok(StatementInfo::from_row(&row)?.terminated())
    }

    /// One page of records plus the total matching count
    #[tracing::instrument(skip(self, ctx, query), fields(limit = query.limit, offset = query.offset, cu = query.cu.requested))]
    pub async fn select_statements(
        &self,
        ctx: &CallContext,
        query: &StatementQuery,
    ) -> Result<StatementPage> {
        let plan = render_list(query)?;
        let executor = QueryExecutor::new(self.conn.as_ref(), &self.tracer);

        let (page, total) = ctx.run(executor.fetch_page(&plan)).await?;
        let records = page
            .rows
            .iter()
            .map(StatementInfo::from_row)
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(records = records.len(), total, "statement page fetched");
        Ok(StatementPage { records, total })
    }
}
