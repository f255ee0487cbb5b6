//! SQL rendering
//!
//! Turns an intent into statement text plus positional arguments. Rendering is
//! pure: the same intent always yields the same text and argument order.
//!
//! Arguments are ordered as they appear in the text: side-table join first,
//! then the WHERE predicate, then the outer CU threshold.

use stmtq_core::{Result, StmtqError, Value};

use crate::intent::{StatementLookup, StatementQuery};
use crate::predicate::{Predicate, lookup_join_predicate, lookup_predicate, placeholder_offsets};
use crate::projection::CU_COLUMN;

/// The execution-trace table
pub const STATEMENT_INFO_TABLE: &str = "system.statement_info";
/// Precomputed cost side table
pub const STATEMENT_CU_TABLE: &str = "mo_catalog.statement_cu";

/// Statement text with the arguments its placeholders consume
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl RenderedQuery {
    /// The statement with each argument inlined as a literal.
    ///
    /// Meant for logs only; executed statements always bind.
    pub fn debug_sql(&self) -> Result<String> {
        let offsets = placeholder_offsets(&self.sql);
        if offsets.len() != self.params.len() {
            return Err(StmtqError::Other(format!(
                "cannot inline {} argument(s) into {} placeholder(s)",
                self.params.len(),
                offsets.len()
            )));
        }

        let mut out = String::with_capacity(self.sql.len() + self.params.len() * 8);
        let mut last = 0;
        for (offset, param) in offsets.iter().zip(&self.params) {
            out.push_str(&self.sql[last..*offset]);
            out.push_str(&param.to_sql_literal());
            last = offset + 1;
        }
        out.push_str(&self.sql[last..]);
        Ok(out)
    }
}

/// The list and count statements of one paged request
#[derive(Debug, Clone, PartialEq)]
pub struct ListPlan {
    pub list: RenderedQuery,
    pub count: RenderedQuery,
}

/// `ON`-joined side-table clause, including its leading space
fn side_table_join(predicate: &Predicate) -> String {
    let filtered = if predicate.is_empty() {
        format!("select * from {}", STATEMENT_CU_TABLE)
    } else {
        format!("select * from {} where {}", STATEMENT_CU_TABLE, predicate.sql())
    };
    format!(
        " left join ({})tmpcu ON {}.statement_id = tmpcu.statement_id",
        filtered, STATEMENT_INFO_TABLE
    )
}

fn where_clause(keyword: &str, predicate: &Predicate) -> String {
    if predicate.is_empty() {
        String::new()
    } else {
        format!(" {} {}", keyword, predicate.sql())
    }
}

fn order_clause(order_by: &str) -> String {
    let order_by = order_by.trim();
    if order_by.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", order_by)
    }
}

fn require_identity(statement_id: &str, account: &str) -> Result<()> {
    if statement_id.trim().is_empty() {
        return Err(StmtqError::InvalidParams("statement_id is required".to_string()));
    }
    if account.trim().is_empty() {
        return Err(StmtqError::InvalidParams("account is required".to_string()));
    }
    Ok(())
}

/// Render the paged list and its count from one intent
pub fn render_list(query: &StatementQuery) -> Result<ListPlan> {
    let projection = query.projection.compose(query.cu.requested)?;
    let prefix = query.comment.prefix();
    let tail = format!(
        "{} LIMIT {} OFFSET {}",
        order_clause(&query.order_by),
        query.limit,
        query.offset
    );

    if !query.cu.requested {
        let filter = where_clause("WHERE", &query.predicate);
        let params = query.predicate.args().to_vec();
        return Ok(ListPlan {
            list: RenderedQuery {
                sql: format!(
                    "{}SELECT {} FROM {}{}{}",
                    prefix, projection, STATEMENT_INFO_TABLE, filter, tail
                ),
                params: params.clone(),
            },
            count: RenderedQuery {
                sql: format!("{}SELECT count(*) FROM {}{}", prefix, STATEMENT_INFO_TABLE, filter),
                params,
            },
        });
    }

    let mut derived_params = Vec::new();
    let join = if query.cu.joins_side_table() {
        derived_params.extend_from_slice(query.join_predicate.args());
        side_table_join(&query.join_predicate)
    } else {
        String::new()
    };
    derived_params.extend_from_slice(query.predicate.args());
    let derived = format!(
        "(select {} from {}{}{})t",
        projection,
        STATEMENT_INFO_TABLE,
        join,
        where_clause("where", &query.predicate)
    );

    let (outer_filter, outer_params) = match query.cu_threshold() {
        Some(min_cu) => {
            let mut params = derived_params.clone();
            params.push(Value::UInt64(min_cu));
            (format!(" WHERE {} > ?", CU_COLUMN), params)
        }
        None => (String::new(), derived_params),
    };

    let list = RenderedQuery {
        sql: format!("{}SELECT * FROM {}{}{}", prefix, derived, outer_filter, tail),
        params: outer_params.clone(),
    };
    let count = if outer_filter.is_empty() {
        RenderedQuery {
            sql: format!(
                "{}SELECT count(*) FROM {}{}",
                prefix,
                STATEMENT_INFO_TABLE,
                where_clause("WHERE", &query.predicate)
            ),
            params: query.predicate.args().to_vec(),
        }
    } else {
        RenderedQuery {
            sql: format!("{}SELECT count(*) FROM {}{}", prefix, derived, outer_filter),
            params: outer_params,
        }
    };

    Ok(ListPlan { list, count })
}

/// Render the newest-first single-row lookup
pub fn render_lookup(lookup: &StatementLookup) -> Result<RenderedQuery> {
    require_identity(&lookup.statement_id, &lookup.account)?;
    let projection = lookup
        .projection
        .as_ref()
        .ok_or_else(|| StmtqError::InvalidParams("projection is required".to_string()))?
        .compose(lookup.cu.requested)?;

    let mut params = Vec::new();
    let join = if lookup.cu.joins_side_table() {
        let join_predicate = lookup_join_predicate(
            &lookup.statement_id,
            &lookup.account,
            lookup.request_at.start,
            lookup.response_end,
        );
        params.extend_from_slice(join_predicate.args());
        side_table_join(&join_predicate)
    } else {
        String::new()
    };
    let predicate = lookup_predicate(&lookup.statement_id, &lookup.account, &lookup.request_at);
    params.extend_from_slice(predicate.args());

    Ok(RenderedQuery {
        sql: format!(
            "{}SELECT {} FROM {}{}{} ORDER BY {}.response_at DESC LIMIT 1",
            lookup.comment.prefix(),
            projection,
            STATEMENT_INFO_TABLE,
            join,
            where_clause("WHERE", &predicate),
            STATEMENT_INFO_TABLE
        ),
        params,
    })
}

#[cfg(test)]
mod tests;
