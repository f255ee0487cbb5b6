//! Connection trait

use crate::{QueryResult, Result, Value};
use async_trait::async_trait;

/// A pooled, shared handle to the data store.
///
/// Implementations own their pool; callers treat the handle as non-exclusive
/// and may issue several queries on it concurrently.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "mysql")
    fn driver_name(&self) -> &str;

    /// Execute a query that returns rows.
    ///
    /// `params` are bound positionally to the `?` placeholders in `sql`;
    /// implementations must never splice them into the SQL text.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}
