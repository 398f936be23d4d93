//! Backend service contract.

use async_trait::async_trait;

use crate::{BackendResult, ChangeFeed, ChangeStream, Query, Row};

/// Operations the hosted backend service provides.
///
/// Rows are JSON objects keyed by column name. Every call returns either the
/// affected rows or the backend's error object.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Reads the rows matching `query`, sorted and projected as requested.
    async fn select(&self, query: &Query) -> BackendResult<Vec<Row>>;

    /// Inserts a row and returns it as stored (with server-assigned columns).
    async fn insert(&self, table: &str, row: Row) -> BackendResult<Row>;

    /// Merges `patch` into every row matching `query` and returns the rows
    /// as stored after the update.
    async fn update(&self, query: &Query, patch: Row) -> BackendResult<Vec<Row>>;

    /// Deletes every row matching `query`.
    async fn delete(&self, query: &Query) -> BackendResult<()>;

    /// Opens a standing push subscription for `feed`.
    async fn subscribe(&self, feed: &ChangeFeed) -> BackendResult<ChangeStream>;
}
