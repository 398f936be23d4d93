//! Hosted service backend.

use async_trait::async_trait;
use todo_store::{Backend, BackendResult, ChangeFeed, ChangeStream, Query, Row};
use tracing::warn;

use crate::{HostedConfig, RealtimeClient, RestClient};

/// [`Backend`] over the hosted service's REST and realtime interfaces.
#[derive(Clone)]
pub struct HostedBackend {
    rest: RestClient,
    realtime: RealtimeClient,
}

impl HostedBackend {
    /// Creates a backend for the service described by `config`.
    pub fn new(config: HostedConfig) -> Self {
        Self {
            rest: RestClient::new(config.clone()),
            realtime: RealtimeClient::new(config),
        }
    }
}

#[async_trait]
impl Backend for HostedBackend {
    async fn select(&self, query: &Query) -> BackendResult<Vec<Row>> {
        Ok(self.rest.select(query).await?)
    }

    async fn insert(&self, table: &str, row: Row) -> BackendResult<Row> {
        Ok(self.rest.insert(table, &row).await?)
    }

    async fn update(&self, query: &Query, patch: Row) -> BackendResult<Vec<Row>> {
        Ok(self.rest.update(query, &patch).await?)
    }

    async fn delete(&self, query: &Query) -> BackendResult<()> {
        Ok(self.rest.delete(query).await?)
    }

    async fn subscribe(&self, feed: &ChangeFeed) -> BackendResult<ChangeStream> {
        self.realtime.subscribe(feed).await.map_err(|e| {
            warn!(table = %feed.table, error = %e, "Realtime subscription failed");
            e.into()
        })
    }
}
