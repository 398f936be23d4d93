//! REST row verbs.

use reqwest::{header, RequestBuilder, Response};
use serde::Deserialize;
use todo_store::{render_value, Query, Row};
use tracing::debug;

use crate::{ClientError, ClientResult, HostedConfig};

/// Error object in the body of a failed REST call.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Renders a query as REST query-string pairs.
///
/// Predicates become `column=op.value`, sort keys a single
/// `order=col.asc,col.desc` pair, and the column list a `select` pair.
pub fn query_pairs(query: &Query) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    let columns = query
        .columns
        .as_ref()
        .map_or_else(|| "*".to_string(), |columns| columns.join(","));
    pairs.push(("select".to_string(), columns));

    for predicate in &query.predicates {
        pairs.push((
            predicate.column.clone(),
            format!(
                "{}.{}",
                predicate.operator.as_str(),
                render_value(&predicate.value)
            ),
        ));
    }

    if !query.order.is_empty() {
        let order = query
            .order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect::<Vec<_>>()
            .join(",");
        pairs.push(("order".to_string(), order));
    }

    pairs
}

/// Client for the service's REST interface.
#[derive(Clone)]
pub struct RestClient {
    config: HostedConfig,
    http_client: reqwest::Client,
}

impl RestClient {
    /// Creates a client with its own connection pool.
    pub fn new(config: HostedConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", self.config.api_key())
            .bearer_auth(self.config.bearer_token())
    }

    /// Reads rows.
    pub async fn select(&self, query: &Query) -> ClientResult<Vec<Row>> {
        debug!(table = %query.table, "REST select");
        let request = self
            .http_client
            .get(self.config.rest_url(&query.table)?)
            .query(&query_pairs(query));
        self.rows(request).await
    }

    /// Inserts one row and returns it as stored.
    pub async fn insert(&self, table: &str, row: &Row) -> ClientResult<Row> {
        debug!(table, "REST insert");
        let request = self
            .http_client
            .post(self.config.rest_url(table)?)
            .header("Prefer", "return=representation")
            .json(&[row]);
        self.rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Deserialization("insert returned no row".to_string()))
    }

    /// Patches the selected rows and returns them as stored.
    pub async fn update(&self, query: &Query, patch: &Row) -> ClientResult<Vec<Row>> {
        debug!(table = %query.table, "REST update");
        let request = self
            .http_client
            .patch(self.config.rest_url(&query.table)?)
            .query(&query_pairs(query))
            .header("Prefer", "return=representation")
            .json(patch);
        self.rows(request).await
    }

    /// Deletes the selected rows.
    pub async fn delete(&self, query: &Query) -> ClientResult<()> {
        debug!(table = %query.table, "REST delete");
        let request = self
            .http_client
            .delete(self.config.rest_url(&query.table)?)
            .query(&query_pairs(query));
        self.send(request).await?;
        Ok(())
    }

    async fn rows(&self, request: RequestBuilder) -> ClientResult<Vec<Row>> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Deserialization(e.to_string()))
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<Response> {
        let response = self
            .authorized(request)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ClientError::Server {
            status: status.as_u16(),
            message: error_message(&body)
                .unwrap_or_else(|| format!("Server returned status {}", status)),
        })
    }
}

/// Extracts the `message` field of an error body.
fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.message)
}
