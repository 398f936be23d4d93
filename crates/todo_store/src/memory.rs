//! In-memory backend implementation for testing and local runs.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use entities::MIN_TASK_LENGTH;
use serde_json::{Map, Value};
use tokio::sync::{oneshot, RwLock};
use tracing::debug;

use crate::{
    Backend, BackendError, BackendResult, ChangeEvent, ChangeFeed, ChangeSender, ChangeStream,
    Query, Row, NOTIFICATIONS_TABLE, TODOS_TABLE,
};

/// Backend operation kinds, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `Backend::select`.
    Select,
    /// `Backend::insert`.
    Insert,
    /// `Backend::update`.
    Update,
    /// `Backend::delete`.
    Delete,
    /// `Backend::subscribe`.
    Subscribe,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    last_id: i64,
}

#[derive(Debug)]
struct Subscriber {
    feed: ChangeFeed,
    tx: ChangeSender,
}

#[derive(Debug)]
struct InjectedFailure {
    verb: Verb,
    table: String,
    message: String,
}

/// In-memory backend with the column defaults and check constraints of the
/// hosted schema, plus hooks for tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Table>>,
    subscribers: Mutex<Vec<Subscriber>>,
    failures: Mutex<Vec<InjectedFailure>>,
    gates: Mutex<HashMap<(Verb, String), oneshot::Receiver<()>>>,
    calls: Mutex<HashMap<(Verb, String), usize>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Column that receives the insertion timestamp, per table.
fn timestamp_column(table: &str) -> Option<&'static str> {
    match table {
        TODOS_TABLE => Some("inserted_at"),
        NOTIFICATIONS_TABLE => Some("created_at"),
        _ => None,
    }
}

fn check_constraints(table: &str, row: &Map<String, Value>) -> BackendResult<()> {
    if table == TODOS_TABLE {
        if let Some(Value::String(task)) = row.get("task") {
            if task.trim().chars().count() < MIN_TASK_LENGTH {
                return Err(BackendError::new(
                    "new row for relation \"todos\" violates check constraint \"todos_task_check\"",
                ));
            }
        }
        if !matches!(row.get("user_id"), Some(Value::String(_))) {
            return Err(BackendError::new(
                "null value in column \"user_id\" of relation \"todos\" violates not-null constraint",
            ));
        }
    }
    Ok(())
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores rows as-is, assigning ids and timestamps only where missing.
    /// Constraints are not checked and subscribers are not notified.
    pub async fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.tables.write().await;
        let state = tables.entry(table.to_string()).or_default();
        for row in rows {
            if let Value::Object(mut object) = row {
                Self::fill_defaults(table, state, &mut object);
                state.rows.push(Value::Object(object));
            }
        }
    }

    /// Makes the next `verb` call against `table` fail with `message`.
    pub fn fail_next(&self, verb: Verb, table: &str, message: impl Into<String>) {
        lock(&self.failures).push(InjectedFailure {
            verb,
            table: table.to_string(),
            message: message.into(),
        });
    }

    /// Number of `verb` calls made against `table`, including failed ones.
    pub fn call_count(&self, verb: Verb, table: &str) -> usize {
        lock(&self.calls)
            .get(&(verb, table.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Holds the next select on `table` until the returned sender fires or
    /// is dropped. The result is computed after release.
    pub fn gate_next_select(&self, table: &str) -> oneshot::Sender<()> {
        self.gate_next(Verb::Select, table)
    }

    /// Holds the next insert into `table` until the returned sender fires or
    /// is dropped.
    pub fn gate_next_insert(&self, table: &str) -> oneshot::Sender<()> {
        self.gate_next(Verb::Insert, table)
    }

    fn gate_next(&self, verb: Verb, table: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        lock(&self.gates).insert((verb, table.to_string()), rx);
        tx
    }

    async fn pass_gate(&self, verb: Verb, table: &str) {
        let gate = lock(&self.gates).remove(&(verb, table.to_string()));
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }

    /// Number of subscriptions whose stream is still held by a consumer.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|s| !s.tx.is_closed());
        subscribers.len()
    }

    /// Ends every open change stream, as the service does when the realtime
    /// connection drops.
    pub fn disconnect_all(&self) {
        let dropped = std::mem::take(&mut *lock(&self.subscribers));
        debug!(count = dropped.len(), "Disconnected change streams");
    }

    /// Snapshot of every row in `table`, in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let tables = self.tables.read().await;
        tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn fill_defaults(table: &str, state: &mut Table, row: &mut Map<String, Value>) {
        match row.get("id").and_then(Value::as_i64) {
            Some(id) => state.last_id = state.last_id.max(id),
            None if !matches!(row.get("id"), Some(Value::String(_))) => {
                state.last_id += 1;
                row.insert("id".to_string(), Value::from(state.last_id));
            }
            None => {}
        }
        if let Some(column) = timestamp_column(table) {
            if row.get(column).map_or(true, Value::is_null) {
                row.insert(column.to_string(), Value::from(now_timestamp()));
            }
        }
        let flag = match table {
            TODOS_TABLE => Some("is_complete"),
            NOTIFICATIONS_TABLE => Some("is_read"),
            _ => None,
        };
        if let Some(flag) = flag {
            if row.get(flag).map_or(true, Value::is_null) {
                row.insert(flag.to_string(), Value::Bool(false));
            }
        }
    }

    fn count(&self, verb: Verb, table: &str) {
        *lock(&self.calls)
            .entry((verb, table.to_string()))
            .or_insert(0) += 1;
    }

    fn take_failure(&self, verb: Verb, table: &str) -> BackendResult<()> {
        let mut failures = lock(&self.failures);
        if let Some(index) = failures
            .iter()
            .position(|f| f.verb == verb && f.table == table)
        {
            let failure = failures.remove(index);
            debug!(?verb, table, message = %failure.message, "Injected backend failure");
            return Err(BackendError::new(failure.message));
        }
        Ok(())
    }

    fn begin(&self, verb: Verb, table: &str) -> BackendResult<()> {
        self.count(verb, table);
        self.take_failure(verb, table)
    }

    fn publish(&self, event: ChangeEvent, table: &str, row: &Row) {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|s| !s.tx.is_closed());
        for subscriber in subscribers.iter() {
            if subscriber.feed.accepts(event, table, row) {
                // A receiver closing between retain and send is harmless.
                let _ = subscriber.tx.send(row.clone());
            }
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn select(&self, query: &Query) -> BackendResult<Vec<Row>> {
        self.count(Verb::Select, &query.table);

        self.pass_gate(Verb::Select, &query.table).await;
        self.take_failure(Verb::Select, &query.table)?;

        let tables = self.tables.read().await;
        let mut rows: Vec<Row> = tables
            .get(&query.table)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|r| query.matches(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        query.sort(&mut rows);

        Ok(rows.iter().map(|r| query.project(r)).collect())
    }

    async fn insert(&self, table: &str, row: Row) -> BackendResult<Row> {
        self.count(Verb::Insert, table);
        self.pass_gate(Verb::Insert, table).await;
        self.take_failure(Verb::Insert, table)?;

        let Value::Object(mut object) = row else {
            return Err(BackendError::new("insert payload must be an object"));
        };
        check_constraints(table, &object)?;

        let mut tables = self.tables.write().await;
        let state = tables.entry(table.to_string()).or_default();
        Self::fill_defaults(table, state, &mut object);
        let stored = Value::Object(object);
        state.rows.push(stored.clone());

        self.publish(ChangeEvent::Insert, table, &stored);
        Ok(stored)
    }

    async fn update(&self, query: &Query, patch: Row) -> BackendResult<Vec<Row>> {
        self.begin(Verb::Update, &query.table)?;

        let Value::Object(patch) = patch else {
            return Err(BackendError::new("update payload must be an object"));
        };

        let mut tables = self.tables.write().await;
        let Some(state) = tables.get_mut(&query.table) else {
            return Ok(Vec::new());
        };

        let mut updated = Vec::new();
        for row in state.rows.iter_mut().filter(|r| query.matches(r)) {
            let Some(object) = row.as_object_mut() else {
                continue;
            };
            let mut candidate = object.clone();
            for (column, value) in &patch {
                candidate.insert(column.clone(), value.clone());
            }
            check_constraints(&query.table, &candidate)?;
            *object = candidate;
            updated.push(row.clone());
        }

        for row in &updated {
            self.publish(ChangeEvent::Update, &query.table, row);
        }
        Ok(updated.iter().map(|r| query.project(r)).collect())
    }

    async fn delete(&self, query: &Query) -> BackendResult<()> {
        self.begin(Verb::Delete, &query.table)?;

        let mut tables = self.tables.write().await;
        let Some(state) = tables.get_mut(&query.table) else {
            return Ok(());
        };

        let (removed, kept): (Vec<Row>, Vec<Row>) =
            state.rows.drain(..).partition(|r| query.matches(r));
        state.rows = kept;

        for row in &removed {
            self.publish(ChangeEvent::Delete, &query.table, row);
        }
        Ok(())
    }

    async fn subscribe(&self, feed: &ChangeFeed) -> BackendResult<ChangeStream> {
        self.begin(Verb::Subscribe, &feed.table)?;

        let (tx, stream) = ChangeStream::channel();
        lock(&self.subscribers).push(Subscriber {
            feed: feed.clone(),
            tx,
        });
        debug!(table = %feed.table, filter = ?feed.filter.as_ref().map(|f| f.to_string()), "Subscribed to change feed");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::ChangeFilter;

    #[tokio::test]
    async fn test_insert_assigns_server_columns() {
        let backend = MemoryBackend::new();

        let first = backend
            .insert(TODOS_TABLE, json!({"task": "Buy milk", "user_id": "u1"}))
            .await
            .unwrap();
        let second = backend
            .insert(TODOS_TABLE, json!({"task": "Walk dog", "user_id": "u1"}))
            .await
            .unwrap();

        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);
        assert_eq!(first["is_complete"], false);
        assert!(first["inserted_at"].is_string());
    }

    #[tokio::test]
    async fn test_task_check_constraint() {
        let backend = MemoryBackend::new();

        let err = backend
            .insert(TODOS_TABLE, json!({"task": "abc", "user_id": "u1"}))
            .await
            .unwrap_err();

        assert!(err.message.contains("todos_task_check"));
        assert!(backend.rows(TODOS_TABLE).await.is_empty());
    }

    #[tokio::test]
    async fn test_fail_next_only_fails_once() {
        let backend = MemoryBackend::new();
        backend.fail_next(Verb::Select, TODOS_TABLE, "connection reset");

        let query = Query::table(TODOS_TABLE);
        assert_eq!(
            backend.select(&query).await.unwrap_err().message,
            "connection reset"
        );
        assert!(backend.select(&query).await.is_ok());
        assert_eq!(backend.call_count(Verb::Select, TODOS_TABLE), 2);
    }

    #[tokio::test]
    async fn test_update_returns_stored_rows() {
        let backend = MemoryBackend::new();
        backend
            .insert(TODOS_TABLE, json!({"task": "Buy milk", "user_id": "u1"}))
            .await
            .unwrap();

        let rows = backend
            .update(
                &Query::table(TODOS_TABLE).eq("id", 1),
                json!({"is_complete": true}),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["is_complete"], true);
        assert_eq!(rows[0]["task"], "Buy milk");
    }

    #[tokio::test]
    async fn test_delete_matching_rows() {
        let backend = MemoryBackend::new();
        backend
            .seed(
                TODOS_TABLE,
                vec![
                    json!({"task": "Buy milk", "user_id": "u1"}),
                    json!({"task": "Walk dog", "user_id": "u1"}),
                ],
            )
            .await;

        backend
            .delete(&Query::table(TODOS_TABLE).eq("id", 1))
            .await
            .unwrap();

        let rows = backend.rows(TODOS_TABLE).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], 2);
    }

    #[tokio::test]
    async fn test_inserts_fan_out_to_matching_feeds() {
        let backend = MemoryBackend::new();
        let feed = ChangeFeed::inserts(NOTIFICATIONS_TABLE)
            .with_filter(ChangeFilter::eq("recipient_id", "u2"));
        let mut stream = backend.subscribe(&feed).await.unwrap();

        backend
            .insert(
                NOTIFICATIONS_TABLE,
                json!({"recipient_id": "u1", "sender_id": "u2"}),
            )
            .await
            .unwrap();
        backend
            .insert(
                NOTIFICATIONS_TABLE,
                json!({"recipient_id": "u2", "sender_id": "u1"}),
            )
            .await
            .unwrap();

        let row = stream.recv().await.unwrap();
        assert_eq!(row["recipient_id"], "u2");
        assert_eq!(row["id"], 2);
    }

    #[tokio::test]
    async fn test_disconnect_ends_streams() {
        let backend = MemoryBackend::new();
        let mut stream = backend
            .subscribe(&ChangeFeed::inserts(NOTIFICATIONS_TABLE))
            .await
            .unwrap();

        backend.disconnect_all();

        assert!(stream.recv().await.is_none());
        assert_eq!(backend.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_stream_releases_subscription() {
        let backend = MemoryBackend::new();
        let stream = backend
            .subscribe(&ChangeFeed::inserts(NOTIFICATIONS_TABLE))
            .await
            .unwrap();
        assert_eq!(backend.subscriber_count(), 1);

        drop(stream);
        assert_eq!(backend.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_gated_select_waits_for_release() {
        let backend = std::sync::Arc::new(MemoryBackend::new());
        let release = backend.gate_next_select(TODOS_TABLE);

        let reader = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.select(&Query::table(TODOS_TABLE)).await })
        };

        backend
            .insert(TODOS_TABLE, json!({"task": "Buy milk", "user_id": "u1"}))
            .await
            .unwrap();
        release.send(()).unwrap();

        let rows = reader.await.unwrap().unwrap();
        assert_eq!(rows.len(), 1);
    }
}
