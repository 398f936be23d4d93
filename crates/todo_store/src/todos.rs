//! Todo repository accessor.

use std::sync::Arc;

use chrono::NaiveDate;
use entities::{normalize_task, NewTodo, Todo, TASK_TOO_SHORT_MESSAGE};
use serde_json::json;
use tracing::{debug, info};

use crate::{
    decode::{decode_row, decode_rows},
    Backend, Query, StoreError, StoreResult, TODOS_TABLE,
};

/// Which todos a listing returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoFilter {
    /// Every todo.
    All,
    /// Todos assigned to the user.
    AssignedTo(String),
    /// Todos created by the user.
    CreatedBy(String),
    /// Todos assigned to the user and due before `today`.
    Overdue { user_id: String, today: NaiveDate },
    /// Todos assigned to the user and due on `today`.
    DueToday { user_id: String, today: NaiveDate },
}

impl TodoFilter {
    /// Builds the backend query for this filter, ordered by ascending id.
    pub fn to_query(&self) -> Query {
        let query = Query::table(TODOS_TABLE).order("id", true);
        match self {
            Self::All => query,
            Self::AssignedTo(user_id) => query.eq("assigned_to", user_id.as_str()),
            Self::CreatedBy(user_id) => query.eq("user_id", user_id.as_str()),
            Self::Overdue { user_id, today } => query
                .lt("due_date", today.to_string())
                .eq("assigned_to", user_id.as_str()),
            Self::DueToday { user_id, today } => query
                .eq("due_date", today.to_string())
                .eq("assigned_to", user_id.as_str()),
        }
    }

    /// Evaluates the filter locally. Todos without a due date never match
    /// the date filters.
    pub fn matches(&self, todo: &Todo) -> bool {
        match self {
            Self::All => true,
            Self::AssignedTo(user_id) => todo.is_assigned_to(user_id),
            Self::CreatedBy(user_id) => todo.creator_id == *user_id,
            Self::Overdue { user_id, today } => {
                todo.is_assigned_to(user_id) && todo.due_date.is_some_and(|d| d < *today)
            }
            Self::DueToday { user_id, today } => {
                todo.is_assigned_to(user_id) && todo.due_date == Some(*today)
            }
        }
    }
}

/// Reads and mutates todos on the backend.
#[derive(Clone)]
pub struct TodoRepository {
    backend: Arc<dyn Backend>,
}

impl TodoRepository {
    /// Creates a todo repository over `backend`.
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Lists todos matching `filter`, ordered by ascending id.
    pub async fn list_todos(&self, filter: &TodoFilter) -> StoreResult<Vec<Todo>> {
        let rows = self.backend.select(&filter.to_query()).await?;
        debug!(?filter, count = rows.len(), "Listed todos");
        decode_rows("Todo", rows)
    }

    /// Gets a todo by ID.
    pub async fn get_todo(&self, id: i64) -> StoreResult<Option<Todo>> {
        let query = Query::table(TODOS_TABLE).eq("id", id);
        let rows = self.backend.select(&query).await?;
        rows.into_iter()
            .next()
            .map(|row| decode_row("Todo", row))
            .transpose()
    }

    /// Creates a todo. The task text is trimmed and validated before any
    /// remote call.
    pub async fn create_todo(&self, new_todo: NewTodo) -> StoreResult<Todo> {
        let task = normalize_task(&new_todo.task)
            .ok_or_else(|| StoreError::validation(TASK_TOO_SHORT_MESSAGE))?;
        let new_todo = NewTodo { task, ..new_todo };

        let row = self
            .backend
            .insert(TODOS_TABLE, serde_json::to_value(&new_todo)?)
            .await?;
        let todo: Todo = decode_row("Todo", row)?;

        info!(
            todo_id = todo.id,
            creator = %todo.creator_id,
            assignee = ?todo.assignee_id,
            "Todo created"
        );
        Ok(todo)
    }

    /// Sets the completion flag and returns the row as stored.
    pub async fn set_complete(&self, id: i64, is_complete: bool) -> StoreResult<Todo> {
        let query = Query::table(TODOS_TABLE).eq("id", id);
        let rows = self
            .backend
            .update(&query, json!({ "is_complete": is_complete }))
            .await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found("Todo", id))?;
        decode_row("Todo", row)
    }

    /// Flips the completion flag of the server's current copy and returns
    /// the authoritative row read back from the update.
    pub async fn toggle_complete(&self, id: i64) -> StoreResult<Todo> {
        let current = self
            .get_todo(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Todo", id))?;

        let todo = self.set_complete(id, !current.is_completed()).await?;
        info!(todo_id = id, is_complete = ?todo.is_complete, "Todo completion toggled");
        Ok(todo)
    }

    /// Deletes a todo.
    pub async fn delete_todo(&self, id: i64) -> StoreResult<()> {
        let query = Query::table(TODOS_TABLE).eq("id", id);
        self.backend.delete(&query).await?;
        info!(todo_id = id, "Todo deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{MemoryBackend, Verb};

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    async fn seeded() -> (Arc<MemoryBackend>, TodoRepository) {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .seed(
                TODOS_TABLE,
                vec![
                    json!({"task": "Past due", "user_id": "u1", "assigned_to": "u2", "due_date": "2024-01-10"}),
                    json!({"task": "Due today", "user_id": "u1", "assigned_to": "u2", "due_date": "2024-01-15"}),
                    json!({"task": "Upcoming", "user_id": "u1", "assigned_to": "u2", "due_date": "2024-02-01"}),
                    json!({"task": "No date", "user_id": "u1", "assigned_to": "u2"}),
                    json!({"task": "Someone else", "user_id": "u2", "assigned_to": "u3", "due_date": "2024-01-10"}),
                    json!({"task": "Mine", "user_id": "u2"}),
                ],
            )
            .await;
        let repo = TodoRepository::new(backend.clone());
        (backend, repo)
    }

    fn tasks(todos: &[Todo]) -> Vec<&str> {
        todos.iter().filter_map(|t| t.task.as_deref()).collect()
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (_, repo) = seeded().await;
        let today = day("2024-01-15");
        let user_id = "u2".to_string();

        let all = repo.list_todos(&TodoFilter::All).await.unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));

        let assigned = repo
            .list_todos(&TodoFilter::AssignedTo(user_id.clone()))
            .await
            .unwrap();
        assert_eq!(
            tasks(&assigned),
            vec!["Past due", "Due today", "Upcoming", "No date"]
        );

        let created = repo
            .list_todos(&TodoFilter::CreatedBy(user_id.clone()))
            .await
            .unwrap();
        assert_eq!(tasks(&created), vec!["Someone else", "Mine"]);

        let overdue = repo
            .list_todos(&TodoFilter::Overdue {
                user_id: user_id.clone(),
                today,
            })
            .await
            .unwrap();
        assert_eq!(tasks(&overdue), vec!["Past due"]);

        let due_today = repo
            .list_todos(&TodoFilter::DueToday { user_id, today })
            .await
            .unwrap();
        assert_eq!(tasks(&due_today), vec!["Due today"]);
    }

    #[tokio::test]
    async fn test_local_match_agrees_with_query() {
        let (_, repo) = seeded().await;
        let today = day("2024-01-15");
        let all = repo.list_todos(&TodoFilter::All).await.unwrap();

        let filters = vec![
            TodoFilter::All,
            TodoFilter::AssignedTo("u2".to_string()),
            TodoFilter::CreatedBy("u1".to_string()),
            TodoFilter::Overdue {
                user_id: "u2".to_string(),
                today,
            },
            TodoFilter::DueToday {
                user_id: "u2".to_string(),
                today,
            },
        ];
        for filter in filters {
            let remote = repo.list_todos(&filter).await.unwrap();
            let local: Vec<Todo> = all.iter().filter(|t| filter.matches(t)).cloned().collect();
            assert_eq!(remote, local, "filter {:?}", filter);
        }
    }

    #[tokio::test]
    async fn test_short_task_never_reaches_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let repo = TodoRepository::new(backend.clone());

        for task in ["", "abc", "  ab  ", "   abc\t"] {
            let err = repo.create_todo(NewTodo::new(task, "u1")).await.unwrap_err();
            assert!(err.is_validation());
            assert_eq!(err.to_string(), "Task must be at least 4 characters.");
        }
        assert_eq!(backend.call_count(Verb::Insert, TODOS_TABLE), 0);
    }

    #[tokio::test]
    async fn test_create_trims_task() {
        let backend = Arc::new(MemoryBackend::new());
        let repo = TodoRepository::new(backend);

        let todo = repo
            .create_todo(NewTodo::new("  Buy milk  ", "u1").with_due_date(day("2024-01-10")))
            .await
            .unwrap();

        assert_eq!(todo.id, 1);
        assert_eq!(todo.task.as_deref(), Some("Buy milk"));
        assert_eq!(todo.due_date, Some(day("2024-01-10")));
        assert_eq!(todo.assignee_id, None);
    }

    #[tokio::test]
    async fn test_create_surfaces_backend_rejection() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next(
            Verb::Insert,
            TODOS_TABLE,
            "insert or update on table \"todos\" violates foreign key constraint",
        );
        let repo = TodoRepository::new(backend);

        let err = repo
            .create_todo(NewTodo::new("Buy milk", "u1").with_assignee("ghost"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Remote { .. }));
        assert!(err.to_string().contains("foreign key"));
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_value() {
        let (_, repo) = seeded().await;
        let original = repo.get_todo(1).await.unwrap().unwrap().is_completed();

        let once = repo.toggle_complete(1).await.unwrap();
        assert_eq!(once.is_completed(), !original);

        let twice = repo.toggle_complete(1).await.unwrap();
        assert_eq!(twice.is_completed(), original);
    }

    #[tokio::test]
    async fn test_toggle_reads_server_value() {
        let (backend, repo) = seeded().await;
        // Another actor completed the todo behind our back.
        backend
            .update(
                &Query::table(TODOS_TABLE).eq("id", 2),
                json!({"is_complete": true}),
            )
            .await
            .unwrap();

        let todo = repo.toggle_complete(2).await.unwrap();
        assert_eq!(todo.is_complete, Some(false));
    }

    #[tokio::test]
    async fn test_toggle_missing_todo() {
        let (_, repo) = seeded().await;

        let err = repo.toggle_complete(99).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete() {
        let (backend, repo) = seeded().await;

        repo.delete_todo(1).await.unwrap();
        assert!(repo.get_todo(1).await.unwrap().is_none());

        backend.fail_next(Verb::Delete, TODOS_TABLE, "permission denied");
        let err = repo.delete_todo(2).await.unwrap_err();
        assert_eq!(err.to_string(), "permission denied");
        assert!(repo.get_todo(2).await.unwrap().is_some());
    }
}
