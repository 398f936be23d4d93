//! Two-step todo creation: create the todo, then notify its assignee.

use entities::{NewNotification, NewTodo, Notification, Todo};
use todo_store::{NotificationStore, StoreResult, TodoRepository};
use tracing::{info, warn};

/// Result of the notification step.
#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    /// No assignee, or the creator assigned the todo to themselves.
    NotRequired,
    /// The assignee was notified.
    Sent(Notification),
    /// The todo was created but the notification failed.
    Failed(String),
}

impl NotifyOutcome {
    /// Returns the failure message, if the step failed.
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Result of a completed saga. The todo always exists.
#[derive(Debug, Clone, PartialEq)]
pub struct SagaOutcome {
    /// The created todo as stored.
    pub todo: Todo,
    /// What happened in the notification step.
    pub notification: NotifyOutcome,
}

/// Creates todos and notifies assignees.
///
/// A failure in the first step aborts the saga. A failure in the second step
/// is logged and reported in the outcome; the todo is not rolled back.
#[derive(Clone)]
pub struct AssignmentSaga {
    todos: TodoRepository,
    notifications: NotificationStore,
}

impl AssignmentSaga {
    /// Creates a saga over the given accessors.
    pub fn new(todos: TodoRepository, notifications: NotificationStore) -> Self {
        Self {
            todos,
            notifications,
        }
    }

    /// Runs both steps for `new_todo`.
    pub async fn run(&self, new_todo: NewTodo) -> StoreResult<SagaOutcome> {
        let todo = self.todos.create_todo(new_todo).await?;
        let notification = self.notify_assignee(&todo).await;
        Ok(SagaOutcome { todo, notification })
    }

    async fn notify_assignee(&self, todo: &Todo) -> NotifyOutcome {
        let Some(assignee) = todo
            .assignee_id
            .as_deref()
            .filter(|assignee| *assignee != todo.creator_id)
        else {
            return NotifyOutcome::NotRequired;
        };

        let task = todo.task.as_deref().unwrap_or_default();
        let notification = NewNotification::assignment(assignee, &todo.creator_id, todo.id, task);

        match self.notifications.create_notification(notification).await {
            Ok(sent) => {
                info!(todo_id = todo.id, assignee, "Assignee notified");
                NotifyOutcome::Sent(sent)
            }
            Err(e) => {
                warn!(
                    todo_id = todo.id,
                    assignee,
                    error = %e,
                    "Todo created but assignee notification failed"
                );
                NotifyOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use todo_store::{MemoryBackend, Verb, NOTIFICATIONS_TABLE, TODOS_TABLE};

    use super::*;

    fn saga(backend: &Arc<MemoryBackend>) -> AssignmentSaga {
        AssignmentSaga::new(
            TodoRepository::new(backend.clone()),
            NotificationStore::new(backend.clone()),
        )
    }

    #[tokio::test]
    async fn test_assignment_sends_one_notification() {
        let backend = Arc::new(MemoryBackend::new());

        let outcome = saga(&backend)
            .run(NewTodo::new("Buy milk", "u1").with_assignee("u2"))
            .await
            .unwrap();

        let NotifyOutcome::Sent(sent) = &outcome.notification else {
            panic!("expected a notification, got {:?}", outcome.notification);
        };
        assert_eq!(sent.recipient_id, "u2");
        assert_eq!(sent.sender_id, "u1");
        assert_eq!(sent.related_todo_id, Some(outcome.todo.id));
        assert_eq!(
            sent.message.as_deref(),
            Some("You have been assigned a new task: \"Buy milk\"")
        );
        assert_eq!(backend.call_count(Verb::Insert, NOTIFICATIONS_TABLE), 1);
    }

    #[tokio::test]
    async fn test_no_notification_without_other_assignee() {
        let backend = Arc::new(MemoryBackend::new());
        let saga = saga(&backend);

        let unassigned = saga.run(NewTodo::new("Buy milk", "u1")).await.unwrap();
        let self_assigned = saga
            .run(NewTodo::new("Walk dog", "u1").with_assignee("u1"))
            .await
            .unwrap();

        assert_eq!(unassigned.notification, NotifyOutcome::NotRequired);
        assert_eq!(self_assigned.notification, NotifyOutcome::NotRequired);
        assert_eq!(backend.call_count(Verb::Insert, NOTIFICATIONS_TABLE), 0);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_todo() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next(Verb::Insert, NOTIFICATIONS_TABLE, "notifications unavailable");

        let outcome = saga(&backend)
            .run(NewTodo::new("Buy milk", "u1").with_assignee("u2"))
            .await
            .unwrap();

        assert_eq!(outcome.notification.failure(), Some("notifications unavailable"));
        assert_eq!(backend.rows(TODOS_TABLE).await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_create_skips_notification() {
        let backend = Arc::new(MemoryBackend::new());
        backend.fail_next(Verb::Insert, TODOS_TABLE, "permission denied");

        let err = saga(&backend)
            .run(NewTodo::new("Buy milk", "u1").with_assignee("u2"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "permission denied");
        assert_eq!(backend.call_count(Verb::Insert, NOTIFICATIONS_TABLE), 0);
    }
}
