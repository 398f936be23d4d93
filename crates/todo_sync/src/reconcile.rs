//! Merge rules for applying remote results to local lists.
//!
//! Notifications arrive from two independent sources, the initial fetch and
//! the push subscription, in either order and possibly more than once. Todos
//! change through the controller's own mutations. Every change goes through
//! a function here, which returns the new list.

use std::cmp::Ordering;

use entities::{Notification, Todo};

/// Number of notifications shown at once.
pub const MAX_VISIBLE_NOTIFICATIONS: usize = 5;

/// A remote result affecting the notification list.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    /// The initial fetch completed.
    Fetched(Vec<Notification>),
    /// The subscription pushed an inserted notification.
    Inserted(Notification),
}

fn newest_first(a: &Notification, b: &Notification) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Applies `event` to `local`.
///
/// - `Inserted`: replaces the item with the same id in place, otherwise
///   prepends it.
/// - `Fetched`: unions the fetched list with `local` by id, the fetched copy
///   winning on duplicates, sorted newest first. Items pushed before the
///   fetch completed are kept.
pub fn reconcile(local: &[Notification], event: NotificationEvent) -> Vec<Notification> {
    match event {
        NotificationEvent::Inserted(notification) => {
            let mut merged = local.to_vec();
            match merged.iter_mut().find(|n| n.id == notification.id) {
                Some(existing) => *existing = notification,
                None => merged.insert(0, notification),
            }
            merged
        }
        NotificationEvent::Fetched(fetched) => {
            let mut merged: Vec<Notification> = local
                .iter()
                .filter(|n| !fetched.iter().any(|f| f.id == n.id))
                .cloned()
                .collect();
            merged.extend(fetched);
            merged.sort_by(newest_first);
            merged
        }
    }
}

/// The most recent notifications, capped at [`MAX_VISIBLE_NOTIFICATIONS`].
pub fn visible(notifications: &[Notification]) -> &[Notification] {
    &notifications[..notifications.len().min(MAX_VISIBLE_NOTIFICATIONS)]
}

/// A confirmed mutation of the todo list.
#[derive(Debug, Clone, PartialEq)]
pub enum TodoEvent {
    /// A todo was created.
    Created(Todo),
    /// The server returned a new version of a todo.
    Updated(Todo),
    /// A todo was deleted.
    Removed(i64),
}

/// Applies `event` to `local`.
///
/// Created todos are appended regardless of the active filter; a todo whose
/// id is already present replaces the existing entry instead. Updates for
/// todos not in the list are ignored.
pub fn reconcile_todos(local: &[Todo], event: TodoEvent) -> Vec<Todo> {
    let mut todos = local.to_vec();
    match event {
        TodoEvent::Created(todo) => match todos.iter_mut().find(|t| t.id == todo.id) {
            Some(existing) => *existing = todo,
            None => todos.push(todo),
        },
        TodoEvent::Updated(todo) => {
            if let Some(existing) = todos.iter_mut().find(|t| t.id == todo.id) {
                *existing = todo;
            }
        }
        TodoEvent::Removed(id) => todos.retain(|t| t.id != id),
    }
    todos
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn at(ts: &str) -> DateTime<Utc> {
        ts.parse().unwrap()
    }

    fn notification(id: i64, created_at: &str) -> Notification {
        Notification {
            id,
            recipient_id: "u2".to_string(),
            sender_id: "u1".to_string(),
            related_todo_id: None,
            message: Some(format!("message {}", id)),
            is_read: Some(false),
            created_at: at(created_at),
        }
    }

    fn todo(id: i64) -> Todo {
        Todo {
            id,
            created_at: at("2024-01-01T00:00:00Z"),
            is_complete: Some(false),
            task: Some(format!("task {}", id)),
            creator_id: "u1".to_string(),
            assignee_id: None,
            due_date: None,
        }
    }

    fn ids(notifications: &[Notification]) -> Vec<i64> {
        notifications.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_insert_prepends() {
        let local = vec![notification(1, "2024-01-01T00:00:00Z")];

        let merged = reconcile(
            &local,
            NotificationEvent::Inserted(notification(2, "2024-01-02T00:00:00Z")),
        );

        assert_eq!(ids(&merged), vec![2, 1]);
    }

    #[test]
    fn test_duplicate_push_is_applied_once() {
        let pushed = notification(2, "2024-01-02T00:00:00Z");
        let once = reconcile(&[], NotificationEvent::Inserted(pushed.clone()));
        let twice = reconcile(&once, NotificationEvent::Inserted(pushed));

        assert_eq!(ids(&twice), vec![2]);
    }

    #[test]
    fn test_fetch_after_push_keeps_pushed_item_once() {
        let pushed = notification(3, "2024-01-03T00:00:00Z");
        let local = reconcile(&[], NotificationEvent::Inserted(pushed.clone()));

        // The fetch raced the push and already contains the pushed row.
        let fetched = vec![
            pushed,
            notification(2, "2024-01-02T00:00:00Z"),
            notification(1, "2024-01-01T00:00:00Z"),
        ];
        let merged = reconcile(&local, NotificationEvent::Fetched(fetched));

        assert_eq!(ids(&merged), vec![3, 2, 1]);
    }

    #[test]
    fn test_stale_fetch_does_not_drop_pushed_item() {
        let local = reconcile(
            &[],
            NotificationEvent::Inserted(notification(3, "2024-01-03T00:00:00Z")),
        );

        // The fetch was evaluated before the push happened.
        let fetched = vec![notification(1, "2024-01-01T00:00:00Z")];
        let merged = reconcile(&local, NotificationEvent::Fetched(fetched));

        assert_eq!(ids(&merged), vec![3, 1]);
    }

    #[test]
    fn test_fetched_copy_wins() {
        let mut stale = notification(1, "2024-01-01T00:00:00Z");
        stale.message = None;
        let fresh = notification(1, "2024-01-01T00:00:00Z");

        let merged = reconcile(&[stale], NotificationEvent::Fetched(vec![fresh.clone()]));

        assert_eq!(merged, vec![fresh]);
    }

    #[test]
    fn test_visible_is_capped() {
        let list: Vec<Notification> = (1..=7)
            .rev()
            .map(|id| notification(id, "2024-01-01T00:00:00Z"))
            .collect();

        assert_eq!(ids(visible(&list)), vec![7, 6, 5, 4, 3]);
        assert_eq!(visible(&list[..2]).len(), 2);
    }

    #[test]
    fn test_todo_events() {
        let local = vec![todo(1), todo(2)];

        let created = reconcile_todos(&local, TodoEvent::Created(todo(3)));
        assert_eq!(created.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);

        let recreated = reconcile_todos(&created, TodoEvent::Created(todo(3)));
        assert_eq!(recreated.len(), 3);

        let mut done = todo(2);
        done.is_complete = Some(true);
        let updated = reconcile_todos(&created, TodoEvent::Updated(done));
        assert!(updated[1].is_completed());

        let ignored = reconcile_todos(&local, TodoEvent::Updated(todo(9)));
        assert_eq!(ignored, local);

        let removed = reconcile_todos(&updated, TodoEvent::Removed(1));
        assert_eq!(removed.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 3]);
    }
}
