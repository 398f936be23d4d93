//! Notification entity definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Builds the message sent to a user when a task is assigned to them.
pub fn assignment_message(task: &str) -> String {
    format!("You have been assigned a new task: \"{}\"", task)
}

/// An in-app notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Server-assigned identifier.
    pub id: i64,
    /// User the notification is for.
    pub recipient_id: String,
    /// User whose action produced the notification.
    pub sender_id: String,
    /// Todo the notification refers to.
    #[serde(rename = "todo_id", default)]
    pub related_todo_id: Option<i64>,
    /// Display text.
    #[serde(default)]
    pub message: Option<String>,
    /// Read flag. Not mutated by this client.
    #[serde(default)]
    pub is_read: Option<bool>,
    /// When the row was inserted.
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    /// Recipient user ID.
    pub recipient_id: String,
    /// Sender user ID.
    pub sender_id: String,
    /// Related todo ID.
    #[serde(rename = "todo_id")]
    pub related_todo_id: Option<i64>,
    /// Display text.
    pub message: Option<String>,
}

impl NewNotification {
    /// Creates the notification sent when `task` is assigned by `sender_id`.
    pub fn assignment(
        recipient_id: impl Into<String>,
        sender_id: impl Into<String>,
        todo_id: i64,
        task: &str,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            sender_id: sender_id.into(),
            related_todo_id: Some(todo_id),
            message: Some(assignment_message(task)),
        }
    }
}
