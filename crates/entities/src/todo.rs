//! Todo entity definitions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Minimum number of characters in a trimmed task description.
pub const MIN_TASK_LENGTH: usize = 4;

/// Message shown when a task description is too short.
pub const TASK_TOO_SHORT_MESSAGE: &str = "Task must be at least 4 characters.";

/// Trims a raw task description and checks it against [`MIN_TASK_LENGTH`].
///
/// Returns `None` when the trimmed text is too short.
pub fn normalize_task(raw: &str) -> Option<String> {
    let task = raw.trim();
    if task.chars().count() < MIN_TASK_LENGTH {
        None
    } else {
        Some(task.to_string())
    }
}

/// Where a todo's due date falls relative to a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueStatus {
    /// Due before the given day.
    Overdue,
    /// Due on the given day.
    Today,
    /// Due after the given day.
    Upcoming,
}

/// A todo row as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    /// Server-assigned identifier.
    pub id: i64,
    /// When the row was inserted.
    #[serde(rename = "inserted_at")]
    pub created_at: DateTime<Utc>,
    /// Completion flag, unset until first toggled on some backends.
    #[serde(default)]
    pub is_complete: Option<bool>,
    /// Task description.
    #[serde(default)]
    pub task: Option<String>,
    /// User who created the todo.
    #[serde(rename = "user_id")]
    pub creator_id: String,
    /// User the todo is assigned to.
    #[serde(rename = "assigned_to", default)]
    pub assignee_id: Option<String>,
    /// Calendar day the todo is due.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

impl Todo {
    /// Returns true if the todo has been marked complete.
    pub fn is_completed(&self) -> bool {
        self.is_complete.unwrap_or(false)
    }

    /// Returns true if the todo is assigned to `user_id`.
    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.assignee_id.as_deref() == Some(user_id)
    }

    /// Classifies the due date against `today`.
    pub fn due_status(&self, today: NaiveDate) -> Option<DueStatus> {
        let due = self.due_date?;
        Some(match due.cmp(&today) {
            std::cmp::Ordering::Less => DueStatus::Overdue,
            std::cmp::Ordering::Equal => DueStatus::Today,
            std::cmp::Ordering::Greater => DueStatus::Upcoming,
        })
    }
}

/// Insert payload for a new todo. The backend assigns `id` and `inserted_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTodo {
    /// Task description, already trimmed and validated.
    pub task: String,
    /// Creating user.
    #[serde(rename = "user_id")]
    pub creator_id: String,
    /// Optional assignee.
    #[serde(rename = "assigned_to")]
    pub assignee_id: Option<String>,
    /// Optional due date.
    pub due_date: Option<NaiveDate>,
}

impl NewTodo {
    /// Creates an unassigned insert payload without a due date.
    pub fn new(task: impl Into<String>, creator_id: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            creator_id: creator_id.into(),
            assignee_id: None,
            due_date: None,
        }
    }

    /// Sets the assignee.
    pub fn with_assignee(mut self, assignee_id: impl Into<String>) -> Self {
        self.assignee_id = Some(assignee_id.into());
        self
    }

    /// Sets the due date.
    pub fn with_due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }

    /// Returns true if creating this todo should notify someone else.
    pub fn notifies_assignee(&self) -> bool {
        matches!(&self.assignee_id, Some(assignee) if *assignee != self.creator_id)
    }
}
