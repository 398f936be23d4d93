//! Plain-text rendering of list rows.

use entities::{DueStatus, Notification, Todo, User};

/// One line per todo: completion box, id, task, assignee and due date.
pub fn todo_line(todo: &Todo, assignee_email: Option<&str>, due: Option<DueStatus>) -> String {
    let check = if todo.is_completed() { "x" } else { " " };
    let mut line = format!(
        "[{}] #{} {}",
        check,
        todo.id,
        todo.task.as_deref().unwrap_or("(no task)")
    );

    if let Some(assignee) = todo.assignee_id.as_deref() {
        line.push_str(&format!("  @{}", assignee_email.unwrap_or(assignee)));
    }

    if let Some(due_date) = todo.due_date {
        let label = match due {
            Some(DueStatus::Overdue) => " (overdue)",
            Some(DueStatus::Today) => " (today)",
            _ => "",
        };
        line.push_str(&format!("  due {}{}", due_date, label));
    }

    line
}

/// One line per notification, newest first in callers' lists.
pub fn notification_line(notification: &Notification) -> String {
    format!(
        "{}  {}",
        notification.created_at.format("%Y-%m-%d %H:%M"),
        notification.message.as_deref().unwrap_or("(no message)")
    )
}

pub fn user_line(user: &User) -> String {
    format!("{}  {}", user.id, user.email)
}
