//! User-related entity definitions.

use serde::{Deserialize, Serialize};

/// A user profile as listed in assignment pickers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Identifier from the backend's auth system.
    pub id: String,
    /// Email address.
    pub email: String,
}

impl User {
    /// Creates a new user.
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Returns every user except `self_id`, preserving order.
pub fn assignable_users<'a>(users: &'a [User], self_id: &str) -> Vec<&'a User> {
    users.iter().filter(|u| u.id != self_id).collect()
}

/// Looks up the email of the user with `id`.
pub fn email_for<'a>(users: &'a [User], id: &str) -> Option<&'a str> {
    users
        .iter()
        .find(|u| u.id == id)
        .map(|u| u.email.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assignable_users_excludes_self() {
        let users = vec![
            User::new("u1", "one@example.com"),
            User::new("u2", "two@example.com"),
            User::new("u3", "three@example.com"),
        ];

        let ids: Vec<&str> = assignable_users(&users, "u2")
            .into_iter()
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(ids, vec!["u1", "u3"]);
    }

    #[test]
    fn test_email_for() {
        let users = vec![User::new("u1", "one@example.com")];

        assert_eq!(email_for(&users, "u1"), Some("one@example.com"));
        assert_eq!(email_for(&users, "missing"), None);
    }
}
