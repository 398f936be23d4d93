//! Core entity definitions for the shared todo list.
//!
//! This crate defines the row types exchanged with the backend service:
//! todos, assignment notifications and user profiles. Field names follow the
//! Rust side; serde renames map them onto the backend's column names.

mod notification;
mod todo;
mod user;

pub use notification::*;
pub use todo::*;
pub use user::*;
