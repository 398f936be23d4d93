//! Storage access for the shared todo list.
//!
//! This crate defines the contract the hosted backend service must satisfy
//! ([`Backend`]), an in-memory implementation of it for tests and local runs
//! ([`MemoryBackend`]), and the three accessors built on top of it: the user
//! directory, the todo repository and the notification accessor.

mod change;
mod decode;
mod error;
mod memory;
mod notifications;
mod query;
mod todos;
mod traits;
mod users;

pub use change::*;
pub use error::*;
pub use memory::*;
pub use notifications::*;
pub use query::*;
pub use todos::*;
pub use traits::*;
pub use users::*;
