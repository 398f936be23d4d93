//! Client-side synchronization for the shared todo list.
//!
//! The [`TodoListController`] owns the visible todo list for one user and one
//! active filter. The [`NotificationFeed`] merges the initial notification
//! fetch with the standing push subscription. Both apply remote results
//! through the explicit merge functions in [`reconcile`].

mod clock;
mod controller;
mod feed;
pub mod reconcile;
mod saga;

pub use clock::*;
pub use controller::*;
pub use feed::*;
pub use saga::*;
