//! [`Backend`](todo_store::Backend) implementation for the hosted service.
//!
//! Row verbs go over the service's REST interface ([`RestClient`]); push
//! subscriptions use its realtime websocket ([`RealtimeClient`]).

mod backend;
mod config;
mod error;
mod realtime;
mod rest;

pub use backend::*;
pub use config::*;
pub use error::*;
pub use realtime::*;
pub use rest::*;
