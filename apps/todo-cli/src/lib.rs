//! Todo CLI
//!
//! Line-oriented front-end for the shared todo list: lists, creates, toggles
//! and deletes todos, and follows the signed-in user's notifications.

pub mod command;
pub mod config;
pub mod render;

/// Initializes tracing with the given log level. Logs go to stderr so they
/// do not mix with command output.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
