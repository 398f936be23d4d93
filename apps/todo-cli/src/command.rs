//! Command-line parsing.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use todo_sync::FilterKind;

/// Shared todo list client.
#[derive(Debug, Parser)]
#[command(name = "todo-cli", version, about)]
pub struct Cli {
    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List todos (all, assigned, created, overdue, today).
    List {
        filter: Option<FilterKind>,
    },

    /// Create a todo.
    Add {
        /// Task text; words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        task: Vec<String>,

        /// User id to assign the todo to.
        #[arg(long)]
        assign: Option<String>,

        /// Due date (YYYY-MM-DD).
        #[arg(long)]
        due: Option<NaiveDate>,
    },

    /// Flip a todo's completion.
    Toggle { id: i64 },

    /// Delete a todo.
    Delete { id: i64 },

    /// List users.
    Users,

    /// Follow your notifications.
    Watch,
}
