//! Change feed descriptions and the stream of pushed rows.

use std::{fmt, str::FromStr};

use tokio::sync::mpsc;

use crate::{render_value, InvalidChangeFilter, Row};

/// Schema the application tables live in.
pub const DEFAULT_SCHEMA: &str = "public";

/// Kind of row change a feed delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
    /// Any of the above.
    All,
}

impl ChangeEvent {
    /// Returns the event's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::All => "*",
        }
    }

    /// Parses an event from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "*" => Some(Self::All),
            _ => None,
        }
    }

    /// Returns true if a feed for `self` delivers `event`.
    pub fn covers(&self, event: ChangeEvent) -> bool {
        *self == Self::All || *self == event
    }
}

/// Server-evaluated filter of the form `column=eq.value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeFilter {
    /// Column compared.
    pub column: String,
    /// Value the column must equal.
    pub value: String,
}

impl ChangeFilter {
    /// Creates an equality filter.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Returns true if `row` satisfies the filter.
    pub fn matches(&self, row: &Row) -> bool {
        match row.get(&self.column) {
            Some(value) if !value.is_null() => render_value(value) == self.value,
            _ => false,
        }
    }
}

impl fmt::Display for ChangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=eq.{}", self.column, self.value)
    }
}

impl FromStr for ChangeFilter {
    type Err = InvalidChangeFilter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, rest) = s
            .split_once('=')
            .ok_or_else(|| InvalidChangeFilter(s.to_string()))?;
        let value = rest
            .strip_prefix("eq.")
            .ok_or_else(|| InvalidChangeFilter(s.to_string()))?;
        if column.is_empty() {
            return Err(InvalidChangeFilter(s.to_string()));
        }
        Ok(Self::eq(column, value))
    }
}

/// A standing subscription request: which changes of which table, optionally
/// narrowed by a filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeFeed {
    /// Event kind delivered.
    pub event: ChangeEvent,
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Optional row filter.
    pub filter: Option<ChangeFilter>,
}

impl ChangeFeed {
    /// Feed of inserts into `table` in the default schema.
    pub fn inserts(table: impl Into<String>) -> Self {
        Self {
            event: ChangeEvent::Insert,
            schema: DEFAULT_SCHEMA.to_string(),
            table: table.into(),
            filter: None,
        }
    }

    /// Narrows the feed with a filter.
    pub fn with_filter(mut self, filter: ChangeFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Returns true if a change of kind `event` on `table` to `row` belongs
    /// to this feed.
    pub fn accepts(&self, event: ChangeEvent, table: &str, row: &Row) -> bool {
        self.event.covers(event)
            && self.table == table
            && self.filter.as_ref().map_or(true, |f| f.matches(row))
    }
}

/// Sending half of a change stream, held by the backend.
pub type ChangeSender = mpsc::UnboundedSender<Row>;

/// Rows pushed by the backend for one [`ChangeFeed`].
///
/// Dropping the stream releases the subscription on the backend side.
#[derive(Debug)]
pub struct ChangeStream {
    rx: mpsc::UnboundedReceiver<Row>,
}

impl ChangeStream {
    /// Creates a connected sender/stream pair.
    pub fn channel() -> (ChangeSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Receives the next pushed row, or `None` once the backend closed the
    /// feed.
    pub async fn recv(&mut self) -> Option<Row> {
        self.rx.recv().await
    }

    /// Stops accepting rows; queued rows can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
