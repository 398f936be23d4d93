//! Row queries against backend tables.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// A single row as exchanged with the backend.
pub type Row = Value;

/// Table holding todos.
pub const TODOS_TABLE: &str = "todos";
/// Table holding notifications.
pub const NOTIFICATIONS_TABLE: &str = "notifications";
/// Table holding user profiles.
pub const PROFILES_TABLE: &str = "profiles";

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Column equals value.
    Eq,
    /// Column is less than value.
    Lt,
}

impl Operator {
    /// Returns the operator's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Lt => "lt",
        }
    }

    /// Parses an operator from its wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "lt" => Some(Self::Lt),
            _ => None,
        }
    }
}

/// A condition on one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    /// Column name.
    pub column: String,
    /// Comparison operator.
    pub operator: Operator,
    /// Value compared against.
    pub value: Value,
}

impl Predicate {
    /// Evaluates the predicate against a row. Null or missing columns never
    /// match.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(actual) = row.get(&self.column) else {
            return false;
        };
        let ordering = compare_values(actual, &self.value);
        match self.operator {
            Operator::Eq => ordering == Some(Ordering::Equal),
            Operator::Lt => ordering == Some(Ordering::Less),
        }
    }
}

/// Sort key of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// Column name.
    pub column: String,
    /// Ascending if true.
    pub ascending: bool,
}

/// A filtered, ordered read (or the row selection of an update/delete).
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Table name.
    pub table: String,
    /// Columns to return; all columns when `None`.
    pub columns: Option<Vec<String>>,
    /// Conditions, all of which must hold.
    pub predicates: Vec<Predicate>,
    /// Sort keys, most significant first.
    pub order: Vec<OrderBy>,
}

impl Query {
    /// Starts a query over `table` selecting every column.
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: None,
            predicates: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Restricts the returned columns.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Adds an equality condition.
    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, Operator::Eq, value)
    }

    /// Adds a less-than condition.
    pub fn lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(column, Operator::Lt, value)
    }

    /// Adds a condition with an explicit operator.
    pub fn filter(
        mut self,
        column: impl Into<String>,
        operator: Operator,
        value: impl Into<Value>,
    ) -> Self {
        self.predicates.push(Predicate {
            column: column.into(),
            operator,
            value: value.into(),
        });
        self
    }

    /// Appends a sort key.
    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push(OrderBy {
            column: column.into(),
            ascending,
        });
        self
    }

    /// Returns true if every predicate holds for `row`.
    pub fn matches(&self, row: &Row) -> bool {
        self.predicates.iter().all(|p| p.matches(row))
    }

    /// Sorts rows by the query's sort keys. Nulls sort last when ascending.
    pub fn sort(&self, rows: &mut [Row]) {
        rows.sort_by(|a, b| {
            for key in &self.order {
                let left = a.get(&key.column).unwrap_or(&Value::Null);
                let right = b.get(&key.column).unwrap_or(&Value::Null);
                let ordering = match (left.is_null(), right.is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Greater,
                    (false, true) => Ordering::Less,
                    (false, false) => compare_values(left, right).unwrap_or(Ordering::Equal),
                };
                let ordering = if key.ascending {
                    ordering
                } else {
                    ordering.reverse()
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    /// Applies the column list to a row.
    pub fn project(&self, row: &Row) -> Row {
        match (&self.columns, row.as_object()) {
            (Some(columns), Some(object)) => {
                let projected: Map<String, Value> = columns
                    .iter()
                    .filter_map(|c| object.get(c).map(|v| (c.clone(), v.clone())))
                    .collect();
                Value::Object(projected)
            }
            _ => row.clone(),
        }
    }
}

/// Compares two JSON scalars of the same kind. Strings compare
/// lexicographically, which orders ISO dates and timestamps correctly.
pub fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Renders a scalar the way it appears in filter expressions.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
