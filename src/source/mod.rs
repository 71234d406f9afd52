//! Row sources: the tabular collaborators queries are executed against.
//!
//! The compiler only needs four things from a source: open it, turn SQL text
//! into a command, execute the command into a forward-only [`Cursor`], and
//! close it again.

mod database;
mod memory;

pub use database::DatabaseSource;
pub use memory::MemorySource;

use crate::error::SourceError;
use crate::value::Value;

/// A SQL command ready to be executed.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    sql: String,
}

impl Command {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// Forward-only cursor over a result set.
pub trait Cursor {
    /// Move to the next row. Returns `false` once exhausted.
    fn advance(&mut self) -> Result<bool, SourceError>;

    /// Index of the named column.
    fn ordinal(&self, column: &str) -> Option<usize>;

    fn is_null(&self, index: usize) -> bool;

    /// Value at `index` in the current row.
    fn value(&self, index: usize) -> Value;

    fn column_count(&self) -> usize;

    fn column_name(&self, index: usize) -> Option<&str>;
}

/// A tabular data source.
pub trait RowSource {
    fn open(&mut self) -> Result<(), SourceError>;

    fn create_command(&self, sql: &str) -> Command {
        Command::new(sql)
    }

    fn execute(&mut self, command: &Command) -> Result<Box<dyn Cursor + '_>, SourceError>;

    fn close(&mut self) -> Result<(), SourceError>;
}

/// A fully buffered result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.rows.push(values.into_iter().collect());
        self
    }

    pub fn cursor(&self) -> BufferedCursor<'_> {
        BufferedCursor {
            set: self,
            position: None,
        }
    }
}

/// Cursor over a [`ResultSet`].
pub struct BufferedCursor<'a> {
    set: &'a ResultSet,
    position: Option<usize>,
}

impl BufferedCursor<'_> {
    fn current(&self) -> Option<&[Value]> {
        self.position
            .and_then(|p| self.set.rows.get(p))
            .map(Vec::as_slice)
    }
}

impl Cursor for BufferedCursor<'_> {
    fn advance(&mut self) -> Result<bool, SourceError> {
        let next = self.position.map_or(0, |p| p + 1);
        self.position = Some(next.min(self.set.rows.len()));
        Ok(next < self.set.rows.len())
    }

    fn ordinal(&self, column: &str) -> Option<usize> {
        self.set
            .columns
            .iter()
            .position(|c| c == column)
            .or_else(|| self.set.columns.iter().position(|c| c.eq_ignore_ascii_case(column)))
    }

    fn is_null(&self, index: usize) -> bool {
        self.current()
            .and_then(|row| row.get(index))
            .is_none_or(Value::is_null)
    }

    fn value(&self, index: usize) -> Value {
        self.current()
            .and_then(|row| row.get(index))
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn column_count(&self) -> usize {
        self.set.columns.len()
    }

    fn column_name(&self, index: usize) -> Option<&str> {
        self.set.columns.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_cursor_walks_forward_once() {
        let set = ResultSet::new(["Id", "Name"])
            .row([Value::Int(1), Value::from("Ann")])
            .row([Value::Int(2), Value::Null]);
        let mut cursor = set.cursor();

        assert!(cursor.advance().unwrap());
        assert_eq!(cursor.ordinal("Name"), Some(1));
        assert_eq!(cursor.ordinal("name"), Some(1));
        assert_eq!(cursor.value(1), Value::from("Ann"));

        assert!(cursor.advance().unwrap());
        assert!(cursor.is_null(1));

        assert!(!cursor.advance().unwrap());
        assert!(!cursor.advance().unwrap());
    }
}
