//! In-memory row source.

use std::cell::Cell;

use super::{Command, Cursor, ResultSet, RowSource};
use crate::error::SourceError;

/// Serves one canned result set for every command it executes.
///
/// Executed SQL text and open/close calls are recorded so callers can check
/// what was sent and that every connection was released.
#[derive(Debug, Default)]
pub struct MemorySource {
    result: ResultSet,
    executed: Vec<String>,
    opened: usize,
    closed: usize,
    is_open: bool,
    failure: Option<String>,
    commands_while_closed: Cell<usize>,
}

impl MemorySource {
    pub fn new(result: ResultSet) -> Self {
        Self {
            result,
            ..Default::default()
        }
    }

    /// A source whose `execute` always fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    pub fn open_count(&self) -> usize {
        self.opened
    }

    pub fn close_count(&self) -> usize {
        self.closed
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Commands created before `open` was called.
    pub fn commands_while_closed(&self) -> usize {
        self.commands_while_closed.get()
    }
}

impl RowSource for MemorySource {
    fn open(&mut self) -> Result<(), SourceError> {
        self.opened += 1;
        self.is_open = true;
        Ok(())
    }

    fn create_command(&self, sql: &str) -> Command {
        if !self.is_open {
            self.commands_while_closed.set(self.commands_while_closed.get() + 1);
        }
        Command::new(sql)
    }

    fn execute(&mut self, command: &Command) -> Result<Box<dyn Cursor + '_>, SourceError> {
        if !self.is_open {
            return Err("source is not open".into());
        }
        self.executed.push(command.sql().to_string());
        if let Some(message) = &self.failure {
            return Err(message.clone().into());
        }
        Ok(Box::new(self.result.cursor()))
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.closed += 1;
        self.is_open = false;
        Ok(())
    }
}
