//! SQL dialects and their per-dialect rendering rules.

use std::str::FromStr;

use serde::Deserialize;

use crate::error::{ExqlError, ExqlResult};
use crate::value::Value;

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// T-SQL: `TOP n`, bracketed select items, `LEN`, `DATEADD`.
    #[default]
    SqlServer,
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn generator(&self) -> Box<dyn SqlGenerator> {
        match self {
            Dialect::SqlServer => Box::new(SqlServerGenerator),
            Dialect::Sqlite => Box::new(SqliteGenerator),
            Dialect::Postgres => Box::new(PostgresGenerator),
        }
    }

    /// Dialect implied by a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?;
        match scheme {
            "sqlite" => Some(Dialect::Sqlite),
            "postgres" | "postgresql" => Some(Dialect::Postgres),
            "mssql" | "sqlserver" => Some(Dialect::SqlServer),
            _ => None,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Dialect::SqlServer => "sqlserver",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        })
    }
}

impl FromStr for Dialect {
    type Err = ExqlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" | "tsql" => Ok(Dialect::SqlServer),
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(ExqlError::Config(format!("unknown dialect '{}'", other))),
        }
    }
}

/// Dialect-specific pieces of a SELECT statement.
pub trait SqlGenerator {
    fn quote_identifier(&self, name: &str) -> String;

    /// A projected column. `joined` is set once the query has joins.
    fn column_item(&self, alias: &str, column: &str, joined: bool) -> String;

    /// One column of an entity row, named so the row reads back by `column`.
    fn entity_item(&self, alias: &str, column: &str) -> String;

    fn bool_literal(&self, val: bool) -> String;

    fn string_concat(&self, parts: &[&str]) -> String;

    /// Row limit placed after `SELECT [DISTINCT]`, with a trailing space.
    fn top(&self, _n: i64) -> String {
        String::new()
    }

    /// Row limit placed at the end of the statement, with a leading space.
    fn limit(&self, _n: i64) -> String {
        String::new()
    }

    fn length(&self, expr: &str) -> String {
        format!("LENGTH({})", expr)
    }

    fn to_text(&self, expr: &str) -> String {
        format!("CAST({} AS TEXT)", expr)
    }

    /// Shift `expr` by `amount` units of `part` (`day`, `hour`, ..).
    fn date_add(&self, part: &str, amount: &str, expr: &str) -> String;

    fn literal(&self, value: &Value) -> ExqlResult<String> {
        match value {
            Value::Bool(b) => Ok(self.bool_literal(*b)),
            other => other.to_sql_literal(),
        }
    }
}

/// Double-quoted identifier, `"` doubled.
fn quote_ansi(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub struct SqlServerGenerator;

impl SqlGenerator for SqlServerGenerator {
    fn quote_identifier(&self, name: &str) -> String {
        format!("[{}]", name.replace(']', "]]"))
    }

    fn column_item(&self, alias: &str, column: &str, joined: bool) -> String {
        if joined {
            format!("[{}.{}]", alias, column)
        } else {
            format!("[{}]", column)
        }
    }

    fn entity_item(&self, alias: &str, column: &str) -> String {
        format!("[{}.{}]", alias, column)
    }

    fn bool_literal(&self, val: bool) -> String {
        if val { "1".to_string() } else { "0".to_string() }
    }

    fn string_concat(&self, parts: &[&str]) -> String {
        parts.join(" + ")
    }

    fn top(&self, n: i64) -> String {
        format!("TOP {} ", n)
    }

    fn length(&self, expr: &str) -> String {
        format!("LEN({})", expr)
    }

    fn to_text(&self, expr: &str) -> String {
        format!("CAST({} AS NVARCHAR(MAX))", expr)
    }

    fn date_add(&self, part: &str, amount: &str, expr: &str) -> String {
        format!("DATEADD({}, {}, {})", part, amount, expr)
    }
}

pub struct SqliteGenerator;

impl SqlGenerator for SqliteGenerator {
    fn quote_identifier(&self, name: &str) -> String {
        quote_ansi(name)
    }

    fn column_item(&self, alias: &str, column: &str, _joined: bool) -> String {
        format!("{}.{}", alias, column)
    }

    fn entity_item(&self, alias: &str, column: &str) -> String {
        format!("{}.{} AS {}", alias, column, quote_ansi(column))
    }

    fn bool_literal(&self, val: bool) -> String {
        if val { "1".to_string() } else { "0".to_string() }
    }

    fn string_concat(&self, parts: &[&str]) -> String {
        parts.join(" || ")
    }

    fn limit(&self, n: i64) -> String {
        format!(" LIMIT {}", n)
    }

    fn date_add(&self, part: &str, amount: &str, expr: &str) -> String {
        format!("datetime({}, ({}) || ' {}s')", expr, amount, part)
    }
}

pub struct PostgresGenerator;

impl SqlGenerator for PostgresGenerator {
    fn quote_identifier(&self, name: &str) -> String {
        quote_ansi(name)
    }

    fn column_item(&self, alias: &str, column: &str, _joined: bool) -> String {
        format!("{}.{}", alias, column)
    }

    fn entity_item(&self, alias: &str, column: &str) -> String {
        format!("{}.{} AS {}", alias, column, quote_ansi(column))
    }

    fn bool_literal(&self, val: bool) -> String {
        if val { "TRUE".to_string() } else { "FALSE".to_string() }
    }

    fn string_concat(&self, parts: &[&str]) -> String {
        parts.join(" || ")
    }

    fn limit(&self, n: i64) -> String {
        format!(" LIMIT {}", n)
    }

    fn date_add(&self, part: &str, amount: &str, expr: &str) -> String {
        format!("({} + ({}) * INTERVAL '1 {}')", expr, amount, part)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_from_url() {
        assert_eq!(Dialect::from_url("sqlite::memory:"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("sqlite://shop.db"), Some(Dialect::Sqlite));
        assert_eq!(Dialect::from_url("postgresql://localhost/shop"), Some(Dialect::Postgres));
        assert_eq!(Dialect::from_url("mssql://localhost"), Some(Dialect::SqlServer));
        assert_eq!(Dialect::from_url("mysql://localhost"), None);
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("Postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("tsql".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert!(matches!("oracle".parse::<Dialect>(), Err(ExqlError::Config(_))));
    }

    #[test]
    fn test_literals_per_dialect() {
        assert_eq!(Dialect::SqlServer.generator().literal(&Value::Bool(true)).unwrap(), "1");
        assert_eq!(Dialect::Postgres.generator().literal(&Value::Bool(false)).unwrap(), "FALSE");
        assert_eq!(Dialect::Sqlite.generator().literal(&Value::from("a'b")).unwrap(), "'a''b'");
    }
}
