//! # exql
//!
//! Typed query expression trees in, SQL text and materialized rows out.
//!
//! A query is built either with the fluent [`QueryBuilder`](ast::QueryBuilder)
//! over Rust types registered through [`Model`](mapping::Model), or parsed
//! from text against a [`Schema`](schema::Schema). The translator turns the
//! tree into one SELECT statement; the engine runs it against a
//! [`RowSource`](source::RowSource) and builds the rows back into objects.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use exql::prelude::*;
//!
//! let query = QueryBuilder::from::<Customer>()
//!     .filter(|c| c.field("Age").gt(30))
//!     .order_by(|c| c.field("Name"))
//!     .take(10)
//!     .build::<Customer>();
//!
//! assert_eq!(
//!     query.sql()?,
//!     "SELECT TOP 10 [t0.Id], [t0.Name], [t0.Age] FROM Customers t0 WHERE (t0.Age > 30) ORDER BY t0.Name"
//! );
//! let customers = query.fetch_all(&mut source)?;
//! ```
//!
//! ## Operators
//!
//! | Operator                         | SQL                          |
//! |----------------------------------|------------------------------|
//! | `Where`                          | `WHERE`, chained with `AND`  |
//! | `Select`                         | select list                  |
//! | `OrderBy` / `ThenBy` (+ `Descending`) | `ORDER BY`              |
//! | `GroupBy`                        | `GROUP BY`                   |
//! | `Join`                           | `INNER JOIN .. ON`           |
//! | `Take`, `First`                  | `TOP n`                      |
//! | `Distinct`                       | `SELECT DISTINCT`            |
//! | `Count`, `Sum`, `Min`, `Max`, `Average` | aggregate query       |

pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod parser;
pub mod schema;
pub mod source;
pub mod transpiler;
pub mod value;

pub mod prelude {
    pub use crate::ast::{BinaryOp, Expr, HostValue, QueryBuilder, ShapeKind, TypeRef};
    pub use crate::config::{CompilerOptions, ExqlConfig};
    pub use crate::engine::{Query, QueryOutput};
    pub use crate::error::{ExqlError, ExqlResult};
    pub use crate::mapping::{CtorArgs, Model, ModelBuilder, ModelMeta, ModelRef, Record};
    pub use crate::schema::Schema;
    pub use crate::source::{Cursor, DatabaseSource, MemorySource, ResultSet, RowSource};
    pub use crate::transpiler::{Compiled, Dialect, ResultMode, RowShape};
    pub use crate::value::{FromValue, Value, ValueType};
}

/// Parse a textual query against `schema`.
///
/// # Example
///
/// ```
/// use exql::schema::Schema;
///
/// let schema = Schema::from_toml(r#"
///     [[model]]
///     name = "Customers"
///     fields = [{ name = "Id", type = "int" }, { name = "Age", type = "int" }]
/// "#).unwrap();
/// let query = exql::parse("Customers.Where(c => c.Age > 30)", &schema).unwrap();
/// let compiled = exql::compile(&query, &Default::default()).unwrap();
/// assert_eq!(compiled.sql(), "SELECT [t0.Id], [t0.Age] FROM Customers t0 WHERE (t0.Age > 30)");
/// ```
pub fn parse(input: &str, schema: &schema::Schema) -> error::ExqlResult<ast::Expr> {
    parser::parse(input, schema)
}

/// Translate an expression tree to SQL.
pub fn compile(expr: &ast::Expr, options: &config::CompilerOptions) -> error::ExqlResult<transpiler::Compiled> {
    transpiler::Translator::translate(expr, options)
}
