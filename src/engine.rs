//! Query execution and row materialization.
//!
//! A [`Query`] owns one expression tree. The first call that needs SQL
//! translates the tree and caches the result; execution then opens the row
//! source, runs the statement, reads the cursor forward to exhaustion and
//! closes the source again, materializing each row into the compiled shape.

use std::any::{Any, TypeId};
use std::cell::OnceCell;
use std::marker::PhantomData;

use chrono::NaiveDateTime;

use crate::ast::Expr;
use crate::config::CompilerOptions;
use crate::error::{ExqlError, ExqlResult};
use crate::mapping::{AnyObject, Factory, ModelRef, read_index, read_value};
use crate::source::{Command, Cursor, ResultSet, RowSource};
use crate::transpiler::{Compiled, ResultMode, RowShape, Translator};
use crate::value::{FromValue, Value, ValueType};

/// What executing a query produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput<T> {
    Rows(Vec<T>),
    First(Option<T>),
    Count(i64),
    Scalar(Value),
}

/// A compiled-on-demand query yielding rows of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// let query = QueryBuilder::from::<Person>()
///     .filter(|p| p.field("Name").eq("Ann"))
///     .build::<Person>();
///
/// assert_eq!(query.sql()?, "SELECT [t0.Id], [t0.Name] FROM People t0 WHERE (t0.Name = 'Ann')");
/// let people = query.fetch_all(&mut source)?;
/// ```
pub struct Query<T> {
    expr: Expr,
    options: CompilerOptions,
    compiled: OnceCell<Compiled>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("expr", &self.expr)
            .field("options", &self.options)
            .field("compiled", &self.compiled.get())
            .finish()
    }
}

impl<T: 'static> Query<T> {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr,
            options: CompilerOptions::default(),
            compiled: OnceCell::new(),
            _marker: PhantomData,
        }
    }

    /// Replace the compiler options. Discards any cached translation.
    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self.compiled = OnceCell::new();
        self
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Translate the tree, once. Later calls return the cached result.
    pub fn compile(&self) -> ExqlResult<&Compiled> {
        if let Some(compiled) = self.compiled.get() {
            return Ok(compiled);
        }
        let compiled = Translator::translate(&self.expr, &self.options)?;
        Ok(self.compiled.get_or_init(|| compiled))
    }

    /// Get the generated SQL without executing.
    pub fn sql(&self) -> ExqlResult<&str> {
        self.compile().map(Compiled::sql)
    }

    /// Run against `source`: open, execute, read every row, close.
    ///
    /// The source is closed even when reading fails; a read failure wins
    /// over a close failure.
    pub fn execute<S: RowSource + ?Sized>(&self, source: &mut S) -> ExqlResult<QueryOutput<T>> {
        let compiled = self.compile()?;
        source.open().map_err(ExqlError::Source)?;
        let command = source.create_command(compiled.sql());
        let outcome = read_output::<T, S>(source, &command, compiled);
        let closed = source.close().map_err(ExqlError::Source);

        let output = outcome?;
        closed?;
        Ok(output)
    }

    /// Every row, in cursor order.
    pub fn fetch_all<S: RowSource + ?Sized>(&self, source: &mut S) -> ExqlResult<Vec<T>> {
        match self.execute(source)? {
            QueryOutput::Rows(rows) => Ok(rows),
            QueryOutput::First(row) => Ok(row.into_iter().collect()),
            other => Err(ExqlError::shape(format!("expected rows, query produced {}", describe(&other)))),
        }
    }

    /// The first row, `None` when the result is empty.
    pub fn fetch_first<S: RowSource + ?Sized>(&self, source: &mut S) -> ExqlResult<Option<T>> {
        match self.execute(source)? {
            QueryOutput::First(row) => Ok(row),
            QueryOutput::Rows(rows) => Ok(rows.into_iter().next()),
            other => Err(ExqlError::shape(format!("expected a row, query produced {}", describe(&other)))),
        }
    }

    /// Result of a `Count` query.
    pub fn count<S: RowSource + ?Sized>(&self, source: &mut S) -> ExqlResult<i64> {
        match self.execute(source)? {
            QueryOutput::Count(n) => Ok(n),
            other => Err(ExqlError::shape(format!("expected a count, query produced {}", describe(&other)))),
        }
    }

    /// Result of a top-level aggregate query.
    pub fn scalar<S: RowSource + ?Sized>(&self, source: &mut S) -> ExqlResult<Value> {
        match self.execute(source)? {
            QueryOutput::Scalar(value) => Ok(value),
            QueryOutput::Count(n) => Ok(Value::Int(n)),
            other => Err(ExqlError::shape(format!("expected a scalar, query produced {}", describe(&other)))),
        }
    }
}

fn describe<T>(output: &QueryOutput<T>) -> &'static str {
    match output {
        QueryOutput::Rows(_) => "rows",
        QueryOutput::First(_) => "a single row",
        QueryOutput::Count(_) => "a count",
        QueryOutput::Scalar(_) => "a scalar",
    }
}

fn read_output<T: 'static, S: RowSource + ?Sized>(
    source: &mut S,
    command: &Command,
    compiled: &Compiled,
) -> ExqlResult<QueryOutput<T>> {
    tracing::debug!(sql = %command.sql(), "executing query");
    let mut cursor = source.execute(command).map_err(ExqlError::Source)?;
    let cursor = cursor.as_mut();

    let output = match compiled.mode() {
        ResultMode::Count => {
            let n = match next_value(cursor)? {
                Value::Null => 0,
                value => match value.coerce(ValueType::Int)? {
                    Value::Int(n) => n,
                    _ => 0,
                },
            };
            QueryOutput::Count(n)
        }
        ResultMode::Aggregate => QueryOutput::Scalar(next_value(cursor)?),
        ResultMode::First => {
            let first = if advance(cursor)? {
                Some(materialize::<T>(cursor, compiled.shape())?)
            } else {
                None
            };
            drain(cursor)?;
            QueryOutput::First(first)
        }
        ResultMode::Rows => {
            let mut rows = Vec::new();
            while advance(cursor)? {
                rows.push(materialize::<T>(cursor, compiled.shape())?);
            }
            tracing::debug!(rows = rows.len(), "materialized rows");
            QueryOutput::Rows(rows)
        }
    };
    Ok(output)
}

fn advance(cursor: &mut dyn Cursor) -> ExqlResult<bool> {
    cursor.advance().map_err(ExqlError::Source)
}

fn drain(cursor: &mut dyn Cursor) -> ExqlResult<()> {
    while advance(cursor)? {}
    Ok(())
}

/// Column 0 of the only row, `Null` when there is none.
fn next_value(cursor: &mut dyn Cursor) -> ExqlResult<Value> {
    let value = if advance(cursor)? {
        read_index(cursor, 0, None)?
    } else {
        Value::Null
    };
    drain(cursor)?;
    Ok(value)
}

/// Build one `T` from the current cursor row.
pub fn materialize<T: 'static>(cursor: &dyn Cursor, shape: &RowShape) -> ExqlResult<T> {
    let object = match shape {
        RowShape::Entity(model) => {
            let columns = model.fields().iter().map(|f| (f.name(), f.column())).collect::<Vec<_>>();
            build(cursor, model, &columns)?
        }
        RowShape::Named { model, members } => {
            let columns = members.iter().map(|m| (m.as_str(), m.as_str())).collect::<Vec<_>>();
            build(cursor, model, &columns)?
        }
        RowShape::Positional { model } => {
            let columns = model.fields().iter().map(|f| (f.name(), f.name())).collect::<Vec<_>>();
            build(cursor, model, &columns)?
        }
        RowShape::Scalar(value_type) => return scalar::<T>(read_index(cursor, 0, *value_type)?),
    };
    downcast(object)
}

/// Construct through the model's factory, reading `(field, column)` pairs.
fn build(cursor: &dyn Cursor, model: &ModelRef, columns: &[(&str, &str)]) -> ExqlResult<AnyObject> {
    let column_for = |field: &str| {
        columns
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, column)| *column)
    };

    match model.factory() {
        Factory::Default(create) => {
            let mut object = create();
            for (field, column) in columns {
                let value_type = model.field(field).and_then(|f| f.value_type());
                let value = read_value(cursor, column, value_type)?;
                model.set(&mut *object, field, value)?;
            }
            Ok(object)
        }
        Factory::Positional { params, build } => {
            let mut values = Vec::with_capacity(params.len());
            for param in params {
                let column = column_for(param).ok_or_else(|| {
                    ExqlError::shape(format!("no column supplies '{}' of {}", param, model.type_name()))
                })?;
                let value_type = model.field(param).and_then(|f| f.value_type());
                values.push(read_value(cursor, column, value_type)?);
            }
            build(values)
        }
        Factory::None => Err(ExqlError::shape(format!(
            "{} has no constructor registered",
            model.type_name()
        ))),
    }
}

fn downcast<T: 'static>(object: AnyObject) -> ExqlResult<T> {
    let object: Box<dyn Any> = object;
    object.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
        ExqlError::shape(format!(
            "row does not materialize as {}",
            std::any::type_name::<T>()
        ))
    })
}

/// Try each listed type (and its `Option`) as `$target`, converting through [`FromValue`].
macro_rules! convert_scalar {
    ($value:ident as $target:ty: $($ty:ty),+) => {
        $(
            if TypeId::of::<$target>() == TypeId::of::<$ty>() {
                return downcast(Box::new(<$ty>::from_value($value)?));
            }
            if TypeId::of::<$target>() == TypeId::of::<Option<$ty>>() {
                return downcast(Box::new(<Option<$ty>>::from_value($value)?));
            }
        )+
    };
}

/// A single-column row as `T`: [`Value`] itself, or any [`FromValue`] type
/// (optionally wrapped in `Option`).
fn scalar<T: 'static>(value: Value) -> ExqlResult<T> {
    if TypeId::of::<T>() == TypeId::of::<Value>() {
        return downcast(Box::new(value));
    }
    // Integers widen into float reads.
    let value = match value {
        Value::Int(n) if TypeId::of::<T>() == TypeId::of::<f64>() || TypeId::of::<T>() == TypeId::of::<Option<f64>>() => {
            Value::Float(n as f64)
        }
        other => other,
    };
    convert_scalar!(value as T: String, i64, i32, f64, bool, NaiveDateTime);
    Err(ExqlError::shape(format!(
        "{} is not a scalar row type",
        std::any::type_name::<T>()
    )))
}

/// Run raw SQL and buffer the whole result, for callers without a row type.
pub fn fetch_raw<S: RowSource + ?Sized>(source: &mut S, sql: &str) -> ExqlResult<ResultSet> {
    source.open().map_err(ExqlError::Source)?;
    let command = source.create_command(sql);

    let outcome = (|| -> ExqlResult<ResultSet> {
        let mut cursor = source.execute(&command).map_err(ExqlError::Source)?;
        let cursor = cursor.as_mut();
        let columns = (0..cursor.column_count())
            .map(|i| cursor.column_name(i).unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        let width = columns.len();
        let mut set = ResultSet::new(columns);
        while advance(cursor)? {
            set.rows.push((0..width).map(|i| cursor.value(i)).collect());
        }
        Ok(set)
    })();

    let closed = source.close().map_err(ExqlError::Source);
    let set = outcome?;
    closed?;
    tracing::debug!(rows = set.rows.len(), "fetched raw rows");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::QueryBuilder;
    use crate::mapping::{Model, ModelBuilder};
    use crate::source::MemorySource;

    #[derive(Debug, Default, PartialEq)]
    struct Person {
        id: i64,
        name: String,
    }

    impl Model for Person {
        fn describe(model: &mut ModelBuilder<Self>) {
            model
                .table("People")
                .field("Id", |p: &Person| p.id, |p, v| p.id = v)
                .field("Name", |p: &Person| p.name.clone(), |p, v| p.name = v)
                .default_constructor();
        }
    }

    #[test]
    fn test_compile_is_cached() {
        let query = QueryBuilder::from::<Person>().build::<Person>();
        let first = query.compile().unwrap() as *const Compiled;
        let second = query.compile().unwrap() as *const Compiled;
        assert_eq!(first, second);
    }

    #[test]
    fn test_with_options_recompiles() {
        let query = QueryBuilder::from::<Person>().build::<Person>();
        assert_eq!(query.sql().unwrap(), "SELECT [t0.Id], [t0.Name] FROM People t0");

        let query = query.with_options(CompilerOptions {
            alias_prefix: "p".into(),
            ..CompilerOptions::default()
        });
        assert_eq!(query.sql().unwrap(), "SELECT [p0.Id], [p0.Name] FROM People p0");
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(scalar::<i64>(Value::Int(3)).unwrap(), 3);
        assert_eq!(scalar::<i32>(Value::Int(3)).unwrap(), 3);
        assert_eq!(scalar::<f64>(Value::Int(3)).unwrap(), 3.0);
        assert_eq!(scalar::<Value>(Value::Null).unwrap(), Value::Null);
        assert_eq!(scalar::<String>(Value::Int(3)).unwrap(), "3");
        assert_eq!(scalar::<Option<String>>(Value::Null).unwrap(), None);
        assert_eq!(scalar::<Option<String>>(Value::from("Ann")).unwrap(), Some("Ann".to_string()));
        assert_eq!(scalar::<Option<f64>>(Value::Int(2)).unwrap(), Some(2.0));
        assert!(matches!(scalar::<i64>(Value::Null), Err(ExqlError::TypeMismatch { .. })));
        assert!(matches!(
            scalar::<Vec<u8>>(Value::Int(3)),
            Err(ExqlError::MaterializationShapeMismatch(_))
        ));
    }

    #[test]
    fn test_fetch_raw() {
        let set = ResultSet::new(["n"]).row([Value::Int(1)]).row([Value::Int(2)]);
        let mut source = MemorySource::new(set.clone());
        assert_eq!(fetch_raw(&mut source, "SELECT n FROM t").unwrap(), set);
        assert_eq!(source.close_count(), 1);
        assert_eq!(source.commands_while_closed(), 0);
    }
}
