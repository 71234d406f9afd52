//! Expression-tree to SQL translator.
//!
//! The tree is walked once. Recognized query operators accumulate clause
//! fragments and join descriptors in [`Clauses`]; the generator then assembles
//! a single SELECT statement in fixed clause order and records the row shape
//! the engine materializes results into.

mod dialect;
mod join;
mod methods;
mod operators;
mod sql;

#[cfg(test)]
mod tests;

use crate::ast::{BinaryOp, Constant, Expr, ExprKind, HostValue};
use crate::config::CompilerOptions;
use crate::error::{ExqlError, ExqlResult};
use crate::mapping::ModelRef;
use crate::value::{Value, ValueType};

use join::JoinDescriptor;

pub use dialect::{Dialect, SqlGenerator};

/// A column of a bound table, the "source" marker of a fragment.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ColumnRef {
    alias: String,
    column: String,
}

/// Symbolic SQL text.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Fragment {
    sql: String,
    column: Option<ColumnRef>,
}

impl Fragment {
    fn column(alias: &str, column: &str) -> Self {
        Self {
            sql: format!("{}.{}", alias, column),
            column: Some(ColumnRef {
                alias: alias.to_string(),
                column: column.to_string(),
            }),
        }
    }

    fn computed(sql: String) -> Self {
        Self { sql, column: None }
    }
}

/// A table bound to an alias.
#[derive(Debug, Clone)]
pub(crate) struct TableRef {
    model: ModelRef,
    alias: String,
}

/// Ordered member name to value list, for projections and join results.
#[derive(Debug, Clone, Default)]
pub(crate) struct FieldMap {
    type_name: String,
    entries: Vec<(String, Eval)>,
}

impl FieldMap {
    fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            entries: Vec::new(),
        }
    }

    /// Every mapped column of a bound table.
    fn of_table(table: &TableRef) -> Self {
        let mut map = Self::new(table.model.type_name());
        for field in table.model.fields() {
            map.push(field.name(), Eval::Fragment(Fragment::column(&table.alias, field.column())));
        }
        map
    }

    fn push(&mut self, name: impl Into<String>, value: Eval) {
        self.entries.push((name.into(), value));
    }

    fn get(&self, name: &str) -> ExqlResult<&Eval> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| ExqlError::member(name, &self.type_name))
    }

    fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _)| n.clone()).collect()
    }
}

/// Rows produced by `GroupBy`.
#[derive(Debug, Clone)]
pub(crate) struct Grouping {
    key: Fragment,
    element: Box<Eval>,
}

/// Result of evaluating one node.
#[derive(Debug, Clone)]
pub(crate) enum Eval {
    /// A host-side scalar, rendered as a literal.
    Scalar(Value),
    /// A captured host object, only usable for member lookup.
    Host(HostValue),
    Fragment(Fragment),
    Table(TableRef),
    Fields(FieldMap),
    /// Result rows of the join at this index.
    Join(usize),
    Grouping(Grouping),
}

impl Eval {
    fn describe(&self) -> &'static str {
        match self {
            Eval::Scalar(_) => "scalar",
            Eval::Host(_) => "host object",
            Eval::Fragment(_) => "column expression",
            Eval::Table(_) => "table row",
            Eval::Fields(_) => "projected row",
            Eval::Join(_) => "join row",
            Eval::Grouping(_) => "group",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Projection {
    Object {
        positional: bool,
        model: ModelRef,
        fields: FieldMap,
    },
    Scalar {
        value_type: Option<ValueType>,
        value: Eval,
    },
}

/// Clause state accumulated while walking one tree.
#[derive(Debug, Default)]
pub(crate) struct Clauses {
    projection: Option<Projection>,
    where_parts: Vec<String>,
    order_by: Vec<String>,
    group_keys: Vec<Fragment>,
    top: Option<i64>,
    distinct: bool,
    first: bool,
    count: bool,
    aggregate: Option<AggregateCall>,
    alias_counter: usize,
    root: Option<TableRef>,
    joins: Vec<JoinDescriptor>,
}

/// A top-level `SUM`/`MIN`/`MAX`/`AVG` and the expression it folds.
#[derive(Debug, Clone)]
pub(crate) struct AggregateCall {
    function: &'static str,
    argument: String,
}

/// How each result row is turned into an object.
#[derive(Debug, Clone)]
pub enum RowShape {
    /// The declared row type, every mapped field populated.
    Entity(ModelRef),
    /// Default-constructed, then the listed members assigned.
    Named { model: ModelRef, members: Vec<String> },
    /// Built through the positional constructor.
    Positional { model: ModelRef },
    /// One column read directly.
    Scalar(Option<ValueType>),
}

/// What executing the statement returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultMode {
    Rows,
    First,
    Count,
    Aggregate,
}

/// A translated query.
#[derive(Debug, Clone)]
pub struct Compiled {
    sql: String,
    shape: RowShape,
    mode: ResultMode,
    top: Option<i64>,
    distinct: bool,
}

impl Compiled {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn shape(&self) -> &RowShape {
        &self.shape
    }

    pub fn mode(&self) -> ResultMode {
        self.mode
    }

    pub fn top_limit(&self) -> Option<i64> {
        self.top
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }
}

/// Single-use tree evaluator.
pub struct Translator {
    options: CompilerOptions,
    generator: Box<dyn SqlGenerator>,
    clauses: Clauses,
    scope: Vec<(String, Eval)>,
}

impl Translator {
    pub fn new(options: CompilerOptions) -> Self {
        Self {
            generator: options.dialect.generator(),
            options,
            clauses: Clauses::default(),
            scope: Vec::new(),
        }
    }

    /// Evaluate `expr` and generate its statement.
    pub fn translate(expr: &Expr, options: &CompilerOptions) -> ExqlResult<Compiled> {
        let mut translator = Translator::new(options.clone());
        translator.evaluate(expr)?;
        translator.generate()
    }

    pub(crate) fn evaluate(&mut self, expr: &Expr) -> ExqlResult<Eval> {
        match expr.kind() {
            ExprKind::Constant(Constant::Value(v)) => Ok(Eval::Scalar(v.clone())),
            ExprKind::Constant(Constant::Host(HostValue::Scalar(v))) => Ok(Eval::Scalar(v.clone())),
            ExprKind::Constant(Constant::Host(host)) => Ok(Eval::Host(host.clone())),
            ExprKind::Constant(Constant::Table(model)) => Ok(Eval::Table(self.bind_table(model))),
            ExprKind::Parameter(name) => self.lookup(name),
            ExprKind::FieldAccess { target, field } => {
                let target = self.evaluate(target)?;
                self.member(target, field)
            }
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right),
            ExprKind::Call {
                target: Some(target),
                method,
                args,
            } => self.method_call(target, method, args),
            ExprKind::Call {
                target: None,
                method,
                args,
            } => self.operator(method, args),
            ExprKind::Lambda { body, .. } => self.evaluate(body),
            ExprKind::Quote(inner) => self.evaluate(inner),
            ExprKind::New { members, .. } => {
                let type_name = expr
                    .ty()
                    .model()
                    .map(|m| m.type_name().to_string())
                    .unwrap_or_else(|| "<anonymous>".to_string());
                self.object_fields(members, &type_name).map(Eval::Fields)
            }
        }
    }

    /// Bind the lambda's parameters to `rows` and run `f` on its body.
    pub(crate) fn with_lambda<R>(
        &mut self,
        lambda: &Expr,
        rows: Vec<Eval>,
        f: impl FnOnce(&mut Self, &Expr) -> ExqlResult<R>,
    ) -> ExqlResult<R> {
        let lambda = lambda.unquote();
        let ExprKind::Lambda { params, body } = lambda.kind() else {
            return Err(ExqlError::UnsupportedExpressionKind(format!(
                "expected a lambda, found {}",
                lambda.kind_name()
            )));
        };
        if params.len() != rows.len() {
            return Err(ExqlError::UnsupportedExpressionKind(format!(
                "lambda with {} parameters where {} expected",
                params.len(),
                rows.len()
            )));
        }

        let depth = self.scope.len();
        self.scope.extend(params.iter().cloned().zip(rows));
        let result = f(self, body);
        self.scope.truncate(depth);
        result
    }

    /// Evaluate a lambda body with its parameters bound to `rows`.
    pub(crate) fn apply(&mut self, lambda: &Expr, rows: Vec<Eval>) -> ExqlResult<Eval> {
        self.with_lambda(lambda, rows, |t, body| t.evaluate(body))
    }

    fn lookup(&self, name: &str) -> ExqlResult<Eval> {
        self.scope
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| ExqlError::UnboundParameter(name.to_string()))
    }

    fn bind_table(&mut self, model: &ModelRef) -> TableRef {
        let table = TableRef {
            model: model.clone(),
            alias: format!("{}{}", self.options.alias_prefix, self.clauses.alias_counter),
        };
        if self.clauses.root.is_none() {
            self.clauses.root = Some(table.clone());
        }
        table
    }

    fn member(&mut self, target: Eval, field: &str) -> ExqlResult<Eval> {
        match target {
            Eval::Table(table) => {
                let column = table.model.column_of(field)?;
                Ok(Eval::Fragment(Fragment::column(&table.alias, column)))
            }
            Eval::Fields(map) => map.get(field).cloned(),
            Eval::Join(index) => self.clauses.joins[index].result_fields.get(field).cloned(),
            Eval::Grouping(group) if field == "Key" => Ok(Eval::Fragment(group.key)),
            Eval::Grouping(_) => Err(ExqlError::member(field, "grouping")),
            Eval::Host(host) => Ok(match host.member(field)? {
                HostValue::Scalar(v) => Eval::Scalar(v.clone()),
                nested => Eval::Host(nested.clone()),
            }),
            Eval::Scalar(Value::Text(s)) if field == "Length" => Ok(Eval::Scalar(Value::Int(s.chars().count() as i64))),
            Eval::Scalar(v) => Err(ExqlError::member(
                field,
                v.value_type().map(|t| t.to_string()).unwrap_or_else(|| "Null".to_string()),
            )),
            Eval::Fragment(f) if field == "Length" => Ok(Eval::Fragment(Fragment::computed(self.generator.length(&f.sql)))),
            Eval::Fragment(_) => Err(ExqlError::unsupported(format!("member '{}' of a column expression", field))),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> ExqlResult<Eval> {
        let concat = op == BinaryOp::Add
            && [left, right]
                .iter()
                .any(|side| side.ty().scalar() == Some(ValueType::Text));
        let left = self.evaluate(left)?;
        let right = self.evaluate(right)?;

        if matches!(op, BinaryOp::Eq | BinaryOp::Ne) {
            let test = if op == BinaryOp::Eq { "IS NULL" } else { "IS NOT NULL" };
            match (&left, &right) {
                (_, Eval::Scalar(Value::Null)) => {
                    return Ok(Eval::Fragment(Fragment::computed(format!("({} {})", self.sql_text(left)?, test))));
                }
                (Eval::Scalar(Value::Null), _) => {
                    return Ok(Eval::Fragment(Fragment::computed(format!("({} {})", self.sql_text(right)?, test))));
                }
                _ => {}
            }
        }

        let (left, right) = (self.sql_text(left)?, self.sql_text(right)?);
        let sql = if concat {
            format!("({})", self.generator.string_concat(&[left.as_str(), right.as_str()]))
        } else {
            format!("({} {} {})", left, op, right)
        };
        Ok(Eval::Fragment(Fragment::computed(sql)))
    }

    /// Demand SQL text from an evaluated node.
    pub(crate) fn sql_text(&self, value: Eval) -> ExqlResult<String> {
        match value {
            Eval::Fragment(f) => Ok(f.sql),
            Eval::Scalar(v) => self.generator.literal(&v),
            Eval::Host(host) => Err(ExqlError::InvalidValue(format!(
                "host object '{}' cannot be used as a SQL value",
                host.type_name()
            ))),
            other => Err(ExqlError::unsupported(format!("{} used as a scalar value", other.describe()))),
        }
    }

    /// Key columns: one fragment, or every member of an object key.
    pub(crate) fn key_fragments(&self, key: Eval) -> ExqlResult<Vec<String>> {
        match key {
            Eval::Fields(map) => map.entries.into_iter().map(|(_, v)| self.sql_text(v)).collect(),
            Eval::Table(table) => self.key_fragments(Eval::Fields(FieldMap::of_table(&table))),
            Eval::Join(index) => {
                let fields = self.clauses.joins[index].result_fields.clone();
                self.key_fragments(Eval::Fields(fields))
            }
            other => Ok(vec![self.sql_text(other)?]),
        }
    }

    fn object_fields(&mut self, members: &[(String, Expr)], type_name: &str) -> ExqlResult<FieldMap> {
        let mut map = FieldMap::new(type_name);
        for (name, value) in members {
            let value = self.evaluate(value)?;
            map.push(name.clone(), value);
        }
        Ok(map)
    }
}
