//! Fluent construction of query-operator chains.

use crate::ast::{Expr, TypeRef};
use crate::engine::Query;
use crate::mapping::{self, Model, ModelRef};
use crate::value::ValueType;

/// Builds a query tree one operator at a time.
///
/// # Example
///
/// ```rust,ignore
/// let query = QueryBuilder::from::<Person>()
///     .filter(|p| p.field("Name").eq("Ann"))
///     .order_by(|p| p.field("Id"))
///     .build::<Person>();
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    expr: Expr,
}

impl QueryBuilder {
    pub fn from<T: Model>() -> Self {
        Self::from_model(mapping::model::<T>())
    }

    pub fn from_model(model: ModelRef) -> Self {
        Self {
            expr: Expr::table(model),
        }
    }

    pub fn from_expr(expr: Expr) -> Self {
        Self { expr }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// Type of the rows flowing out of the current chain.
    pub fn element_type(&self) -> TypeRef {
        self.expr.ty().element()
    }

    /// Wrap the current chain in `operator(source, args..)`.
    pub fn apply(self, operator: &str, args: Vec<Expr>, ty: TypeRef) -> Self {
        let mut call_args = Vec::with_capacity(args.len() + 1);
        call_args.push(self.expr);
        call_args.extend(args);
        Self {
            expr: Expr::call(operator, call_args, ty),
        }
    }

    fn row_lambda(&self, f: impl FnOnce(Expr) -> Expr) -> Expr {
        let param = Expr::param("x", self.element_type());
        Expr::lambda(&["x"], f(param)).quote()
    }

    fn keep_type(self, operator: &str, args: Vec<Expr>) -> Self {
        let ty = self.expr.ty().clone();
        self.apply(operator, args, ty)
    }

    fn scalar(self, operator: &str, args: Vec<Expr>, vt: ValueType) -> Self {
        self.apply(operator, args, TypeRef::Scalar(vt))
    }

    pub fn filter(self, predicate: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.row_lambda(predicate);
        self.keep_type("Where", vec![lambda])
    }

    pub fn select(self, projection: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.row_lambda(projection);
        let ty = TypeRef::sequence(lambda.ty().clone());
        self.apply("Select", vec![lambda], ty)
    }

    pub fn order_by(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.row_lambda(key);
        self.keep_type("OrderBy", vec![lambda])
    }

    pub fn order_by_desc(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.row_lambda(key);
        self.keep_type("OrderByDescending", vec![lambda])
    }

    pub fn then_by(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.row_lambda(key);
        self.keep_type("ThenBy", vec![lambda])
    }

    pub fn then_by_desc(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.row_lambda(key);
        self.keep_type("ThenByDescending", vec![lambda])
    }

    pub fn group_by(self, key: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.row_lambda(key);
        let ty = TypeRef::sequence(TypeRef::Grouping {
            key: Box::new(lambda.ty().clone()),
            element: Box::new(self.element_type()),
        });
        self.apply("GroupBy", vec![lambda], ty)
    }

    /// Inner join against `inner` on equal keys.
    pub fn join(
        self,
        inner: QueryBuilder,
        outer_key: impl FnOnce(Expr) -> Expr,
        inner_key: impl FnOnce(Expr) -> Expr,
        result: impl FnOnce(Expr, Expr) -> Expr,
    ) -> Self {
        let outer_type = self.element_type();
        let inner_type = inner.element_type();

        let outer_lambda = self.row_lambda(outer_key);
        let inner_lambda = Expr::lambda(&["y"], inner_key(Expr::param("y", inner_type.clone()))).quote();
        let result_body = result(Expr::param("o", outer_type), Expr::param("i", inner_type));
        let result_lambda = Expr::lambda(&["o", "i"], result_body).quote();

        let ty = TypeRef::sequence(result_lambda.ty().clone());
        self.apply(
            "Join",
            vec![inner.expr, outer_lambda, inner_lambda, result_lambda],
            ty,
        )
    }

    pub fn take(self, n: i64) -> Self {
        self.keep_type("Take", vec![Expr::value(n)])
    }

    pub fn distinct(self) -> Self {
        self.keep_type("Distinct", vec![])
    }

    pub fn first(self) -> Self {
        let ty = self.element_type();
        self.apply("First", vec![], ty)
    }

    pub fn first_or_default(self) -> Self {
        let ty = self.element_type();
        self.apply("FirstOrDefault", vec![], ty)
    }

    pub fn first_where(self, predicate: impl FnOnce(Expr) -> Expr) -> Self {
        let ty = self.element_type();
        let lambda = self.row_lambda(predicate);
        self.apply("First", vec![lambda], ty)
    }

    pub fn count(self) -> Self {
        self.scalar("Count", vec![], ValueType::Int)
    }

    pub fn count_where(self, predicate: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.row_lambda(predicate);
        self.scalar("Count", vec![lambda], ValueType::Int)
    }

    fn aggregate(self, operator: &str, selector: impl FnOnce(Expr) -> Expr) -> Self {
        let lambda = self.row_lambda(selector);
        let ty = match operator {
            "Average" => TypeRef::Scalar(ValueType::Float),
            _ => lambda.ty().clone(),
        };
        self.apply(operator, vec![lambda], ty)
    }

    pub fn sum(self, selector: impl FnOnce(Expr) -> Expr) -> Self {
        self.aggregate("Sum", selector)
    }

    pub fn min(self, selector: impl FnOnce(Expr) -> Expr) -> Self {
        self.aggregate("Min", selector)
    }

    pub fn max(self, selector: impl FnOnce(Expr) -> Expr) -> Self {
        self.aggregate("Max", selector)
    }

    pub fn average(self, selector: impl FnOnce(Expr) -> Expr) -> Self {
        self.aggregate("Average", selector)
    }

    /// Finish the chain as a lazily compiled query yielding `T`.
    pub fn build<T: 'static>(self) -> Query<T> {
        Query::new(self.expr)
    }
}
