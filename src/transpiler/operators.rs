//! Recognized query operators.

use super::{AggregateCall, Eval, Fragment, Projection, Translator};
use crate::ast::{Expr, ExprKind, ShapeKind};
use crate::error::{ExqlError, ExqlResult};
use crate::value::Value;

/// Aggregates usable both over a whole query and over a group.
const AGGREGATES: &[(&str, &str)] = &[("Sum", "SUM"), ("Min", "MIN"), ("Max", "MAX"), ("Average", "AVG")];

fn aggregate_function(method: &str) -> Option<&'static str> {
    AGGREGATES.iter().find(|(name, _)| *name == method).map(|(_, sql)| *sql)
}

/// Body of a (possibly quoted) lambda.
fn lambda_body(lambda: &Expr) -> ExqlResult<&Expr> {
    match lambda.unquote().kind() {
        ExprKind::Lambda { body, .. } => Ok(body),
        _ => Err(ExqlError::UnsupportedExpressionKind(format!(
            "expected a lambda, found {}",
            lambda.kind_name()
        ))),
    }
}

fn argument<'a>(args: &'a [Expr], index: usize, operator: &str) -> ExqlResult<&'a Expr> {
    args.get(index).ok_or_else(|| {
        ExqlError::UnsupportedExpressionKind(format!("{} is missing argument {}", operator, index))
    })
}

impl Translator {
    /// Dispatch a static operator call; `args[0]` is the source sequence.
    pub(crate) fn operator(&mut self, method: &str, args: &[Expr]) -> ExqlResult<Eval> {
        let source = argument(args, 0, method)?;

        // `g.Count()`, `g.Sum(e => ..)`: aggregates over a group parameter.
        let over_group = source.is_row_derived();
        if over_group && (method == "Count" || aggregate_function(method).is_some()) {
            return self.group_aggregate(method, args);
        }

        tracing::trace!(operator = method, "translating query operator");
        match method {
            "Where" => self.filter(source, argument(args, 1, method)?),
            "Select" => self.select(source, argument(args, 1, method)?),
            "OrderBy" => self.order(source, argument(args, 1, method)?, false, true),
            "OrderByDescending" => self.order(source, argument(args, 1, method)?, true, true),
            "ThenBy" => self.order(source, argument(args, 1, method)?, false, false),
            "ThenByDescending" => self.order(source, argument(args, 1, method)?, true, false),
            "GroupBy" => self.group_by(source, argument(args, 1, method)?),
            "Join" => self.join(args),
            "Take" => self.take(source, argument(args, 1, method)?),
            "First" | "FirstOrDefault" => self.first(source, args.get(1)),
            "Distinct" => {
                let rows = self.evaluate(source)?;
                self.clauses.distinct = true;
                Ok(rows)
            }
            "Count" | "LongCount" => self.count(source, args.get(1)),
            _ => match aggregate_function(method) {
                Some(function) => self.aggregate(function, source, args.get(1)),
                None => Err(ExqlError::UnsupportedExpressionKind(format!(
                    "query operator '{}'",
                    method
                ))),
            },
        }
    }

    fn filter(&mut self, source: &Expr, predicate: &Expr) -> ExqlResult<Eval> {
        let rows = self.evaluate(source)?;
        self.restrict(&rows, predicate)?;
        Ok(rows)
    }

    /// Add a WHERE conjunct for `predicate` over `rows`.
    fn restrict(&mut self, rows: &Eval, predicate: &Expr) -> ExqlResult<()> {
        if let Eval::Grouping(_) = rows {
            return Err(ExqlError::unsupported("filtering groups"));
        }
        let condition = self.apply(predicate, vec![rows.clone()])?;
        let text = self.sql_text(condition)?;
        self.clauses.where_parts.push(text);
        Ok(())
    }

    fn select(&mut self, source: &Expr, projection: &Expr) -> ExqlResult<Eval> {
        let rows = self.evaluate(source)?;
        let body = lambda_body(projection)?;

        if let ExprKind::New { shape, members } = body.kind() {
            let model = body
                .ty()
                .model()
                .cloned()
                .ok_or_else(|| ExqlError::unsupported("projection without a target type"))?;
            let type_name = model.type_name().to_string();
            let fields = self.with_lambda(projection, vec![rows], |t, _| t.object_fields(members, &type_name))?;

            self.clauses.projection = Some(Projection::Object {
                positional: *shape == ShapeKind::Positional,
                model,
                fields: fields.clone(),
            });
            return Ok(Eval::Fields(fields));
        }

        let value = self.apply(projection, vec![rows])?;
        match value {
            Eval::Fragment(_) | Eval::Scalar(_) => {
                self.clauses.projection = Some(Projection::Scalar {
                    value_type: body.ty().scalar(),
                    value: value.clone(),
                });
                Ok(value)
            }
            // Identity-like selections keep whatever the rows already are.
            Eval::Table(_) | Eval::Fields(_) | Eval::Join(_) => Ok(value),
            other => Err(ExqlError::unsupported(format!("selecting a {}", other.describe()))),
        }
    }

    fn order(&mut self, source: &Expr, key: &Expr, descending: bool, restart: bool) -> ExqlResult<Eval> {
        let rows = self.evaluate(source)?;
        let key = self.apply(key, vec![rows.clone()])?;
        let keys = self.key_fragments(key)?;

        if restart {
            self.clauses.order_by.clear();
        }
        for key in keys {
            let key = if descending { format!("{} DESC", key) } else { key };
            self.clauses.order_by.push(key);
        }
        Ok(rows)
    }

    fn group_by(&mut self, source: &Expr, key: &Expr) -> ExqlResult<Eval> {
        let rows = self.evaluate(source)?;
        if let Eval::Grouping(_) = rows {
            return Err(ExqlError::unsupported("grouping groups"));
        }
        if let ExprKind::New { .. } = lambda_body(key)?.kind() {
            return Err(ExqlError::unsupported("GroupBy on a projection shape"));
        }

        let key = match self.apply(key, vec![rows.clone()])? {
            Eval::Fragment(fragment) => fragment,
            Eval::Scalar(value) => Fragment::computed(self.generator.literal(&value)?),
            _ => return Err(ExqlError::unsupported("GroupBy on a projection shape")),
        };
        self.clauses.group_keys.push(key.clone());

        Ok(Eval::Grouping(super::Grouping {
            key,
            element: Box::new(rows),
        }))
    }

    fn take(&mut self, source: &Expr, count: &Expr) -> ExqlResult<Eval> {
        let rows = self.evaluate(source)?;
        let n = match self.evaluate(count)? {
            Eval::Scalar(Value::Int(n)) => n.max(0),
            _ => return Err(ExqlError::unsupported("Take with a non-constant count")),
        };
        self.limit(n);
        Ok(rows)
    }

    fn limit(&mut self, n: i64) {
        self.clauses.top = Some(self.clauses.top.map_or(n, |top| top.min(n)));
    }

    fn first(&mut self, source: &Expr, predicate: Option<&Expr>) -> ExqlResult<Eval> {
        let rows = self.evaluate(source)?;
        if let Some(predicate) = predicate {
            self.restrict(&rows, predicate)?;
        }
        self.limit(1);
        self.clauses.first = true;
        Ok(rows)
    }

    fn count(&mut self, source: &Expr, predicate: Option<&Expr>) -> ExqlResult<Eval> {
        let rows = self.evaluate(source)?;
        if let Some(predicate) = predicate {
            self.restrict(&rows, predicate)?;
        }
        self.clauses.count = true;
        Ok(rows)
    }

    /// `SUM`/`MIN`/`MAX`/`AVG` over the whole query.
    fn aggregate(&mut self, function: &'static str, source: &Expr, selector: Option<&Expr>) -> ExqlResult<Eval> {
        let rows = self.evaluate(source)?;
        let value = match selector {
            Some(selector) => self.apply(selector, vec![rows])?,
            None => match &self.clauses.projection {
                Some(Projection::Scalar { value, .. }) => value.clone(),
                _ => return Err(ExqlError::unsupported(format!("{} without a selector over rows", function))),
            },
        };
        let argument = self.sql_text(value)?;
        let sql = format!("{}({})", function, argument);
        self.clauses.aggregate = Some(AggregateCall { function, argument });
        Ok(Eval::Fragment(Fragment::computed(sql)))
    }

    /// Aggregate over the rows of one group, rendered inline.
    fn group_aggregate(&mut self, method: &str, args: &[Expr]) -> ExqlResult<Eval> {
        let element = match self.evaluate(&args[0])? {
            Eval::Grouping(group) => *group.element,
            other => {
                return Err(ExqlError::unsupported(format!("{} over a {}", method, other.describe())));
            }
        };

        let sql = match (method, args.get(1)) {
            ("Count", None) => "COUNT(*)".to_string(),
            ("Count", Some(predicate)) => {
                let condition = self.apply(predicate, vec![element])?;
                format!("SUM(CASE WHEN {} THEN 1 ELSE 0 END)", self.sql_text(condition)?)
            }
            (_, Some(selector)) => {
                let function = aggregate_function(method)
                    .ok_or_else(|| ExqlError::UnsupportedExpressionKind(format!("query operator '{}'", method)))?;
                let value = self.apply(selector, vec![element])?;
                format!("{}({})", function, self.sql_text(value)?)
            }
            (_, None) => return Err(ExqlError::unsupported(format!("{} over a group needs a selector", method))),
        };
        Ok(Eval::Fragment(Fragment::computed(sql)))
    }
}
