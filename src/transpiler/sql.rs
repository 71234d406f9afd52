//! Statement assembly from accumulated clauses.

use super::{Compiled, Eval, FieldMap, Fragment, Projection, ResultMode, RowShape, TableRef, Translator};
use crate::error::{ExqlError, ExqlResult};
use crate::mapping::ModelRef;

impl Translator {
    /// Assemble the final statement and the shape its rows materialize into.
    pub(crate) fn generate(&self) -> ExqlResult<Compiled> {
        let root = self
            .clauses
            .root
            .as_ref()
            .ok_or_else(|| ExqlError::UnsupportedExpressionKind("query without a table source".to_string()))?;
        let (list, shape) = self.select_list(root)?;

        let clauses = &self.clauses;
        let mode = if clauses.count {
            ResultMode::Count
        } else if clauses.aggregate.is_some() {
            ResultMode::Aggregate
        } else if clauses.first {
            ResultMode::First
        } else {
            ResultMode::Rows
        };

        // Row-limiting clauses must apply before counting or folding.
        let wrapped = clauses.distinct || clauses.top.is_some() || !clauses.group_keys.is_empty();
        let sql = match (mode, &clauses.aggregate) {
            (ResultMode::Count, _) if wrapped => {
                format!("SELECT COUNT(*) FROM ({}) AS q", self.statement(&list, root, true, false))
            }
            (ResultMode::Count, _) => self.statement("COUNT(*)", root, false, false),
            (ResultMode::Aggregate, Some(call)) if wrapped => {
                let inner = match &clauses.projection {
                    Some(Projection::Object { .. }) if clauses.distinct => {
                        format!("{}, {} AS {}", list, call.argument, self.generator.quote_identifier("value"))
                    }
                    _ => format!("{} AS {}", call.argument, self.generator.quote_identifier("value")),
                };
                format!(
                    "SELECT {}(q.value) FROM ({}) AS q",
                    call.function,
                    self.statement(&inner, root, true, clauses.top.is_some())
                )
            }
            (ResultMode::Aggregate, Some(call)) => {
                self.statement(&format!("{}({})", call.function, call.argument), root, false, false)
            }
            _ => self.statement(&list, root, true, true),
        };

        tracing::debug!(sql = %sql, ?mode, "generated statement");
        Ok(Compiled {
            sql,
            shape,
            mode,
            top: clauses.top,
            distinct: clauses.distinct,
        })
    }

    /// `SELECT [DISTINCT] [TOP n] list FROM .. WHERE .. GROUP BY .. ORDER BY .. [LIMIT n]`
    fn statement(&self, list: &str, root: &TableRef, limited: bool, ordered: bool) -> String {
        let clauses = &self.clauses;
        let mut sql = String::from("SELECT ");
        if limited {
            if clauses.distinct {
                sql.push_str("DISTINCT ");
            }
            if let Some(n) = clauses.top {
                sql.push_str(&self.generator.top(n));
            }
        }
        sql.push_str(list);
        sql.push_str(" FROM ");
        sql.push_str(&self.render_from(root));

        if !clauses.where_parts.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.where_parts.join(" AND "));
        }
        if !clauses.group_keys.is_empty() {
            let keys: Vec<&str> = clauses.group_keys.iter().map(|k| k.sql.as_str()).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&keys.join(", "));
        }
        if ordered && !clauses.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&clauses.order_by.join(", "));
        }
        if let (true, Some(n)) = (limited, clauses.top) {
            sql.push_str(&self.generator.limit(n));
        }
        sql
    }

    /// Select list and row shape, by precedence: projection, latest join
    /// result, group key, then every mapped field of the root table.
    fn select_list(&self, root: &TableRef) -> ExqlResult<(String, RowShape)> {
        match &self.clauses.projection {
            Some(Projection::Scalar { value_type, value }) => {
                return Ok((self.select_expr(value)?, RowShape::Scalar(*value_type)));
            }
            Some(Projection::Object {
                positional,
                model,
                fields,
            }) => {
                let list = self.member_list(fields)?;
                let shape = if *positional {
                    check_constructor(model, fields)?;
                    RowShape::Positional { model: model.clone() }
                } else {
                    RowShape::Named {
                        model: model.clone(),
                        members: settable_members(model, fields)?,
                    }
                };
                return Ok((list, shape));
            }
            None => {}
        }

        if let Some(join) = self.clauses.joins.last() {
            let list = self.member_list(&join.result_fields)?;
            let model = &join.result_model;
            let shape = match model.constructor_params() {
                Some(_) => {
                    check_constructor(model, &join.result_fields)?;
                    RowShape::Positional { model: model.clone() }
                }
                None => RowShape::Named {
                    model: model.clone(),
                    members: settable_members(model, &join.result_fields)?,
                },
            };
            return Ok((list, shape));
        }

        if let Some(key) = self.clauses.group_keys.last() {
            let list = self.select_expr(&Eval::Fragment(key.clone()))?;
            return Ok((list, RowShape::Scalar(None)));
        }

        let list: Vec<String> = root
            .model
            .fields()
            .iter()
            .map(|f| self.generator.entity_item(&root.alias, f.column()))
            .collect();
        Ok((list.join(", "), RowShape::Entity(root.model.clone())))
    }

    fn member_list(&self, fields: &FieldMap) -> ExqlResult<String> {
        let items = fields
            .entries
            .iter()
            .map(|(name, value)| {
                Ok(format!(
                    "{} AS {}",
                    self.select_expr(value)?,
                    self.generator.quote_identifier(name)
                ))
            })
            .collect::<ExqlResult<Vec<_>>>()?;
        Ok(items.join(", "))
    }

    /// One select item, without its alias.
    fn select_expr(&self, value: &Eval) -> ExqlResult<String> {
        match value {
            Eval::Fragment(Fragment { column: Some(c), .. }) => {
                Ok(self.generator.column_item(&c.alias, &c.column, !self.clauses.joins.is_empty()))
            }
            Eval::Fragment(fragment) => Ok(fragment.sql.clone()),
            Eval::Scalar(value) => self.generator.literal(value),
            Eval::Host(host) => Err(ExqlError::InvalidValue(format!(
                "host object '{}' cannot be selected",
                host.type_name()
            ))),
            other => Err(ExqlError::unsupported(format!(
                "selecting a {} as a single member",
                other.describe()
            ))),
        }
    }
}

/// Every projected member must be an assignable field of the target.
fn settable_members(model: &ModelRef, fields: &FieldMap) -> ExqlResult<Vec<String>> {
    for name in fields.names() {
        match model.field(&name) {
            Some(field) if field.is_settable() => {}
            _ => return Err(ExqlError::member(name, model.type_name())),
        }
    }
    Ok(fields.names())
}

/// Every constructor parameter must be supplied by the projection.
fn check_constructor(model: &ModelRef, fields: &FieldMap) -> ExqlResult<()> {
    let params = model
        .constructor_params()
        .ok_or_else(|| ExqlError::unsupported(format!("{} has no positional constructor", model.type_name())))?;
    let names = fields.names();
    for param in params {
        if !names.contains(param) {
            return Err(ExqlError::member(param.clone(), model.type_name()));
        }
    }
    Ok(())
}
