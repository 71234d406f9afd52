//! Inner joins and FROM-clause rendering.

use super::{Eval, FieldMap, TableRef, Translator};
use crate::ast::{Expr, ExprKind};
use crate::error::{ExqlError, ExqlResult};
use crate::mapping::{ModelMeta, ModelRef};
use std::sync::Arc;

/// One accumulated inner join.
#[derive(Debug, Clone)]
pub(crate) struct JoinDescriptor {
    pub(crate) inner: TableRef,
    pub(crate) outer_keys: Vec<String>,
    pub(crate) inner_keys: Vec<String>,
    pub(crate) result_fields: FieldMap,
    pub(crate) result_model: ModelRef,
    pub(crate) alias_index: usize,
}

impl JoinDescriptor {
    /// `(a = b)`, or every key pair joined with AND for composite keys.
    pub(crate) fn predicate(&self) -> String {
        let pairs: Vec<String> = self
            .outer_keys
            .iter()
            .zip(&self.inner_keys)
            .map(|(outer, inner)| format!("({} = {})", outer, inner))
            .collect();
        if pairs.len() == 1 {
            pairs.into_iter().next().unwrap_or_default()
        } else {
            format!("({})", pairs.join(" AND "))
        }
    }
}

impl Translator {
    /// `Join(outer, inner, outerKey, innerKey, result)`.
    pub(crate) fn join(&mut self, args: &[Expr]) -> ExqlResult<Eval> {
        let [outer, inner, outer_key, inner_key, result] = args else {
            return Err(ExqlError::UnsupportedExpressionKind(format!(
                "Join takes 5 arguments, found {}",
                args.len()
            )));
        };

        let outer_rows = self.evaluate(outer)?;
        if let Eval::Grouping(_) = outer_rows {
            return Err(ExqlError::unsupported("joining groups"));
        }

        self.clauses.alias_counter += 1;
        let alias_index = self.clauses.alias_counter;
        let inner_table = match self.evaluate(inner)? {
            Eval::Table(table) => table,
            other => {
                return Err(ExqlError::unsupported(format!("joining against a {}", other.describe())));
            }
        };

        let outer_value = self.apply(outer_key, vec![outer_rows.clone()])?;
        let outer_keys = self.key_fragments(outer_value)?;
        let inner_value = self.apply(inner_key, vec![Eval::Table(inner_table.clone())])?;
        let inner_keys = self.key_fragments(inner_value)?;
        if outer_keys.len() != inner_keys.len() {
            return Err(ExqlError::unsupported("join keys of different arity"));
        }

        let selected = self.apply(result, vec![outer_rows, Eval::Table(inner_table.clone())])?;
        let (result_fields, fallback) = match selected {
            Eval::Fields(map) => (map, None),
            Eval::Table(table) => (FieldMap::of_table(&table), Some(table.model.clone())),
            Eval::Join(index) => {
                let previous = &self.clauses.joins[index];
                (previous.result_fields.clone(), Some(previous.result_model.clone()))
            }
            other => {
                return Err(ExqlError::unsupported(format!(
                    "join result selector producing a {}",
                    other.describe()
                )));
            }
        };
        let result_model = result_model(result, fallback, &result_fields);

        tracing::trace!(
            inner = inner_table.model.table(),
            alias = %inner_table.alias,
            "accumulated join"
        );

        // A join resets any earlier projection.
        self.clauses.projection = None;
        self.clauses.joins.push(JoinDescriptor {
            inner: inner_table,
            outer_keys,
            inner_keys,
            result_fields,
            result_model,
            alias_index,
        });
        Ok(Eval::Join(self.clauses.joins.len() - 1))
    }

    /// `Root t0 INNER JOIN T t1 ON ..`, left-nested in parentheses.
    pub(crate) fn render_from(&self, root: &TableRef) -> String {
        let joins = &self.clauses.joins;
        let nest = self.options.nest_joins && joins.len() > 1;

        let mut from = String::new();
        if nest {
            from.push_str(&"(".repeat(joins.len() - 1));
        }
        from.push_str(&format!("{} {}", root.model.table(), root.alias));

        for (i, join) in joins.iter().enumerate() {
            tracing::trace!(alias_index = join.alias_index, on = %join.predicate(), "rendering join");
            from.push_str(&format!(
                " INNER JOIN {} {} ON {}",
                join.inner.model.table(),
                join.inner.alias,
                join.predicate()
            ));
            if nest && i + 1 < joins.len() {
                from.push(')');
            }
        }
        from
    }
}

/// Declared type of the result selector, else the joined row's model, else
/// an anonymous type over the selected members.
fn result_model(result: &Expr, fallback: Option<ModelRef>, fields: &FieldMap) -> ModelRef {
    let declared = match result.unquote().kind() {
        ExprKind::Lambda { body, .. } => body.ty().model().cloned(),
        _ => None,
    };
    declared.or(fallback).unwrap_or_else(|| {
        Arc::new(ModelMeta::anonymous(
            fields.entries.iter().map(|(name, _)| (name.clone(), None)),
        ))
    })
}
