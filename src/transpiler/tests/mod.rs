//! Translator tests over a small customer/order schema.

mod basics;
mod joins;

use std::sync::Arc;

use crate::ast::{Expr, QueryBuilder, ShapeKind};
use crate::config::CompilerOptions;
use crate::error::ExqlResult;
use crate::mapping::{Model, ModelBuilder, ModelMeta, ModelRef, model};
use crate::transpiler::{Compiled, Translator};
use crate::value::ValueType;

#[derive(Debug, Default)]
pub(super) struct Person {
    pub id: i64,
    pub name: String,
}

impl Model for Person {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .table("People")
            .field("Id", |p: &Person| p.id, |p, v| p.id = v)
            .field("Name", |p: &Person| p.name.clone(), |p, v| p.name = v)
            .primary_key("Id")
            .default_constructor();
    }
}

#[derive(Debug, Default)]
pub(super) struct Customer {
    pub id: i64,
    pub name: String,
    pub city: Option<String>,
    pub age: i64,
}

impl Model for Customer {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .table("Customers")
            .field("Id", |c: &Customer| c.id, |c, v| c.id = v)
            .field("Name", |c: &Customer| c.name.clone(), |c, v| c.name = v)
            .field("City", |c: &Customer| c.city.clone(), |c, v| c.city = v)
            .field("Age", |c: &Customer| c.age, |c, v| c.age = v)
            .primary_key("Id")
            .default_constructor();
    }
}

#[derive(Debug, Default)]
pub(super) struct Order {
    pub id: i64,
    pub customer_id: i64,
    pub total: f64,
}

impl Model for Order {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .table("Orders")
            .field("Id", |o: &Order| o.id, |o, v| o.id = v)
            .field("CustomerId", |o: &Order| o.customer_id, |o, v| o.customer_id = v)
            .field("Total", |o: &Order| o.total, |o, v| o.total = v)
            .primary_key("Id")
            .default_constructor();
    }
}

#[derive(Debug, Default)]
pub(super) struct Shipment {
    pub id: i64,
    pub order_id: i64,
    pub carrier: String,
}

impl Model for Shipment {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .table("Shipments")
            .field("Id", |s: &Shipment| s.id, |s, v| s.id = v)
            .field("OrderId", |s: &Shipment| s.order_id, |s, v| s.order_id = v)
            .field("Carrier", |s: &Shipment| s.carrier.clone(), |s, v| s.carrier = v)
            .default_constructor();
    }
}

/// Positional projection target.
#[derive(Debug)]
pub(super) struct NameAge {
    pub name: String,
    pub age: i64,
}

impl Model for NameAge {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .readonly_field("Name", |n: &NameAge| n.name.clone())
            .readonly_field("Age", |n: &NameAge| n.age)
            .constructor(&["Name", "Age"], |args| {
                Ok(NameAge {
                    name: args.next()?,
                    age: args.next()?,
                })
            });
    }
}

pub(super) fn anonymous(members: &[(&str, ValueType)]) -> ModelRef {
    Arc::new(ModelMeta::anonymous(
        members.iter().map(|(name, vt)| (name.to_string(), Some(*vt))),
    ))
}

/// `new { name = value, .. }` with an anonymous target.
pub(super) fn new_anonymous(members: Vec<(&str, Expr)>) -> Expr {
    let target: Vec<(&str, ValueType)> = members
        .iter()
        .map(|(name, e)| (*name, e.ty().scalar().unwrap_or(ValueType::Text)))
        .collect();
    Expr::new_object(anonymous(&target), ShapeKind::Named, members)
}

pub(super) fn compile(query: &QueryBuilder) -> ExqlResult<Compiled> {
    Translator::translate(query.expr(), &CompilerOptions::default())
}

pub(super) fn sql(query: &QueryBuilder) -> String {
    compile(query).unwrap().sql().to_string()
}

pub(super) fn customers() -> QueryBuilder {
    QueryBuilder::from::<Customer>()
}

pub(super) fn orders() -> QueryBuilder {
    QueryBuilder::from_model(model::<Order>())
}
