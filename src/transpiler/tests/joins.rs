use pretty_assertions::assert_eq;

use super::*;
use crate::error::ExqlError;
use crate::transpiler::RowShape;

fn shipments() -> QueryBuilder {
    QueryBuilder::from::<Shipment>()
}

fn customer_orders() -> QueryBuilder {
    customers().join(
        orders(),
        |c| c.field("Id"),
        |o| o.field("CustomerId"),
        |c, o| {
            new_anonymous(vec![
                ("Name", c.field("Name")),
                ("OrderId", o.clone().field("Id")),
                ("Total", o.field("Total")),
            ])
        },
    )
}

#[test]
fn test_single_join() {
    let query = customers().join(
        orders(),
        |c| c.field("Id"),
        |o| o.field("CustomerId"),
        |c, o| new_anonymous(vec![("Name", c.field("Name")), ("Total", o.field("Total"))]),
    );
    assert_eq!(
        sql(&query),
        "SELECT [t0.Name] AS [Name], [t1.Total] AS [Total] FROM Customers t0 INNER JOIN Orders t1 ON (t0.Id = t1.CustomerId)"
    );
}

#[test]
fn test_join_result_shape() {
    let compiled = compile(&customer_orders()).unwrap();
    match compiled.shape() {
        RowShape::Named { members, .. } => assert_eq!(members, &["Name", "OrderId", "Total"]),
        other => panic!("unexpected shape {:?}", other),
    }
}

#[test]
fn test_chained_joins_nest_left() {
    let query = customer_orders().join(
        shipments(),
        |co| co.field("OrderId"),
        |s| s.field("OrderId"),
        |co, s| new_anonymous(vec![("Name", co.field("Name")), ("Carrier", s.field("Carrier"))]),
    );
    assert_eq!(
        sql(&query),
        "SELECT [t0.Name] AS [Name], [t2.Carrier] AS [Carrier] \
         FROM (Customers t0 INNER JOIN Orders t1 ON (t0.Id = t1.CustomerId)) \
         INNER JOIN Shipments t2 ON (t1.Id = t2.OrderId)"
    );
}

#[test]
fn test_three_joins_nest_twice() {
    let query = customer_orders()
        .join(
            shipments(),
            |co| co.field("OrderId"),
            |s| s.field("OrderId"),
            |co, s| {
                new_anonymous(vec![
                    ("Name", co.field("Name")),
                    ("ShipmentId", s.field("Id")),
                ])
            },
        )
        .join(
            QueryBuilder::from::<Person>(),
            |row| row.field("Name"),
            |p| p.field("Name"),
            |row, p| new_anonymous(vec![("ShipmentId", row.field("ShipmentId")), ("PersonId", p.field("Id"))]),
        );
    let text = sql(&query);

    assert!(text.contains("FROM ((Customers t0 INNER JOIN Orders t1 ON (t0.Id = t1.CustomerId))"));
    assert!(text.contains(" INNER JOIN Shipments t2 ON (t1.Id = t2.OrderId))"));
    assert!(text.ends_with(" INNER JOIN People t3 ON (t0.Name = t3.Name)"));
    assert_eq!(text.matches('(').count() - text.matches(')').count(), 0);
}

#[test]
fn test_flat_joins_option() {
    let options = CompilerOptions {
        nest_joins: false,
        ..CompilerOptions::default()
    };
    let query = customer_orders().join(
        shipments(),
        |co| co.field("OrderId"),
        |s| s.field("OrderId"),
        |co, s| new_anonymous(vec![("Name", co.field("Name")), ("Carrier", s.field("Carrier"))]),
    );
    let compiled = Translator::translate(query.expr(), &options).unwrap();
    assert!(compiled.sql().ends_with(
        "FROM Customers t0 INNER JOIN Orders t1 ON (t0.Id = t1.CustomerId) INNER JOIN Shipments t2 ON (t1.Id = t2.OrderId)"
    ));
}

#[test]
fn test_filter_and_order_through_join_fields() {
    let query = customer_orders()
        .filter(|row| row.field("Total").gt(100))
        .order_by_desc(|row| row.field("Total"));
    assert_eq!(
        sql(&query),
        "SELECT [t0.Name] AS [Name], [t1.Id] AS [OrderId], [t1.Total] AS [Total] \
         FROM Customers t0 INNER JOIN Orders t1 ON (t0.Id = t1.CustomerId) \
         WHERE (t1.Total > 100) ORDER BY t1.Total DESC"
    );
}

#[test]
fn test_projection_after_join() {
    let query = customer_orders().select(|row| row.field("Total"));
    assert_eq!(
        sql(&query),
        "SELECT [t1.Total] FROM Customers t0 INNER JOIN Orders t1 ON (t0.Id = t1.CustomerId)"
    );
}

#[test]
fn test_composite_join_keys() {
    let query = customers().join(
        QueryBuilder::from::<Person>(),
        |c| new_anonymous(vec![("Id", c.clone().field("Id")), ("Name", c.field("Name"))]),
        |p| new_anonymous(vec![("Id", p.clone().field("Id")), ("Name", p.field("Name"))]),
        |c, _| new_anonymous(vec![("City", c.field("City"))]),
    );
    assert_eq!(
        sql(&query),
        "SELECT [t0.City] AS [City] FROM Customers t0 INNER JOIN People t1 ON ((t0.Id = t1.Id) AND (t0.Name = t1.Name))"
    );
}

#[test]
fn test_join_selecting_inner_row() {
    let query = customers().join(orders(), |c| c.field("Id"), |o| o.field("CustomerId"), |_, o| o);
    let compiled = compile(&query).unwrap();
    assert_eq!(
        compiled.sql(),
        "SELECT [t1.Id] AS [Id], [t1.CustomerId] AS [CustomerId], [t1.Total] AS [Total] \
         FROM Customers t0 INNER JOIN Orders t1 ON (t0.Id = t1.CustomerId)"
    );
    assert!(matches!(compiled.shape(), RowShape::Named { model, .. } if model.type_name() == "Order"));
}

#[test]
fn test_join_result_unknown_member() {
    let query = customer_orders().filter(|row| row.field("Carrier").eq("DHL"));
    assert!(matches!(
        compile(&query),
        Err(ExqlError::MemberNotFound { member, .. }) if member == "Carrier"
    ));
}

#[test]
fn test_join_keys_of_different_arity() {
    let query = customers().join(
        QueryBuilder::from::<Person>(),
        |c| new_anonymous(vec![("Id", c.clone().field("Id")), ("Name", c.field("Name"))]),
        |p| p.field("Id"),
        |c, _| c,
    );
    assert!(matches!(compile(&query), Err(ExqlError::UnsupportedOperation(_))));
}
