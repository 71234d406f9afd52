use chrono::NaiveDate;
use pretty_assertions::assert_eq;

use super::*;
use crate::ast::{HostValue, TypeRef};
use crate::error::ExqlError;
use crate::transpiler::{ResultMode, RowShape};
use crate::value::Value;

const CUSTOMER_COLUMNS: &str = "[t0.Id], [t0.Name], [t0.City], [t0.Age]";

#[test]
fn test_filter_on_mapped_type() {
    let query = QueryBuilder::from::<Person>().filter(|p| p.field("Name").eq("Ann"));
    assert_eq!(sql(&query), "SELECT [t0.Id], [t0.Name] FROM People t0 WHERE (t0.Name = 'Ann')");
}

#[test]
fn test_first_of_named_projection() {
    let query = QueryBuilder::from::<Person>()
        .select(|p| new_anonymous(vec![("Name", p.field("Name"))]))
        .first();
    let compiled = compile(&query).unwrap();

    assert_eq!(compiled.top_limit(), Some(1));
    assert_eq!(compiled.mode(), ResultMode::First);
    assert_eq!(compiled.sql(), "SELECT TOP 1 [Name] AS [Name] FROM People t0");
    assert!(matches!(compiled.shape(), RowShape::Named { members, .. } if members == &["Name"]));
}

#[test]
fn test_compilation_is_repeatable() {
    let query = customers()
        .filter(|c| c.field("Age").gt(30))
        .order_by(|c| c.field("Name"));
    assert_eq!(sql(&query), sql(&query));
}

#[test]
fn test_chained_filters_are_anded() {
    let chained = customers()
        .filter(|c| c.field("Age").gt(30))
        .filter(|c| c.field("City").eq("Oslo"));
    assert_eq!(
        sql(&chained),
        format!("SELECT {} FROM Customers t0 WHERE (t0.Age > 30) AND (t0.City = 'Oslo')", CUSTOMER_COLUMNS)
    );

    let combined = customers().filter(|c| c.clone().field("Age").gt(30).and(c.field("City").eq("Oslo")));
    assert_eq!(
        sql(&combined),
        format!("SELECT {} FROM Customers t0 WHERE ((t0.Age > 30) AND (t0.City = 'Oslo'))", CUSTOMER_COLUMNS)
    );
}

#[test]
fn test_ordering_and_limit() {
    let query = customers()
        .order_by(|c| c.field("Name"))
        .then_by_desc(|c| c.field("Age"))
        .take(10);
    assert_eq!(
        sql(&query),
        format!("SELECT TOP 10 {} FROM Customers t0 ORDER BY t0.Name, t0.Age DESC", CUSTOMER_COLUMNS)
    );

    let restarted = customers().order_by(|c| c.field("Name")).order_by_desc(|c| c.field("Age"));
    assert_eq!(
        sql(&restarted),
        format!("SELECT {} FROM Customers t0 ORDER BY t0.Age DESC", CUSTOMER_COLUMNS)
    );
}

#[test]
fn test_take_keeps_smallest_limit() {
    let query = customers().take(10).take(3).take(5);
    assert_eq!(compile(&query).unwrap().top_limit(), Some(3));
}

#[test]
fn test_clause_order_is_fixed() {
    let query = customers()
        .order_by(|c| c.field("Name"))
        .filter(|c| c.field("Age").lt(65));
    assert_eq!(
        sql(&query),
        format!("SELECT {} FROM Customers t0 WHERE (t0.Age < 65) ORDER BY t0.Name", CUSTOMER_COLUMNS)
    );
}

#[test]
fn test_scalar_projection() {
    let query = customers().select(|c| c.field("City")).distinct();
    let compiled = compile(&query).unwrap();
    assert_eq!(compiled.sql(), "SELECT DISTINCT [City] FROM Customers t0");
    assert!(compiled.is_distinct());
    assert!(matches!(compiled.shape(), RowShape::Scalar(Some(ValueType::Text))));
}

#[test]
fn test_order_by_projected_member() {
    let query = customers()
        .select(|c| new_anonymous(vec![("Name", c.clone().field("Name")), ("Age", c.field("Age"))]))
        .order_by(|row| row.field("Age"));
    assert_eq!(
        sql(&query),
        "SELECT [Name] AS [Name], [Age] AS [Age] FROM Customers t0 ORDER BY t0.Age"
    );
}

#[test]
fn test_positional_projection() {
    let query = customers().select(|c| {
        Expr::new_object(
            model::<NameAge>(),
            ShapeKind::Positional,
            [("Name", c.clone().field("Name")), ("Age", c.field("Age"))],
        )
    });
    let compiled = compile(&query).unwrap();
    assert_eq!(compiled.sql(), "SELECT [Name] AS [Name], [Age] AS [Age] FROM Customers t0");
    assert!(matches!(compiled.shape(), RowShape::Positional { .. }));
}

#[test]
fn test_positional_projection_missing_parameter() {
    let query = customers()
        .select(|c| Expr::new_object(model::<NameAge>(), ShapeKind::Positional, [("Name", c.field("Name"))]));
    let err = compile(&query).unwrap_err();
    assert_eq!(err.to_string(), "Member 'Age' not found on 'NameAge'");
}

#[test]
fn test_named_projection_unknown_member() {
    let target = anonymous(&[("Name", ValueType::Text)]);
    let query = customers().select(|c| Expr::new_object(target, ShapeKind::Named, [("Nick", c.field("Name"))]));
    assert!(matches!(
        compile(&query),
        Err(ExqlError::MemberNotFound { member, .. }) if member == "Nick"
    ));
}

#[test]
fn test_count() {
    let query = customers().count_where(|c| c.field("Age").ge(18));
    let compiled = compile(&query).unwrap();
    assert_eq!(compiled.mode(), ResultMode::Count);
    assert_eq!(compiled.sql(), "SELECT COUNT(*) FROM Customers t0 WHERE (t0.Age >= 18)");
}

#[test]
fn test_count_wraps_distinct_rows() {
    let query = customers().select(|c| c.field("City")).distinct().count();
    assert_eq!(
        sql(&query),
        "SELECT COUNT(*) FROM (SELECT DISTINCT [City] FROM Customers t0) AS q"
    );
}

#[test]
fn test_count_wins_over_first() {
    let compiled = compile(&customers().first().count()).unwrap();
    assert_eq!(compiled.mode(), ResultMode::Count);
    assert_eq!(
        compiled.sql(),
        format!("SELECT COUNT(*) FROM (SELECT TOP 1 {} FROM Customers t0) AS q", CUSTOMER_COLUMNS)
    );
}

#[test]
fn test_first_with_predicate() {
    let query = customers().first_where(|c| c.field("Name").eq("Ann"));
    assert_eq!(
        sql(&query),
        format!("SELECT TOP 1 {} FROM Customers t0 WHERE (t0.Name = 'Ann')", CUSTOMER_COLUMNS)
    );
}

#[test]
fn test_top_level_aggregate() {
    let query = orders()
        .filter(|o| o.field("CustomerId").eq(7))
        .sum(|o| o.field("Total"));
    let compiled = compile(&query).unwrap();
    assert_eq!(compiled.mode(), ResultMode::Aggregate);
    assert_eq!(compiled.sql(), "SELECT SUM(t0.Total) FROM Orders t0 WHERE (t0.CustomerId = 7)");
}

#[test]
fn test_boolean_literals_render_as_bits() {
    let query = customers().filter(|c| c.field("Age").gt(18).eq(true));
    assert_eq!(
        sql(&query),
        format!("SELECT {} FROM Customers t0 WHERE ((t0.Age > 18) = 1)", CUSTOMER_COLUMNS)
    );
}

#[test]
fn test_nan_literal_is_rejected() {
    let query = customers().filter(|c| c.field("Age").gt(f64::NAN));
    assert!(matches!(compile(&query), Err(ExqlError::InvalidValue(_))));
}

#[test]
fn test_aggregate_over_take_wraps() {
    let query = QueryBuilder::from::<Person>()
        .order_by(|p| p.field("Name"))
        .take(5)
        .sum(|p| p.field("Id"));
    assert_eq!(
        sql(&query),
        "SELECT SUM(q.value) FROM (SELECT TOP 5 t0.Id AS [value] FROM People t0 ORDER BY t0.Name) AS q"
    );
}

#[test]
fn test_aggregate_over_distinct_wraps() {
    let query = QueryBuilder::from::<Person>()
        .select(|p| p.field("Id"))
        .distinct()
        .sum(|id| id);
    let compiled = compile(&query).unwrap();
    assert_eq!(compiled.mode(), ResultMode::Aggregate);
    assert_eq!(
        compiled.sql(),
        "SELECT SUM(q.value) FROM (SELECT DISTINCT t0.Id AS [value] FROM People t0) AS q"
    );
}

#[test]
fn test_aggregate_over_groups_wraps() {
    let query = customers()
        .group_by(|c| c.field("City"))
        .select(|g| g.group_count())
        .max(|n| n);
    assert_eq!(
        sql(&query),
        "SELECT MAX(q.value) FROM (SELECT COUNT(*) AS [value] FROM Customers t0 GROUP BY t0.City) AS q"
    );
}

#[test]
fn test_captured_host_values() {
    let filter = HostValue::object("Filter").with("MinAge", 30).with("City", "O'Hara");
    let query = customers().filter(|c| {
        c.clone()
            .field("Age")
            .gt(Expr::host(filter.clone()).field("MinAge"))
            .and(c.field("City").eq(Expr::host(filter.clone()).field("City")))
    });
    assert_eq!(
        sql(&query),
        format!(
            "SELECT {} FROM Customers t0 WHERE ((t0.Age > 30) AND (t0.City = 'O''Hara'))",
            CUSTOMER_COLUMNS
        )
    );

    let missing = customers().filter(|c| c.field("Age").gt(Expr::host(filter.clone()).field("MaxAge")));
    assert_eq!(
        compile(&missing).unwrap_err().to_string(),
        "Member 'MaxAge' not found on 'Filter'"
    );
}

#[test]
fn test_null_comparisons() {
    let query = customers().filter(|c| c.field("City").eq(Value::Null));
    assert_eq!(
        sql(&query),
        format!("SELECT {} FROM Customers t0 WHERE (t0.City IS NULL)", CUSTOMER_COLUMNS)
    );

    let query = customers().filter(|c| c.field("City").ne(Value::Null));
    assert_eq!(
        sql(&query),
        format!("SELECT {} FROM Customers t0 WHERE (t0.City IS NOT NULL)", CUSTOMER_COLUMNS)
    );
}

#[test]
fn test_arithmetic() {
    let query = orders().filter(|o| o.field("Total").mul(2).sub(5).gt(100));
    assert_eq!(
        sql(&query),
        "SELECT [t0.Id], [t0.CustomerId], [t0.Total] FROM Orders t0 WHERE (((t0.Total * 2) - 5) > 100)"
    );
}

#[test]
fn test_row_methods_become_sql_functions() {
    let query = customers().filter(|c| {
        c.clone()
            .field("Name")
            .method("ToUpper", vec![])
            .eq("ANN")
            .or(c.clone().field("Name").method("StartsWith", vec!["A".into()]))
            .or(c.field("Name").field("Length").gt(3))
    });
    assert_eq!(
        sql(&query),
        format!(
            "SELECT {} FROM Customers t0 WHERE (((UPPER(t0.Name) = 'ANN') OR (t0.Name LIKE 'A%')) OR (LEN(t0.Name) > 3))",
            CUSTOMER_COLUMNS
        )
    );
}

#[test]
fn test_host_methods_run_before_translation() {
    let query = customers().filter(|c| c.field("Name").eq(Expr::value(" ann ").method("Trim", vec![]).method("ToUpper", vec![])));
    assert_eq!(
        sql(&query),
        format!("SELECT {} FROM Customers t0 WHERE (t0.Name = 'ANN')", CUSTOMER_COLUMNS)
    );
}

#[test]
fn test_date_arithmetic_against_rows() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let cutoff = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let query = customers().filter(|c| {
        Expr::value(start)
            .method("AddDays", vec![c.field("Age")])
            .gt(cutoff)
    });
    assert_eq!(
        sql(&query),
        format!(
            "SELECT {} FROM Customers t0 WHERE (DATEADD(day, t0.Age, '2024-01-01 00:00:00') > '2024-03-01 00:00:00')",
            CUSTOMER_COLUMNS
        )
    );
}

#[test]
fn test_alias_prefix_option() {
    let options = CompilerOptions {
        alias_prefix: "c".to_string(),
        ..CompilerOptions::default()
    };
    let query = QueryBuilder::from::<Person>().filter(|p| p.field("Id").eq(1));
    let compiled = Translator::translate(query.expr(), &options).unwrap();
    assert_eq!(compiled.sql(), "SELECT [c0.Id], [c0.Name] FROM People c0 WHERE (c0.Id = 1)");
}

#[test]
fn test_unknown_operator() {
    let query = customers().apply("Reverse", vec![], TypeRef::Unknown);
    assert!(matches!(compile(&query), Err(ExqlError::UnsupportedExpressionKind(_))));
}

#[test]
fn test_unknown_method() {
    let query = customers().filter(|c| c.field("Name").method("Soundex", vec![]).eq("A500"));
    assert!(matches!(compile(&query), Err(ExqlError::UnsupportedOperation(_))));
}

#[test]
fn test_unknown_field() {
    let query = customers().filter(|c| c.field("Salary").gt(10));
    assert_eq!(
        compile(&query).unwrap_err().to_string(),
        "Member 'Salary' not found on 'Customer'"
    );
}

#[test]
fn test_unbound_parameter() {
    let query = customers().filter(|_| Expr::param("z", TypeRef::Unknown).field("Age").eq(1));
    assert!(matches!(
        compile(&query),
        Err(ExqlError::UnboundParameter(name)) if name == "z"
    ));
}
