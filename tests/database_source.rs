use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{NaiveDate, NaiveDateTime};
use exql::prelude::*;
use exql::source::Command;
use pretty_assertions::assert_eq;

#[derive(Debug, Default, PartialEq)]
struct Member {
    id: i64,
    name: String,
    joined: NaiveDateTime,
    active: bool,
}

impl Model for Member {
    fn describe(model: &mut ModelBuilder<Self>) {
        model
            .table("Members")
            .field("Id", |m: &Member| m.id, |m, v| m.id = v)
            .field("Name", |m: &Member| m.name.clone(), |m, v| m.name = v)
            .field("Joined", |m: &Member| m.joined, |m, v| m.joined = v)
            .field("Active", |m: &Member| m.active, |m, v| m.active = v)
            .primary_key("Id")
            .default_constructor();
    }
}

/// A scratch SQLite file removed on drop.
struct ScratchDb {
    path: PathBuf,
}

impl ScratchDb {
    fn create() -> Self {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        let path = std::env::temp_dir().join(format!("exql-{}-{}.db", std::process::id(), nanos));
        let db = Self { path };

        let mut source = db.source();
        source.open().unwrap();
        for sql in [
            "CREATE TABLE Members (Id INTEGER PRIMARY KEY, Name TEXT NOT NULL, Joined TEXT NOT NULL, Active INTEGER NOT NULL)",
            "INSERT INTO Members VALUES (1, 'Ann', '2023-05-01 09:00:00', 1)",
            "INSERT INTO Members VALUES (2, 'Bo', '2024-01-15 18:30:00', 0)",
            "INSERT INTO Members VALUES (3, 'Cid', '2024-02-01 07:45:00', 1)",
        ] {
            source.execute(&Command::new(sql)).unwrap();
        }
        source.close().unwrap();
        db
    }

    fn source(&self) -> DatabaseSource {
        DatabaseSource::new(format!("sqlite://{}?mode=rwc", self.path.display())).unwrap()
    }
}

impl Drop for ScratchDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
}

fn sqlite() -> CompilerOptions {
    CompilerOptions::for_dialect(Dialect::Sqlite)
}

#[test]
fn test_entities_round_trip_through_sqlite() {
    let db = ScratchDb::create();
    let mut source = db.source();
    assert_eq!(source.dialect(), Dialect::Sqlite);

    let query = QueryBuilder::from::<Member>()
        .filter(|m| m.field("Active").eq(true))
        .order_by_desc(|m| m.field("Joined"))
        .take(5)
        .build::<Member>()
        .with_options(sqlite());

    assert_eq!(
        query.fetch_all(&mut source).unwrap(),
        vec![
            Member {
                id: 3,
                name: "Cid".into(),
                joined: at(2024, 2, 1, 7, 45),
                active: true,
            },
            Member {
                id: 1,
                name: "Ann".into(),
                joined: at(2023, 5, 1, 9, 0),
                active: true,
            },
        ]
    );
}

#[test]
fn test_scalars_counts_and_aggregates_through_sqlite() {
    let db = ScratchDb::create();
    let mut source = db.source();

    let names = QueryBuilder::from::<Member>()
        .filter(|m| m.field("Name").method("StartsWith", vec!["B".into()]))
        .select(|m| m.field("Name"))
        .build::<String>()
        .with_options(sqlite());
    assert_eq!(names.fetch_all(&mut source).unwrap(), vec!["Bo".to_string()]);

    let first = QueryBuilder::from::<Member>()
        .order_by(|m| m.field("Id"))
        .first_or_default()
        .build::<Member>()
        .with_options(sqlite());
    assert_eq!(first.fetch_first(&mut source).unwrap().map(|m| m.name), Some("Ann".to_string()));

    let count = QueryBuilder::from::<Member>()
        .count_where(|m| m.field("Active").eq(true))
        .build::<i64>()
        .with_options(sqlite());
    assert_eq!(count.count(&mut source).unwrap(), 2);

    let top_two = QueryBuilder::from::<Member>()
        .order_by(|m| m.field("Id"))
        .take(2)
        .sum(|m| m.field("Id"))
        .build::<i64>()
        .with_options(sqlite());
    assert_eq!(top_two.scalar(&mut source).unwrap(), Value::Int(3));
}

#[test]
fn test_source_rejects_urls_without_driver() {
    assert!(matches!(
        DatabaseSource::new("mssql://localhost/shop"),
        Err(ExqlError::Config(_))
    ));
}
