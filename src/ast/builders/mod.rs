//! Ergonomic builders for query expression trees.

mod nodes;
mod query;

pub use query::QueryBuilder;
