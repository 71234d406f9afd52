//! Query expression tree.
//!
//! Trees are produced once by a front end (the fluent [`QueryBuilder`] or the
//! textual parser) and only read by the translator.

pub mod builders;
mod expr;
mod host;

pub use builders::QueryBuilder;
pub use expr::{BinaryOp, Constant, Expr, ExprKind, ShapeKind, TypeRef};
pub use host::HostValue;
