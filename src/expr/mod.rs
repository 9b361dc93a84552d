//! Expression AST, evaluation, the scalar function registry and the
//! built-in aggregations shared by every operator in `crate::dbs`.

pub mod aggregate;
pub mod ast;
pub mod eval;
pub mod registry;

pub use aggregate::Aggregation;
pub use ast::{BinaryOp, Expr, Literal, ObjectEntry, UnaryOp};
pub use eval::{evaluate, Scope};
pub use registry::Registry;
