//! The expression AST produced by the parser (`crate::syn`) and walked by
//! `crate::expr::eval`. Operators and path access collapse into one enum
//! since Jet's expression grammar is small enough not to need a separate
//! split between the two.

use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
	Null,
	Bool(bool),
	Number(f64),
	String(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
	Neg,
	Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
	Add,
	Sub,
	Mul,
	Div,
	Mod,
	Eq,
	Neq,
	Lt,
	Lte,
	Gt,
	Gte,
	And,
	Or,
	Coalesce,
}

/// One entry in an object literal / `select` projection: a spread of all
/// current fields, an explicit named field, or an exclusion applied after
/// the rest of the object is built.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectEntry {
	/// `...*`
	SpreadAll,
	/// `name: expr`
	Field {
		name: String,
		expr: Arc<Expr>,
	},
	/// `-name`
	Exclude(String),
}

/// A Jet expression. Shared by `where`, `select`, `summarize` projections,
/// `scan` guards/assignments/emits, and window/emit-trigger arguments.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
	Literal(Literal),
	/// A dotted path, e.g. `a.b.c` or a bare identifier `x`. The first
	/// segment is resolved against the evaluation scope (see
	/// `crate::expr::eval::Scope`): it may name a step's local variables, the
	/// special `state` scope, or fall through to the current record.
	Path(Vec<String>),
	Unary(UnaryOp, Box<Expr>),
	Binary(BinaryOp, Box<Expr>, Box<Expr>),
	/// `name(args...)`. Resolved against the scalar registry when evaluated
	/// directly, or against the aggregation registry when it appears as a
	/// `summarize` projection value (see `crate::dbs::summarize`).
	Call(String, Vec<Expr>),
	Object(Vec<ObjectEntry>),
	Array(Vec<Expr>),
}

impl Expr {
	pub fn lit(v: impl Into<Literal>) -> Self {
		Expr::Literal(v.into())
	}

	/// True if this expression is a single aggregation call, e.g. `sum(x)`
	/// or `count()` — the form `summarize` projections expect.
	pub fn as_aggregate_call(&self) -> Option<(&str, &[Expr])> {
		match self {
			Expr::Call(name, args) => Some((name.as_str(), args.as_slice())),
			_ => None,
		}
	}

	/// Collapses a dotted path expression back into its canonical idiom
	/// string, used to derive an implicit output field name when a
	/// `summarize` projection has no explicit alias.
	pub fn to_idiom(&self) -> String {
		match self {
			Expr::Path(parts) => parts.join("."),
			Expr::Call(name, _) => name.clone(),
			_ => "expr".to_string(),
		}
	}
}

impl From<bool> for Literal {
	fn from(v: bool) -> Self {
		Literal::Bool(v)
	}
}

impl From<f64> for Literal {
	fn from(v: f64) -> Self {
		Literal::Number(v)
	}
}

impl From<String> for Literal {
	fn from(v: String) -> Self {
		Literal::String(v)
	}
}

impl From<&str> for Literal {
	fn from(v: &str) -> Self {
		Literal::String(v.to_string())
	}
}
