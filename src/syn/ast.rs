//! The plan tree produced by `crate::syn::parser` — a pure data structure
//! describing a tree of plan nodes. `crate::engine::Engine` walks this to
//! construct live pipelines; nothing in this module executes anything.

use crate::expr::Expr;

#[derive(Debug, Clone, Default)]
pub struct Program {
	pub statements: Vec<Statement>,
}

#[derive(Debug, Clone)]
pub enum Statement {
	CreateStream {
		name: String,
		replace: bool,
		ttl_ms: Option<u64>,
	},
	CreateFlow {
		name: String,
		replace: bool,
		ttl_ms: Option<u64>,
		pipeline: PipelinePlan,
	},
	/// `create lookup NAME as { "key": expr, ... }` — an extension of the
	/// grammar's generic `create ... as <pipeline>` production, since a
	/// lookup's body is a constant table rather than a pipeline (see
	/// DESIGN.md's Open Question resolution).
	CreateLookup {
		name: String,
		replace: bool,
		entries: Vec<(String, Expr)>,
	},
	DeleteStream {
		name: String,
	},
	DeleteFlow {
		name: String,
	},
	DeleteLookup {
		name: String,
	},
	Insert {
		stream: String,
		docs: Vec<Expr>,
	},
	Flush {
		stream: String,
	},
	ListStreams,
	ListFlows,
	ListLookups,
	Info {
		name: String,
	},
	Subscribe {
		stream: String,
	},
	Unsubscribe {
		id: String,
	},
}

#[derive(Debug, Clone)]
pub struct PipelinePlan {
	pub source: String,
	pub ops: Vec<OpPlan>,
}

#[derive(Debug, Clone)]
pub enum OpPlan {
	Where(Expr),
	/// `map <expr>`: replaces the document with the result of `expr`; a
	/// `null` result drops the document.
	Map(Expr),
	Select(Vec<crate::expr::ObjectEntry>),
	Scan(Vec<StepPlan>),
	Summarize {
		projections: Vec<(String, Expr)>,
		by: Vec<String>,
		window: Option<Call>,
		emit: Option<EmitSpec>,
	},
	/// `sorter(key_expr [, buffer_size] [, max_latency])`: an extension of
	/// the `op` production alongside `map` (see DESIGN.md).
	Sorter {
		key: Expr,
		buffer_size: Option<u64>,
		max_latency_ms: Option<u64>,
	},
	InsertInto(String),
	/// Accepted by the grammar but bound as an error: file I/O is out of
	/// scope for this engine.
	WriteToFile(String),
	AssertOrSaveExpected(String),
}

/// A call-shaped argument list, used for window and emit-trigger clauses
/// where arguments mix field-name identifiers with numeric/duration
/// literals rather than being general expressions.
#[derive(Debug, Clone)]
pub struct Call {
	pub name: String,
	pub args: Vec<CallArg>,
}

#[derive(Debug, Clone)]
pub enum CallArg {
	Ident(String),
	Number(f64),
	Duration(u64),
}

/// An `emit <trigger>` clause: either a call-shaped trigger like
/// `emit_every(3)` sharing [`Call`]'s argument grammar, or
/// `emit_when(<predicate>)` whose single argument is a full boolean
/// expression rather than a bare identifier/literal.
#[derive(Debug, Clone)]
pub enum EmitSpec {
	Call(Call),
	When(Expr),
}

#[derive(Debug, Clone)]
pub struct StepPlan {
	pub name: String,
	pub optional: bool,
	pub end_when: Option<Expr>,
	pub guard: Expr,
	pub actions: Vec<StepAction>,
}

#[derive(Debug, Clone)]
pub enum StepAction {
	Assign {
		field: String,
		value: Expr,
	},
	Emit(Expr),
}
