//! The error types produced across the engine.
//!
//! Parse/bind errors are returned from [`crate::engine::Engine::execute`]
//! before any side effect, while runtime errors are surfaced to the caller
//! of an operator's `push` but do not themselves unwind the stream manager
//! (see [`crate::dbs::operator`]).

use std::fmt;

/// The single error type threaded through parsing, binding and execution.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
	/// The Jet source text could not be tokenised or parsed.
	#[error("parse error at {position}: {message}")]
	Parse {
		message: String,
		position: Position,
	},

	/// The program parsed but referenced something that cannot be resolved:
	/// an unknown function, an unknown aggregation, or (for statements that
	/// require it) an unknown stream or flow.
	#[error("bind error: {0}")]
	Bind(String),

	/// A document failed to evaluate against an expression, guard, or
	/// projection at runtime. The operator that raised this drops the
	/// offending document and surfaces the error to its caller; the
	/// operator's own state is left unchanged.
	#[error("evaluation error: {0}")]
	RuntimeEval(String),

	/// A statement could not be applied because of the state of the stream
	/// manager, e.g. `create stream` without `or replace` for a name that
	/// already exists, or `delete flow` for an unknown name.
	#[error("resource error: {0}")]
	Resource(String),

	/// The pipeline this flow is attached to hit a terminal error. The flow
	/// has already been detached from its source stream by the time this is
	/// observed by a caller.
	#[error("flow `{flow}` faulted: {reason}")]
	FlowFaulted {
		flow: String,
		reason: String,
	},
}

impl Error {
	pub fn parse(message: impl Into<String>, position: Position) -> Self {
		Error::Parse {
			message: message.into(),
			position,
		}
	}

	pub fn bind(message: impl Into<String>) -> Self {
		Error::Bind(message.into())
	}

	pub fn eval(message: impl Into<String>) -> Self {
		Error::RuntimeEval(message.into())
	}

	pub fn resource(message: impl Into<String>) -> Self {
		Error::Resource(message.into())
	}
}

/// A 1-based line/column location within Jet source text, used to report
/// parse errors the way a reader can actually act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
	pub line: u32,
	pub column: u32,
}

impl fmt::Display for Position {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.line, self.column)
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
