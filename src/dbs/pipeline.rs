//! The operator pipeline: push/flush/finish plumbing that chains operators
//! together and routes terminal `insert_into` sinks back out to the caller
//! (`crate::dbs::manager::StreamManager`, which owns the actual cross-stream
//! routing — a `Pipeline` on its own has no notion of other streams).
//!
//! Walks a plan tree document-by-document threading a single driver through,
//! playing the same role for one flow's operator chain as a query executor
//! plays for a statement, generalized to a standing push/flush/finish
//! barrier contract rather than a one-shot execution.

use crate::dbs::operator::Operator;
use crate::error::Error;
use crate::value::Value;

/// One document produced at the end of a pipeline: either routed into
/// another named stream via `insert_into(name)`, or a bare value that fell
/// off the end of a pipeline with no sink. The "exactly one sink" shape is
/// honored by convention — the grammar always puts `insert_into` last —
/// but a pipeline missing one simply produces orphaned values rather than
/// erroring, since nothing downstream depends on it.
#[derive(Debug, Clone, PartialEq)]
pub enum Sink {
	Stream(String, Value),
	Orphan(Value),
}

/// An ordered chain of operators. Single-producer/single-consumer: nothing
/// here is shared across flows.
pub struct Pipeline {
	operators: Vec<Operator>,
}

impl Pipeline {
	pub fn new(operators: Vec<Operator>) -> Self {
		Self {
			operators,
		}
	}

	pub fn operator_count(&self) -> usize {
		self.operators.len()
	}

	/// Runs operator `i` on one document. `insert_into` operators are
	/// intercepted here rather than inside `Operator::push`, since routing
	/// into another stream is the pipeline driver's job, not an operator's.
	fn step(&mut self, i: usize, doc: Value, carry: &mut Vec<Value>, sinks: &mut Vec<Sink>) -> Result<(), Error> {
		if let Some(target) = self.operators[i].insert_into_target() {
			sinks.push(Sink::Stream(target.to_string(), doc));
			return Ok(());
		}
		carry.extend(self.operators[i].push(doc)?);
		Ok(())
	}

	/// Pushes one document through every operator in turn. An error at any
	/// stage aborts the remainder of this call; sinks already produced by
	/// documents processed earlier within this same call are not rolled
	/// back.
	pub fn push(&mut self, doc: Value) -> Result<Vec<Sink>, Error> {
		let mut sinks = Vec::new();
		let mut carry = vec![doc];
		for i in 0..self.operators.len() {
			let mut next = Vec::with_capacity(carry.len());
			for d in carry.drain(..) {
				self.step(i, d, &mut next, &mut sinks)?;
			}
			carry = next;
		}
		sinks.extend(carry.into_iter().map(Sink::Orphan));
		Ok(sinks)
	}

	/// Drives a barrier (`flush` or `finish`) through the pipeline.
	/// `drain_stage` extracts one operator's buffered emissions (either
	/// [`Operator::flush`] or [`Operator::finish`]); every stage's emission
	/// is fed through every later stage as an ordinary push before that
	/// later stage's own barrier fires: every emission caused by documents
	/// pushed before the barrier is delivered before the barrier itself
	/// propagates.
	fn barrier(&mut self, drain_stage: impl Fn(&mut Operator) -> Vec<Value>) -> Result<Vec<Sink>, Error> {
		let mut sinks = Vec::new();
		let mut carry: Vec<Value> = Vec::new();
		for i in 0..self.operators.len() {
			let mut next = Vec::with_capacity(carry.len());
			for d in carry.drain(..) {
				self.step(i, d, &mut next, &mut sinks)?;
			}
			next.extend(drain_stage(&mut self.operators[i]));
			carry = next;
		}
		sinks.extend(carry.into_iter().map(Sink::Orphan));
		Ok(sinks)
	}

	/// `flush`: buffered-but-not-yet-due emissions are forced out; operator
	/// state (e.g. open summarize windows) is retained.
	pub fn flush(&mut self) -> Result<Vec<Sink>, Error> {
		self.barrier(Operator::flush)
	}

	/// `finish`: terminal emission, after which every operator releases its
	/// state.
	pub fn finish(&mut self) -> Result<Vec<Sink>, Error> {
		self.barrier(Operator::finish)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dbs::filter::Filter;
	use crate::dbs::insert_into::InsertInto;
	use crate::dbs::select::Select;
	use crate::expr::{BinaryOp, Expr, ObjectEntry, Registry};
	use crate::value::Document;
	use std::sync::Arc;

	fn doc_with_x(x: f64) -> Value {
		let mut d = Document::new();
		d.insert("x", Value::Number(x));
		Value::Object(d)
	}

	#[test]
	fn routes_to_insert_into_sink() {
		let registry = Arc::new(Registry::with_builtins());
		let filter = Operator::Filter(Filter::new(
			Expr::Binary(BinaryOp::Gt, Box::new(Expr::Path(vec!["x".into()])), Box::new(Expr::lit(0.0))),
			Arc::clone(&registry),
		));
		let select = Operator::Select(Select::new(vec![ObjectEntry::SpreadAll], Arc::clone(&registry)));
		let sink = Operator::InsertInto(InsertInto::new("out"));
		let mut pipeline = Pipeline::new(vec![filter, select, sink]);

		let sinks = pipeline.push(doc_with_x(1.0)).unwrap();
		assert_eq!(sinks.len(), 1);
		assert!(matches!(&sinks[0], Sink::Stream(name, _) if name == "out"));

		let sinks = pipeline.push(doc_with_x(-1.0)).unwrap();
		assert!(sinks.is_empty());
	}

	#[test]
	fn pipeline_without_sink_produces_orphans() {
		let registry = Arc::new(Registry::with_builtins());
		let select = Operator::Select(Select::new(vec![ObjectEntry::SpreadAll], registry));
		let mut pipeline = Pipeline::new(vec![select]);
		let sinks = pipeline.push(doc_with_x(1.0)).unwrap();
		assert!(matches!(&sinks[0], Sink::Orphan(_)));
	}

	#[test]
	fn error_at_stage_aborts_remaining_stages() {
		let registry = Arc::new(Registry::with_builtins());
		let bad_map = Operator::Map(crate::dbs::map::Map::new(
			Expr::Call("pow".into(), vec![Expr::lit("a"), Expr::lit("b")]),
			Arc::clone(&registry),
		));
		let sink = Operator::InsertInto(InsertInto::new("out"));
		let mut pipeline = Pipeline::new(vec![bad_map, sink]);
		assert!(pipeline.push(doc_with_x(1.0)).is_err());
	}
}
