//! A tagged variant `{Filter | Map | Select | Scan | Summarize | Sorter |
//! InsertInto}` with uniform push/flush/finish dispatch, rather than a deep
//! trait-object hierarchy — enum dispatch for a fixed, small variant set.

use crate::error::Error;
use crate::value::Value;

use super::filter::Filter;
use super::insert_into::InsertInto;
use super::map::Map;
use super::scan::Scan;
use super::select::Select;
use super::sorter::Sorter;
use super::summarize::Summarize;

pub enum Operator {
	Filter(Filter),
	Map(Map),
	Select(Select),
	Scan(Scan),
	Summarize(Summarize),
	Sorter(Sorter),
	InsertInto(InsertInto),
}

impl Operator {
	/// Runs one document through this operator, returning zero or more
	/// documents to forward downstream.
	pub fn push(&mut self, doc: Value) -> Result<Vec<Value>, Error> {
		match self {
			Operator::Filter(op) => op.push(doc),
			Operator::Map(op) => op.push(doc),
			Operator::Select(op) => op.push(doc),
			Operator::Scan(op) => op.push(doc),
			Operator::Summarize(op) => op.push(doc),
			Operator::Sorter(op) => op.push(doc),
			// InsertInto has no local state to push through; the pipeline
			// driver is the one that actually routes the document into the
			// target stream (see `crate::dbs::pipeline::Pipeline::push`).
			Operator::InsertInto(_) => Ok(vec![doc]),
		}
	}

	/// Signals a flush barrier: buffered-but-not-yet-due emissions are
	/// forced out, state is otherwise retained.
	pub fn flush(&mut self) -> Vec<Value> {
		match self {
			Operator::Sorter(op) => op.drain(),
			Operator::Summarize(op) => op.flush(),
			// Filter/Map/Select/Scan/InsertInto hold no buffered state that
			// a flush barrier needs to force out.
			_ => Vec::new(),
		}
	}

	/// Terminal signal: emit then release state.
	pub fn finish(&mut self) -> Vec<Value> {
		match self {
			Operator::Sorter(op) => op.drain(),
			Operator::Summarize(op) => op.finish(),
			_ => Vec::new(),
		}
	}

	/// The target stream name, for an `insert_into` sink; `None` for every
	/// other operator kind.
	pub fn insert_into_target(&self) -> Option<&str> {
		match self {
			Operator::InsertInto(op) => Some(op.target()),
			_ => None,
		}
	}
}
