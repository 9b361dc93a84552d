//! `summarize { ... } by ... over window = ... emit ...`: grouped
//! aggregation with configurable windowing and emission.
//!
//! Groups are keyed in a `BTreeMap` for deterministic iteration
//! (`BTreeMap<Vec<Value>, GroupState>`, ordered by `Value`'s own total
//! order) rather than a hash map, so two runs over the same input emit
//! groups in the same order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::warn;

use crate::error::Error;
use crate::expr::{evaluate, Expr, Registry, Scope};
use crate::value::{Document, Value};
use crate::window::{EmitState, EmitTrigger, Window, WindowDecision, WindowState};

struct GroupState {
	aggregations: Vec<Box<dyn crate::expr::Aggregation>>,
	window_state: WindowState,
	emit_state: EmitState,
	/// Set whenever a contribution lands in this group, cleared once `flush`
	/// has snapshotted it — `flush` immediately followed by `flush` with no
	/// intervening `push` must produce no additional output.
	dirty: bool,
	/// Raw per-projection argument values still inside the window, oldest
	/// first. Only populated for `Window::eviction_size` variants (`Sliding`/
	/// `Hopping`), which evict stale contributions rather than resetting
	/// wholesale on close — `Aggregation` has no "retract" operation, so
	/// eviction works by resetting and replaying the surviving values.
	buffer: VecDeque<Vec<Value>>,
}

/// Materializes `{ ...group_key, field: aggregation.result(), ... }`. A free
/// function (not a method) so it can be called while `group` is already held
/// via a mutable borrow of `Summarize::groups`.
fn build_snapshot(by: &[String], projections: &[(String, String, Expr)], key: &[Value], group: &GroupState) -> Value {
	let mut out = Document::new();
	for (field, value) in by.iter().zip(key) {
		out.insert(field.clone(), value.clone());
	}
	for ((field, _, _), agg) in projections.iter().zip(&group.aggregations) {
		out.insert(field.clone(), agg.result());
	}
	Value::Object(out)
}

/// Closes a group's current window. `eviction_size` is `Some` for the
/// `Sliding`/`Hopping` windows, which evict stale contributions gradually as
/// new ones arrive (see `Summarize::push_contributions`) rather than
/// wholesale on close — for those, the aggregation state and buffer are left
/// untouched here, and only the dirty flag is cleared. Every other window
/// resets its aggregations to empty.
fn reset_group(group: &mut GroupState, eviction_size: Option<u64>) {
	if eviction_size.is_none() {
		for agg in &mut group.aggregations {
			agg.reset();
		}
	}
	group.dirty = false;
}

pub struct Summarize {
	by: Vec<String>,
	/// `(output_field, aggregation_name, argument)`, e.g. `("total", "sum",
	/// Expr::Path(["amount"]))` for `total: sum(amount)`.
	projections: Vec<(String, String, Expr)>,
	window: Window,
	emit: EmitTrigger,
	registry: Arc<Registry>,
	groups: BTreeMap<Vec<Value>, GroupState>,
	last_group_key: Option<Vec<Value>>,
	dropped: u64,
}

impl Summarize {
	pub fn new(by: Vec<String>, projections: Vec<(String, Expr)>, window: Window, emit: EmitTrigger, registry: Arc<Registry>) -> Result<Self, Error> {
		let mut resolved = Vec::with_capacity(projections.len());
		for (field, expr) in projections {
			let (name, args) = expr
				.as_aggregate_call()
				.ok_or_else(|| Error::bind(format!("projection `{field}` is not an aggregation call")))?;
			let arg = args.first().cloned().unwrap_or(Expr::lit(crate::expr::Literal::Null));
			resolved.push((field, name.to_string(), arg));
		}
		Ok(Self {
			by,
			projections: resolved,
			window,
			emit,
			registry,
			groups: BTreeMap::new(),
			last_group_key: None,
			dropped: 0,
		})
	}

	pub fn dropped(&self) -> u64 {
		self.dropped
	}

	fn group_key(&self, doc: &Value) -> Vec<Value> {
		self.by.iter().map(|field| doc.safe_get(field)).collect()
	}

	fn new_group(&self) -> GroupState {
		GroupState {
			aggregations: self.projections.iter().map(|(_, name, _)| self.registry.create_aggregate(name).expect("bound at validate time")).collect(),
			window_state: self.window.new_state(),
			emit_state: self.emit.new_state(),
			dirty: false,
			buffer: VecDeque::new(),
		}
	}

	/// The field this group's window watermark is keyed on, for the variants
	/// where a record can arrive "late" relative to a group's own anchor.
	fn watermark_field(&self, doc: &Value) -> Option<f64> {
		match &self.window {
			Window::TumblingBy {
				field,
				..
			}
			| Window::HoppingBy {
				field,
				..
			} => doc.safe_get(field).as_f64(),
			Window::Session {
				gap_field,
				..
			} => doc.safe_get(gap_field).as_f64(),
			_ => None,
		}
	}

	pub fn push(&mut self, doc: Value) -> Result<Vec<Value>, Error> {
		let key = self.group_key(&doc);

		if let Some(current) = self.watermark_field(&doc) {
			if let Some(existing) = self.groups.get(&key) {
				if existing.window_state.anchor().is_some_and(|anchor| current < anchor) {
					self.dropped += 1;
					warn!(dropped_total = self.dropped, group = ?key, "summarize dropped a late record");
					return Ok(Vec::new());
				}
			}
		}

		let mut out = Vec::new();

		if matches!(self.emit, EmitTrigger::OnGroupChange) {
			if let Some(prev) = &self.last_group_key {
				if prev != &key {
					if let Some(group) = self.groups.get(prev) {
						out.push(build_snapshot(&self.by, &self.projections, prev, group));
					}
				}
			}
		}
		self.last_group_key = Some(key.clone());

		if !self.groups.contains_key(&key) {
			let fresh = self.new_group();
			self.groups.insert(key.clone(), fresh);
		}
		let decision = {
			let group = self.groups.get_mut(&key).expect("just inserted");
			self.window.observe(&mut group.window_state, &doc)
		};

		match decision {
			WindowDecision::Accumulate => {
				self.push_contributions(&key, &doc)?;
			}
			WindowDecision::Close => {
				self.push_contributions(&key, &doc)?;
				let group = self.groups.get_mut(&key).expect("present");
				out.push(build_snapshot(&self.by, &self.projections, &key, group));
				reset_group(group, self.window.eviction_size());
			}
			WindowDecision::CloseThenStart => {
				{
					let group = self.groups.get_mut(&key).expect("present");
					out.push(build_snapshot(&self.by, &self.projections, &key, group));
					reset_group(group, self.window.eviction_size());
				}
				self.push_contributions(&key, &doc)?;
			}
		}

		if !matches!(self.emit, EmitTrigger::OnGroupChange | EmitTrigger::OnWindowClose) {
			let should_emit = {
				let group = self.groups.get_mut(&key).expect("present");
				self.emit.should_emit(&mut group.emit_state, &doc, &self.registry)?
			};
			if should_emit {
				let group = self.groups.get(&key).expect("present");
				out.push(build_snapshot(&self.by, &self.projections, &key, group));
			}
		}

		Ok(out)
	}

	/// Evaluates this record's projection arguments and folds them into the
	/// group's aggregations. For `Sliding`/`Hopping` windows the values are
	/// also pushed onto the group's bounded buffer, which is then replayed
	/// from scratch into freshly reset aggregations — evicting whatever fell
	/// off the front — since `Aggregation` only supports push/reset, not
	/// retracting a single prior contribution.
	fn push_contributions(&mut self, key: &[Value], doc: &Value) -> Result<(), Error> {
		let registry = Arc::clone(&self.registry);
		let scope = Scope::new(doc, &registry);
		let mut values = Vec::with_capacity(self.projections.len());
		for (_, _, arg) in &self.projections {
			values.push(evaluate(arg, &scope)?);
		}

		let group = self.groups.get_mut(key).expect("present");
		match self.window.eviction_size() {
			Some(size) => {
				group.buffer.push_back(values);
				while group.buffer.len() as u64 > size {
					group.buffer.pop_front();
				}
				for agg in &mut group.aggregations {
					agg.reset();
				}
				for entry in &group.buffer {
					for (agg, value) in group.aggregations.iter_mut().zip(entry) {
						agg.push(value.clone());
					}
				}
			}
			None => {
				for (value, agg) in values.into_iter().zip(&mut group.aggregations) {
					agg.push(value);
				}
			}
		}
		group.dirty = true;
		Ok(())
	}

	/// Emits every group that has accumulated a contribution since its last
	/// flush, and retains state — flush is a checkpoint, not a terminal.
	/// Groups untouched since the previous flush are skipped, so a flush
	/// immediately followed by another with no intervening push emits
	/// nothing.
	pub fn flush(&mut self) -> Vec<Value> {
		let by = &self.by;
		let projections = &self.projections;
		let out: Vec<Value> = self.groups.iter().filter(|(_, group)| group.dirty).map(|(key, group)| build_snapshot(by, projections, key, group)).collect();
		for group in self.groups.values_mut() {
			group.dirty = false;
		}
		out
	}

	/// Emits every open group then discards all state.
	pub fn finish(&mut self) -> Vec<Value> {
		let out = self.flush();
		self.groups.clear();
		self.last_group_key = None;
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn registry() -> Arc<Registry> {
		Arc::new(Registry::with_builtins())
	}

	fn doc(product: &str, amount: f64) -> Value {
		let mut d = Document::new();
		d.insert("product", Value::String(product.into()));
		d.insert("amount", Value::Number(amount));
		Value::Object(d)
	}

	#[test]
	fn tumbling_by_count_closes_every_n_and_conserves_totals() {
		let projections = vec![
			("total".to_string(), Expr::Call("sum".into(), vec![Expr::Path(vec!["amount".into()])])),
			("cnt".to_string(), Expr::Call("count".into(), vec![])),
		];
		let mut summarize = Summarize::new(
			vec!["product".to_string()],
			projections,
			Window::Tumbling {
				size: 2,
			},
			EmitTrigger::OnWindowClose,
			registry(),
		)
		.unwrap();

		let inputs = [("laptop", 10.0), ("mouse", 5.0), ("laptop", 20.0), ("keyboard", 15.0)];
		let mut emitted = Vec::new();
		for (product, amount) in inputs {
			emitted.extend(summarize.push(doc(product, amount)).unwrap());
		}
		emitted.extend(summarize.finish());

		let total_sum: f64 = emitted.iter().map(|v| v.safe_get("total").as_f64().unwrap_or(0.0)).sum();
		let total_cnt: f64 = emitted.iter().map(|v| v.safe_get("cnt").as_f64().unwrap_or(0.0)).sum();
		assert_eq!(total_sum, 50.0);
		assert_eq!(total_cnt, 4.0);
	}

	#[test]
	fn flush_retains_state_but_is_idempotent_with_no_intervening_push() {
		let projections = vec![("total".to_string(), Expr::Call("sum".into(), vec![Expr::Path(vec!["amount".into()])]))];
		let mut summarize = Summarize::new(
			vec!["product".to_string()],
			projections,
			Window::Sliding {
				size: 100,
			},
			EmitTrigger::OnWindowClose,
			registry(),
		)
		.unwrap();
		summarize.push(doc("laptop", 10.0)).unwrap();
		summarize.push(doc("laptop", 5.0)).unwrap();
		let first_flush = summarize.flush();
		assert_eq!(first_flush[0].safe_get("total"), Value::Number(15.0));

		// No intervening push: a second flush must emit nothing, even though
		// the group's aggregation state (and thus its running total) is
		// still intact underneath.
		let second_flush = summarize.flush();
		assert!(second_flush.is_empty());

		summarize.push(doc("laptop", 1.0)).unwrap();
		let third_flush = summarize.flush();
		assert_eq!(third_flush[0].safe_get("total"), Value::Number(16.0));
	}

	#[test]
	fn sliding_window_evicts_beyond_size() {
		let projections = vec![("total".to_string(), Expr::Call("sum".into(), vec![Expr::Path(vec!["amount".into()])]))];
		let mut summarize = Summarize::new(
			vec!["product".to_string()],
			projections,
			Window::Sliding {
				size: 2,
			},
			EmitTrigger::OnUpdate,
			registry(),
		)
		.unwrap();

		let first = summarize.push(doc("laptop", 10.0)).unwrap();
		assert_eq!(first[0].safe_get("total"), Value::Number(10.0));
		let second = summarize.push(doc("laptop", 5.0)).unwrap();
		assert_eq!(second[0].safe_get("total"), Value::Number(15.0));
		// A third record pushes the window past its size-2 bound: the first
		// contribution (10.0) must be evicted, not merely ignored.
		let third = summarize.push(doc("laptop", 1.0)).unwrap();
		assert_eq!(third[0].safe_get("total"), Value::Number(6.0));
	}

	#[test]
	fn hopping_window_evicts_stale_contributions_without_full_reset() {
		let projections = vec![("total".to_string(), Expr::Call("sum".into(), vec![Expr::Path(vec!["amount".into()])]))];
		let mut summarize = Summarize::new(
			Vec::new(),
			projections,
			Window::Hopping {
				size: 3,
				hop: 1,
			},
			EmitTrigger::OnWindowClose,
			registry(),
		)
		.unwrap();

		// Fills the first window of 3 and closes it: 1+2+3 = 6.
		summarize.push(doc("x", 1.0)).unwrap();
		summarize.push(doc("x", 2.0)).unwrap();
		let closed = summarize.push(doc("x", 3.0)).unwrap();
		assert_eq!(closed[0].safe_get("total"), Value::Number(6.0));

		// The window hops by 1: the next close should reflect only the most
		// recent 3 contributions (2, 3, 4), not a fresh reset to just 4.
		let hopped = summarize.push(doc("x", 4.0)).unwrap();
		assert_eq!(hopped[0].safe_get("total"), Value::Number(9.0));
	}

	#[test]
	fn session_window_drops_late_record_after_close() {
		let projections = vec![("cnt".to_string(), Expr::Call("count".into(), vec![]))];
		let mut summarize = Summarize::new(
			Vec::new(),
			projections,
			Window::Session {
				gap_field: "t".into(),
				gap: 5.0,
			},
			EmitTrigger::OnWindowClose,
			registry(),
		)
		.unwrap();
		let mut at = |t: f64| {
			let mut d = Document::new();
			d.insert("t", Value::Number(t));
			Value::Object(d)
		};
		summarize.push(at(0.0)).unwrap();
		summarize.push(at(10.0)).unwrap(); // gap > 5, closes and starts a new window anchored at 10
		let out = summarize.push(at(2.0)).unwrap(); // late relative to the new anchor
		assert!(out.is_empty());
		assert_eq!(summarize.dropped(), 1);
	}
}
