//! Window policies and emit triggers.
//!
//! Both are modelled the same way: small, cheap-to-clone state machines that
//! `crate::dbs::summarize::Summarize` drives per group. Enum dispatch rather
//! than trait objects, since these are a closed, fixed set of variants —
//! neither needs the pluggable-by-name shape `expr::Aggregation` does,
//! because parsing only ever produces one of a fixed grammar of
//! window/trigger calls.

use crate::expr::{evaluate, Expr, Registry, Scope};
use crate::value::Value;

/// How a group's membership is bounded and when it closes.
#[derive(Clone, Debug)]
pub enum Window {
	/// `tumbling_window(n)`: fixed-size, non-overlapping, record-count based.
	Tumbling {
		size: u64,
	},
	/// `hopping_window(size, hop)`: fixed-size, overlapping windows that
	/// advance by `hop` records at a time.
	Hopping {
		size: u64,
		hop: u64,
	},
	/// `sliding_window(size)`: the most recent `size` records, re-evaluated
	/// on every push.
	Sliding {
		size: u64,
	},
	/// `count_window(n)`: alias form of a tumbling window keyed purely on
	/// count, kept distinct since the grammar names it separately.
	Count {
		size: u64,
	},
	/// `session_window(gap_field, gap)`: a new window opens whenever the gap
	/// between consecutive records (read from `gap_field`) in the group
	/// exceeds `gap`.
	Session {
		gap_field: String,
		gap: f64,
	},
	/// `*_by(field, size, [hop])`: value-based variants of the above, keyed
	/// on a field's numeric value instead of record count.
	TumblingBy {
		field: String,
		size: f64,
	},
	HoppingBy {
		field: String,
		size: f64,
		hop: f64,
	},
}

/// Per-group running state for a [`Window`]. Constructed fresh whenever a
/// brand new group key is first seen.
#[derive(Clone, Debug, Default)]
pub struct WindowState {
	count: u64,
	/// First record's field value, for `*_by` windows; also doubles as the
	/// session window's last-seen field value.
	anchor: Option<f64>,
}

/// What a window decides to do with the incoming record, from the
/// perspective of the group it belongs to.
pub enum WindowDecision {
	/// The record is accumulated into the current window.
	Accumulate,
	/// The current window is closed (emit its aggregation) before this
	/// record starts a brand new one; the record itself starts the new
	/// window.
	CloseThenStart,
	/// The current window closes and this record is accumulated into it
	/// (used by hopping windows when an overlap boundary is crossed without
	/// a hard reset).
	Close,
}

impl WindowState {
	/// The field value a `*_by`/session window last anchored on, if any.
	/// Used by `crate::dbs::summarize::Summarize` to detect late records
	/// against a group's own watermark before folding a value in.
	pub fn anchor(&self) -> Option<f64> {
		self.anchor
	}
}

impl Window {
	pub fn new_state(&self) -> WindowState {
		WindowState::default()
	}

	/// Size of the bounded, evicting window this variant maintains, if any.
	/// `Sliding`/`Hopping` keep only the most recent `size` contributions
	/// alive — `crate::dbs::summarize::Summarize` uses this to evict stale
	/// contributions from a group instead of wholesale-resetting it on
	/// close, the way `Tumbling`/`Count`/`Session`/`*_by` do.
	pub fn eviction_size(&self) -> Option<u64> {
		match self {
			Window::Sliding { size } => Some(*size),
			Window::Hopping { size, .. } => Some(*size),
			_ => None,
		}
	}

	/// Feeds one more record into `state`, returning how the owning group
	/// should react. `state` is updated in place to reflect the record
	/// having been observed, regardless of the decision returned.
	pub fn observe(&self, state: &mut WindowState, record: &Value) -> WindowDecision {
		match self {
			Window::Tumbling {
				size,
			}
			| Window::Count {
				size,
			} => {
				state.count += 1;
				if state.count >= *size {
					state.count = 0;
					WindowDecision::Close
				} else {
					WindowDecision::Accumulate
				}
			}
			Window::Hopping {
				size,
				hop,
			} => {
				state.count += 1;
				if state.count >= *size {
					state.count = state.count.saturating_sub((*hop).max(1));
					WindowDecision::Close
				} else {
					WindowDecision::Accumulate
				}
			}
			Window::Sliding {
				..
			} => WindowDecision::Accumulate,
			Window::Session {
				gap_field,
				gap,
			} => {
				let current = record.safe_get(gap_field).as_f64();
				let decision = match (state.anchor, current) {
					(Some(prev), Some(now)) if now - prev > *gap => WindowDecision::CloseThenStart,
					_ => WindowDecision::Accumulate,
				};
				state.anchor = current.or(state.anchor);
				decision
			}
			Window::TumblingBy {
				field,
				size,
			} => {
				let current = record.safe_get(field).as_f64();
				match (state.anchor, current) {
					(None, Some(now)) => {
						state.anchor = Some(now);
						WindowDecision::Accumulate
					}
					(Some(anchor), Some(now)) if now - anchor >= *size => {
						state.anchor = Some(now);
						WindowDecision::Close
					}
					_ => WindowDecision::Accumulate,
				}
			}
			Window::HoppingBy {
				field,
				size,
				hop,
			} => {
				let current = record.safe_get(field).as_f64();
				match (state.anchor, current) {
					(None, Some(now)) => {
						state.anchor = Some(now);
						WindowDecision::Accumulate
					}
					(Some(anchor), Some(now)) if now - anchor >= *size => {
						state.anchor = Some(anchor + hop);
						WindowDecision::Close
					}
					_ => WindowDecision::Accumulate,
				}
			}
		}
	}
}

/// Drives *when* a group's current aggregation is emitted, independent of
/// whether its window has closed — emit triggers layer on top of, and in
/// addition to, the implicit at-window-close emission.
#[derive(Clone, Debug)]
pub enum EmitTrigger {
	/// Implicit default: only emit when the window itself closes.
	OnWindowClose,
	/// `emit_every(n)`: emit every `n` records observed by the group.
	Every {
		n: u64,
	},
	/// `emit_on_change(field)`: emit whenever `field`'s value differs from
	/// its value on the previous record in this group.
	OnChange {
		field: String,
	},
	/// `emit_on_group_change()`: emit whenever a record lands in a
	/// different group than the previous record seen by the operator.
	OnGroupChange,
	/// `emit_on_update()`: emit on every record (continuous re-emission).
	OnUpdate,
	/// `emit_when(predicate)`: emit whenever `predicate`, evaluated against
	/// the current record, is truthy.
	When(Expr),
}

#[derive(Clone, Debug, Default)]
pub struct EmitState {
	count: u64,
	last_value: Option<Value>,
}

impl EmitTrigger {
	pub fn new_state(&self) -> EmitState {
		EmitState::default()
	}

	/// Whether the group should emit its current aggregation after
	/// observing `record`, independent of the window's own close decision.
	pub fn should_emit(&self, state: &mut EmitState, record: &Value, registry: &Registry) -> Result<bool, crate::error::Error> {
		Ok(match self {
			EmitTrigger::OnWindowClose => false,
			EmitTrigger::Every {
				n,
			} => {
				state.count += 1;
				if state.count >= *n {
					state.count = 0;
					true
				} else {
					false
				}
			}
			EmitTrigger::OnChange {
				field,
			} => {
				let current = record.safe_get(field);
				let changed = state.last_value.as_ref().map(|prev| prev != &current).unwrap_or(false);
				state.last_value = Some(current);
				changed
			}
			EmitTrigger::OnGroupChange => false,
			EmitTrigger::OnUpdate => true,
			EmitTrigger::When(predicate) => {
				let scope = Scope::new(record, registry);
				evaluate(predicate, &scope)?.is_truthy()
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value::Document;

	#[test]
	fn tumbling_closes_every_n_records() {
		let window = Window::Tumbling {
			size: 2,
		};
		let mut state = window.new_state();
		let record = Value::Object(Document::new());
		assert!(matches!(window.observe(&mut state, &record), WindowDecision::Accumulate));
		assert!(matches!(window.observe(&mut state, &record), WindowDecision::Close));
		assert!(matches!(window.observe(&mut state, &record), WindowDecision::Accumulate));
	}

	#[test]
	fn session_window_closes_on_large_gap() {
		let window = Window::Session {
			gap_field: "t".to_string(),
			gap: 5.0,
		};
		let mut state = window.new_state();
		let mut doc = Document::new();
		doc.insert("t", Value::Number(0.0));
		let first = Value::Object(doc);
		assert!(matches!(window.observe(&mut state, &first), WindowDecision::Accumulate));

		let mut doc2 = Document::new();
		doc2.insert("t", Value::Number(10.0));
		let second = Value::Object(doc2);
		assert!(matches!(window.observe(&mut state, &second), WindowDecision::CloseThenStart));
	}

	#[test]
	fn emit_every_fires_on_nth_record() {
		let registry = Registry::with_builtins();
		let trigger = EmitTrigger::Every {
			n: 3,
		};
		let mut state = trigger.new_state();
		let record = Value::Object(Document::new());
		assert!(!trigger.should_emit(&mut state, &record, &registry).unwrap());
		assert!(!trigger.should_emit(&mut state, &record, &registry).unwrap());
		assert!(trigger.should_emit(&mut state, &record, &registry).unwrap());
	}

	#[test]
	fn emit_when_evaluates_predicate_against_record() {
		let registry = Registry::with_builtins();
		let trigger = EmitTrigger::When(Expr::Binary(
			crate::expr::BinaryOp::Gt,
			Box::new(Expr::Path(vec!["x".into()])),
			Box::new(Expr::lit(1.0)),
		));
		let mut state = trigger.new_state();
		let mut low = Document::new();
		low.insert("x", Value::Number(0.0));
		assert!(!trigger.should_emit(&mut state, &Value::Object(low), &registry).unwrap());
		let mut high = Document::new();
		high.insert("x", Value::Number(5.0));
		assert!(trigger.should_emit(&mut state, &Value::Object(high), &registry).unwrap());
	}
}
