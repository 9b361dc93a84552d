//! `scan(...)`: a multi-step pattern-matching state machine producing
//! emissions per match.
//!
//! Active matches are held in a plain `Vec` rather than a specialised
//! structure — a small, bounded set of live matches kept in a `Vec<Match>`
//! sorted newest-first by creation order.

use std::sync::Arc;

use ahash::HashMap;
use tracing::trace;

use crate::error::Error;
use crate::expr::{evaluate, Expr, Registry, Scope};
use crate::value::Value;

#[derive(Debug, Clone)]
pub struct Step {
	pub name: String,
	pub optional: bool,
	pub end_when: Option<Expr>,
	pub guard: Expr,
	pub assignments: Vec<(String, Expr)>,
	pub emit: Option<Expr>,
}

struct Match {
	id: u64,
	current_step: usize,
	scopes: HashMap<String, Value>,
}

pub struct Scan {
	steps: Vec<Step>,
	registry: Arc<Registry>,
	match_cap: usize,
	matches: Vec<Match>,
	next_match_id: u64,
}

impl Scan {
	pub fn new(steps: Vec<Step>, registry: Arc<Registry>, match_cap: usize) -> Self {
		Self {
			steps,
			registry,
			match_cap,
			matches: Vec::new(),
			next_match_id: 0,
		}
	}

	fn scope_for<'a>(&'a self, doc: &'a Value, m: &'a Match) -> Scope<'a> {
		Scope::new(doc, &self.registry).with_steps(&m.scopes, m.id)
	}

	/// Runs one active match's current step against `doc`.
	fn try_advance(&mut self, idx: usize, doc: &Value) -> Result<StepOutcome, Error> {
		let step_index = self.matches[idx].current_step;
		let step = self.steps[step_index].clone();

		let guard_passed = {
			let scope = self.scope_for(doc, &self.matches[idx]);
			evaluate(&step.guard, &scope)?.is_truthy()
		};

		if !guard_passed {
			if step.optional {
				self.advance(idx, step_index);
				let completed = self.matches[idx].current_step >= self.steps.len();
				return Ok(StepOutcome::Progressed {
					emitted: None,
					completed,
				});
			}
			if let Some(end_when) = &step.end_when {
				let scope = self.scope_for(doc, &self.matches[idx]);
				if evaluate(end_when, &scope)?.is_truthy() {
					return Ok(StepOutcome::Progressed {
						emitted: None,
						completed: true,
					});
				}
			}
			// Still waiting on this step: the record doesn't advance the
			// match, but the match keeps claiming it so a fresh match
			// doesn't also spring up from the same record.
			return Ok(StepOutcome::Absorbed);
		}

		for (field, expr) in &step.assignments {
			let value = {
				let scope = self.scope_for(doc, &self.matches[idx]);
				evaluate(expr, &scope)?
			};
			let step_scope = self.matches[idx].scopes.entry(step.name.clone()).or_insert_with(|| Value::Object(Default::default()));
			step_scope.safe_set(field, value);
		}

		let emitted = match &step.emit {
			Some(expr) => {
				let scope = self.scope_for(doc, &self.matches[idx]);
				Some(evaluate(expr, &scope)?)
			}
			None => None,
		};

		self.advance(idx, step_index);
		let completed = self.matches[idx].current_step >= self.steps.len();
		Ok(StepOutcome::Progressed { emitted, completed })
	}

	/// Moves a match past `step_index`, or marks it complete (caller
	/// removes it) if that was the last declared step — except for a
	/// single-step pattern, which has no "next" step to progress into and
	/// is instead treated as a standing accumulator that keeps re-running
	/// its one step on every future record (see DESIGN.md).
	fn advance(&mut self, idx: usize, step_index: usize) {
		if step_index + 1 < self.steps.len() {
			self.matches[idx].current_step = step_index + 1;
		} else if self.steps.len() > 1 {
			self.matches[idx].current_step = self.steps.len();
		}
	}

	/// Newest match first. Each active match is tried in turn against the
	/// record: a match that only *absorbs* it (guard failed, not `optional`,
	/// no firing `end_when`) still claims the record — so a fresh match
	/// doesn't spring up alongside one that's merely waiting — but doesn't
	/// stop older matches from also getting a turn. The first match that
	/// actually *progresses* (guard passed, or an `optional` skip) wins the
	/// tie-break and ends the record's evaluation there: no new match starts
	/// from step one, unless that progression also completed the match, in
	/// which case the record is free again and a new match is tried against
	/// it too — this is what lets the record that closes one session also
	/// open the next one.
	pub fn push(&mut self, doc: Value) -> Result<Vec<Value>, Error> {
		let mut out = Vec::new();
		let mut start_new_match = true;

		let mut i = self.matches.len();
		while i > 0 {
			i -= 1;
			match self.try_advance(i, &doc)? {
				StepOutcome::Progressed { emitted, completed } => {
					if let Some(v) = emitted {
						out.push(v);
					}
					if completed {
						trace!(match_id = self.matches[i].id, "scan match completed");
						self.matches.remove(i);
					}
					start_new_match = completed;
					break;
				}
				StepOutcome::Absorbed => {
					start_new_match = false;
				}
			}
		}

		if start_new_match && !self.steps.is_empty() && self.matches.len() < self.match_cap {
			let m = Match {
				id: self.next_match_id,
				current_step: 0,
				scopes: HashMap::default(),
			};
			self.next_match_id += 1;
			let idx = self.matches.len();
			self.matches.push(m);
			match self.try_advance(idx, &doc)? {
				StepOutcome::Progressed { emitted, completed } => {
					if let Some(v) = emitted {
						out.push(v);
					}
					if completed {
						self.matches.remove(idx);
					}
				}
				StepOutcome::Absorbed => {
					// First step's guard didn't pass: no match started.
					self.matches.remove(idx);
				}
			}
		}

		Ok(out)
	}
}

/// Outcome of running one active match's current step against a record.
enum StepOutcome {
	/// The step's guard passed (or it was skipped via `optional`). `emitted`
	/// is the step's emitted document, if any; `completed` is true if this
	/// was the match's last step (or its `end_when` fired), so the match is
	/// now discarded.
	Progressed { emitted: Option<Value>, completed: bool },
	/// The guard failed and the match stays put at the same step, claiming
	/// the record without progressing or emitting.
	Absorbed,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::expr::{BinaryOp, ObjectEntry};
	use crate::value::Document;

	fn registry() -> Arc<Registry> {
		Arc::new(Registry::with_builtins())
	}

	fn doc_with_x(x: f64) -> Value {
		let mut doc = Document::new();
		doc.insert("x", Value::Number(x));
		Value::Object(doc)
	}

	#[test]
	fn cumulative_scan_accumulates_across_matches() {
		// step sum: true => sum.total = (sum.total || 0) + x, emit({input: x, cumulative: sum.total})
		let steps = vec![Step {
			name: "sum".into(),
			optional: false,
			end_when: None,
			guard: Expr::lit(true),
			assignments: vec![(
				"total".into(),
				Expr::Binary(
					BinaryOp::Add,
					Box::new(Expr::Binary(
						BinaryOp::Coalesce,
						Box::new(Expr::Path(vec!["sum".into(), "total".into()])),
						Box::new(Expr::lit(0.0)),
					)),
					Box::new(Expr::Path(vec!["x".into()])),
				),
			)],
			emit: Some(Expr::Object(vec![
				ObjectEntry::Field {
					name: "input".into(),
					expr: Arc::new(Expr::Path(vec!["x".into()])),
				},
				ObjectEntry::Field {
					name: "cumulative".into(),
					expr: Arc::new(Expr::Path(vec!["sum".into(), "total".into()])),
				},
			])),
		}];
		let mut scan = Scan::new(steps, registry(), 10_000);
		let mut cumulative = Vec::new();
		for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
			let out = scan.push(doc_with_x(x)).unwrap();
			cumulative.extend(out.iter().map(|v| v.safe_get("cumulative").as_f64().unwrap()));
		}
		assert_eq!(cumulative, vec![1.0, 3.0, 6.0, 10.0, 15.0]);
	}

	#[test]
	fn match_ids_are_unique_and_monotonic() {
		// Two steps, both guards unconditionally true, only the last emits.
		// The first record only ever starts a match (nothing to close yet);
		// every record after that both completes the active match and
		// reopens a fresh one from the same record, so ids climb one per
		// record from the second record on.
		let steps = vec![
			Step {
				name: "a".into(),
				optional: false,
				end_when: None,
				guard: Expr::lit(true),
				assignments: Vec::new(),
				emit: None,
			},
			Step {
				name: "b".into(),
				optional: false,
				end_when: None,
				guard: Expr::lit(true),
				assignments: Vec::new(),
				emit: Some(Expr::Path(vec!["state".into(), "match_id".into()])),
			},
		];
		let mut scan = Scan::new(steps, registry(), 10_000);
		let mut ids = Vec::new();
		for x in [1.0, 2.0, 3.0, 4.0] {
			let out = scan.push(doc_with_x(x)).unwrap();
			ids.extend(out.iter().map(|v| v.as_f64().unwrap() as u64));
		}
		assert_eq!(ids, vec![0, 1, 2]);
	}
}
