//! `sorter`: a bounded reordering buffer for out-of-order time series. An
//! explicit sorted `Vec`-backed buffer rather than a heap crate: `buffer_size`
//! is small and bounded, and emission needs the whole ordered set for
//! time-forced flush, not just the minimum.

use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use crate::error::Error;
use crate::expr::{evaluate, Expr, Registry, Scope};
use crate::value::Value;

struct Held {
	key: Value,
	doc: Value,
	inserted_at: Instant,
}

pub struct Sorter {
	key_fn: Expr,
	registry: Arc<Registry>,
	buffer_size: usize,
	max_latency_ms: u64,
	buffer: Vec<Held>,
	last_emitted_key: Option<Value>,
	dropped: u64,
}

impl Sorter {
	pub fn new(key_fn: Expr, registry: Arc<Registry>, buffer_size: usize, max_latency_ms: u64) -> Self {
		Self {
			key_fn,
			registry,
			buffer_size: buffer_size.max(1),
			max_latency_ms,
			buffer: Vec::new(),
			last_emitted_key: None,
			dropped: 0,
		}
	}

	pub fn dropped(&self) -> u64 {
		self.dropped
	}

	fn key_of(&self, doc: &Value) -> Result<Value, Error> {
		let scope = Scope::new(doc, &self.registry);
		evaluate(&self.key_fn, &scope)
	}

	fn insert_sorted(&mut self, key: Value, doc: Value) {
		let pos = self.buffer.partition_point(|held| held.key.total_cmp(&key).is_le());
		self.buffer.insert(
			pos,
			Held {
				key,
				doc,
				inserted_at: Instant::now(),
			},
		);
	}

	fn emit_smallest(&mut self, out: &mut Vec<Value>) {
		if self.buffer.is_empty() {
			return;
		}
		let held = self.buffer.remove(0);
		self.last_emitted_key = Some(held.key);
		out.push(held.doc);
	}

	pub fn push(&mut self, doc: Value) -> Result<Vec<Value>, Error> {
		let key = self.key_of(&doc)?;
		let is_late = self.last_emitted_key.as_ref().is_some_and(|last| key.total_cmp(last).is_lt())
			|| (self.buffer.len() >= self.buffer_size
				&& self.buffer.first().is_some_and(|held| key.total_cmp(&held.key).is_lt()));
		if is_late {
			self.dropped += 1;
			warn!(dropped_total = self.dropped, "sorter dropped a late record");
			return Ok(Vec::new());
		}
		// Insert first, then evict down to capacity: evicting the buffer's
		// pre-insertion minimum before considering the new arrival could
		// emit a key larger than one this same push is about to hold. The
		// late check above already rejects anything that would sit below
		// the current buffer floor once the buffer is full, so inserting
		// first and evicting the post-insertion minimum keeps emission
		// monotonic regardless of arrival order.
		let mut out = Vec::new();
		self.insert_sorted(key, doc);
		while self.buffer.len() > self.buffer_size {
			self.emit_smallest(&mut out);
		}
		while let Some(oldest) = self.buffer.first() {
			if oldest.inserted_at.elapsed().as_millis() as u64 > self.max_latency_ms {
				self.emit_smallest(&mut out);
			} else {
				break;
			}
		}
		Ok(out)
	}

	/// Drains the buffer in key order, for `flush`/`finish`.
	pub fn drain(&mut self) -> Vec<Value> {
		let mut out = Vec::with_capacity(self.buffer.len());
		while !self.buffer.is_empty() {
			let mut tmp = Vec::new();
			self.emit_smallest(&mut tmp);
			out.extend(tmp);
		}
		out
	}
}
