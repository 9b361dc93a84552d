//! Named, process-unique streams: subscriber fan-out and flow attachment.
//! A `Stream` holds no operator state of its own — that lives in the
//! `Flow`s attached to it — it is purely the fan-out point documents are
//! routed through.
//!
//! A process-wide, concurrently-registered table entry (`Uuid`-keyed,
//! `chrono` timestamped). Crates: `dashmap` for the subscriber/attached-flow
//! tables (many concurrent API callers may subscribe/unsubscribe or attach
//! flows while the single engine task is mid-push), `uuid` for subscription
//! ids addressed outside their owning table's key, `chrono` for the
//! wall-clock `created_at` surfaced by `info`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::dbs::flow::Flow;
use crate::value::Value;
use std::sync::{Arc, Mutex};

pub struct Stream {
	pub name: String,
	pub created_at: DateTime<Utc>,
	pub(crate) subscribers: DashMap<Uuid, channel::Sender<Value>>,
	pub(crate) attached_flows: DashMap<Uuid, Arc<Flow>>,
	ttl_deadline: Mutex<Option<Instant>>,
}

/// Read-only snapshot of a stream's state, for `info`/`list` statements.
#[derive(Debug, Clone)]
pub struct StreamInfo {
	pub name: String,
	pub created_at: DateTime<Utc>,
	pub subscriber_count: usize,
	pub attached_flow_count: usize,
	pub ttl_remaining_ms: Option<u64>,
}

impl Stream {
	pub fn new(name: String, ttl_ms: Option<u64>) -> Self {
		Self {
			name,
			created_at: Utc::now(),
			subscribers: DashMap::new(),
			attached_flows: DashMap::new(),
			ttl_deadline: Mutex::new(ttl_ms.map(|ms| Instant::now() + std::time::Duration::from_millis(ms))),
		}
	}

	pub(crate) fn attach(&self, flow: Arc<Flow>) {
		self.attached_flows.insert(flow.id, flow);
	}

	pub(crate) fn detach_flow(&self, id: Uuid) {
		self.attached_flows.remove(&id);
	}

	pub(crate) fn attached_flow_list(&self) -> Vec<Arc<Flow>> {
		self.attached_flows.iter().map(|e| Arc::clone(e.value())).collect()
	}

	pub(crate) fn subscriber_list(&self) -> Vec<channel::Sender<Value>> {
		self.subscribers.iter().map(|e| e.value().clone()).collect()
	}

	/// Destroys all subscriber channels: each receiver observes the sender
	/// drop on its next `recv`, which the channel crate surfaces as a closed
	/// channel — the end-of-stream notification subscribers expect when a
	/// stream is deleted.
	pub(crate) fn close_subscribers(&self) {
		self.subscribers.clear();
	}

	pub(crate) fn is_expired(&self, now: Instant) -> bool {
		self.ttl_deadline.lock().unwrap().is_some_and(|deadline| now >= deadline)
	}

	fn ttl_remaining_ms(&self) -> Option<u64> {
		let deadline = (*self.ttl_deadline.lock().unwrap())?;
		Some(deadline.saturating_duration_since(Instant::now()).as_millis() as u64)
	}

	pub fn info(&self) -> StreamInfo {
		StreamInfo {
			name: self.name.clone(),
			created_at: self.created_at,
			subscriber_count: self.subscribers.len(),
			attached_flow_count: self.attached_flows.len(),
			ttl_remaining_ms: self.ttl_remaining_ms(),
		}
	}
}
