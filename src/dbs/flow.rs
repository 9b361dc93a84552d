//! A named, standing pipeline attached to a source stream. A `Flow` owns
//! its `Pipeline` behind a `tokio::sync::Mutex` since the manager may push
//! into several flows attached to the same stream concurrently, and drives
//! faulting: a flow whose pipeline errors is marked faulted and detached,
//! but kept around for `info`/`list`.
//!
//! A standing, independently-faultable background task. `tokio::sync::Mutex`
//! (not `std::sync::Mutex`) because pipeline stages themselves do not
//! await, but the manager holds the lock across a critical section that
//! must still cooperate with the rest of the async runtime.

use std::sync::Mutex as SyncMutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::dbs::pipeline::{Pipeline, Sink};
use crate::error::Error;
use crate::value::Value;

pub struct Flow {
	pub id: Uuid,
	pub name: String,
	pub source: String,
	pub created_at: DateTime<Utc>,
	pipeline: Mutex<Pipeline>,
	faulted: Mutex<Option<String>>,
	ttl_deadline: SyncMutex<Option<Instant>>,
}

#[derive(Debug, Clone)]
pub struct FlowInfo {
	pub name: String,
	pub source: String,
	pub created_at: DateTime<Utc>,
	pub faulted: Option<String>,
	pub operator_count: usize,
	pub ttl_remaining_ms: Option<u64>,
}

impl Flow {
	pub fn new(name: String, source: String, pipeline: Pipeline, ttl_ms: Option<u64>) -> Self {
		Self {
			id: Uuid::new_v4(),
			name,
			source,
			created_at: Utc::now(),
			pipeline: Mutex::new(pipeline),
			faulted: Mutex::new(None),
			ttl_deadline: SyncMutex::new(ttl_ms.map(|ms| Instant::now() + std::time::Duration::from_millis(ms))),
		}
	}

	pub(crate) fn is_expired(&self, now: Instant) -> bool {
		self.ttl_deadline.lock().unwrap().is_some_and(|deadline| now >= deadline)
	}

	fn ttl_remaining_ms(&self) -> Option<u64> {
		let deadline = (*self.ttl_deadline.lock().unwrap())?;
		Some(deadline.saturating_duration_since(Instant::now()).as_millis() as u64)
	}

	pub async fn push(&self, doc: Value) -> Result<Vec<Sink>, Error> {
		self.pipeline.lock().await.push(doc)
	}

	pub async fn flush(&self) -> Result<Vec<Sink>, Error> {
		self.pipeline.lock().await.flush()
	}

	pub async fn finish(&self) -> Result<Vec<Sink>, Error> {
		self.pipeline.lock().await.finish()
	}

	/// Records the error that faulted this flow: a faulted flow stops
	/// receiving documents but its diagnostic stays queryable via `info`.
	pub async fn mark_faulted(&self, err: &Error) {
		*self.faulted.lock().await = Some(err.to_string());
	}

	pub async fn is_faulted(&self) -> bool {
		self.faulted.lock().await.is_some()
	}

	pub async fn info(&self) -> FlowInfo {
		let operator_count = self.pipeline.lock().await.operator_count();
		FlowInfo {
			name: self.name.clone(),
			source: self.source.clone(),
			created_at: self.created_at,
			faulted: self.faulted.lock().await.clone(),
			operator_count,
			ttl_remaining_ms: self.ttl_remaining_ms(),
		}
	}
}
