//! The stream manager: process-wide stream/flow lifecycle, fan-out to
//! subscribers and attached flows, TTL expiry, and flush-barrier
//! propagation.
//!
//! One process-wide table of named, independently-lifecycled entries
//! (`DashMap<String, Arc<..>>`) that concurrent callers create, delete, and
//! look up without a global lock, plus a periodic sweep for TTL-expired
//! entries. `async-channel` carries subscriber fan-out — an unbounded
//! channel per subscriber.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::dbs::flow::{Flow, FlowInfo};
use crate::dbs::pipeline::{Pipeline, Sink};
use crate::dbs::stream::{Stream, StreamInfo};
use crate::error::Error;
use crate::value::Value;

/// Process-wide registry of streams and flows. Not `Clone`: callers share
/// one instance behind `Arc`.
pub struct StreamManager {
	streams: DashMap<String, Arc<Stream>>,
	flows: DashMap<String, Arc<Flow>>,
	subscriptions: DashMap<Uuid, String>,
}

impl Default for StreamManager {
	fn default() -> Self {
		Self::new()
	}
}

impl StreamManager {
	pub fn new() -> Self {
		Self {
			streams: DashMap::new(),
			flows: DashMap::new(),
			subscriptions: DashMap::new(),
		}
	}

	fn get_stream(&self, name: &str) -> Result<Arc<Stream>, Error> {
		self.streams.get(name).map(|entry| Arc::clone(entry.value())).ok_or_else(|| Error::resource(format!("stream `{name}` does not exist")))
	}

	/// `create [or replace] stream NAME [ttl(D)]`. Under `replace`, any
	/// existing stream of the same name is torn down
	/// first (subscribers closed, flows detached) before the new one takes
	/// its place; without `replace`, a name collision fails loudly.
	pub fn create_stream(&self, name: impl Into<String>, replace: bool, ttl_ms: Option<u64>) -> Result<(), Error> {
		let name = name.into();
		if self.streams.contains_key(&name) {
			if !replace {
				return Err(Error::resource(format!("stream `{name}` already exists")));
			}
			if let Some((_, old)) = self.streams.remove(&name) {
				old.close_subscribers();
				for flow in old.attached_flow_list() {
					old.detach_flow(flow.id);
				}
			}
		}
		self.streams.insert(name.clone(), Arc::new(Stream::new(name, ttl_ms)));
		Ok(())
	}

	/// `delete stream NAME`: detaches every attached flow and closes every
	/// subscriber channel. Attached flows are only detached, not deleted,
	/// so `info`/`list flows` can still report them (see DESIGN.md's Open
	/// Question resolution).
	pub fn delete_stream(&self, name: &str) -> Result<(), Error> {
		let (_, stream) = self.streams.remove(name).ok_or_else(|| Error::resource(format!("stream `{name}` does not exist")))?;
		stream.close_subscribers();
		for flow in stream.attached_flow_list() {
			stream.detach_flow(flow.id);
		}
		Ok(())
	}

	/// `create flow NAME [ttl(D)] as <pipeline>`: attaches `pipeline` to
	/// `source`, which must already exist.
	pub fn create_flow(&self, name: impl Into<String>, source: impl Into<String>, ttl_ms: Option<u64>, pipeline: Pipeline, replace: bool) -> Result<(), Error> {
		let name = name.into();
		if self.flows.contains_key(&name) {
			if !replace {
				return Err(Error::resource(format!("flow `{name}` already exists")));
			}
			self.delete_flow(&name)?;
		}
		let source = source.into();
		let stream = self.get_stream(&source)?;
		let flow = Arc::new(Flow::new(name.clone(), source, pipeline, ttl_ms));
		stream.attach(Arc::clone(&flow));
		self.flows.insert(name, flow);
		Ok(())
	}

	/// `delete flow NAME`: detaches it from its source stream (if that
	/// stream still exists) and removes it from the registry entirely.
	pub fn delete_flow(&self, name: &str) -> Result<(), Error> {
		let (_, flow) = self.flows.remove(name).ok_or_else(|| Error::resource(format!("flow `{name}` does not exist")))?;
		if let Some(stream) = self.streams.get(&flow.source) {
			stream.detach_flow(flow.id);
		}
		Ok(())
	}

	/// Routes `docs` into `entry`, then follows every `insert_into` sink any
	/// attached flow produces, breadth-first, until nothing is left to
	/// route. A sink naming a stream that no longer exists faults the flow
	/// that produced it rather than erroring the whole call — one bad
	/// downstream target should not block delivery to the rest of the
	/// fan-out.
	async fn deliver(&self, entry: Arc<Stream>, docs: Vec<Value>) {
		let mut queue: VecDeque<(Arc<Stream>, Value)> = docs.into_iter().map(|doc| (Arc::clone(&entry), doc)).collect();
		while let Some((stream, doc)) = queue.pop_front() {
			for sender in stream.subscriber_list() {
				let _ = sender.try_send(doc.clone());
			}
			for flow in stream.attached_flow_list() {
				if flow.is_faulted().await {
					continue;
				}
				match flow.push(doc.clone()).await {
					Ok(sinks) => {
						for sink in sinks {
							if let Sink::Stream(target, out_doc) = sink {
								match self.streams.get(&target) {
									Some(target_stream) => queue.push_back((Arc::clone(target_stream.value()), out_doc)),
									None => {
										let err = Error::resource(format!("insert_into target stream `{target}` does not exist"));
										flow.mark_faulted(&err).await;
										stream.detach_flow(flow.id);
									}
								}
							}
						}
					}
					Err(err) => {
						flow.mark_faulted(&err).await;
						stream.detach_flow(flow.id);
					}
				}
			}
		}
	}

	/// `insert into NAME <doc_or_array>`: fans `docs` out
	/// to `name`'s subscribers and attached flows, awaiting completion of
	/// all before returning the number of documents accepted at `name`
	/// itself (downstream routing is not reflected in this count).
	pub async fn insert_into_stream(&self, name: &str, docs: Vec<Value>) -> Result<usize, Error> {
		let stream = self.get_stream(name)?;
		let count = docs.len();
		self.deliver(stream, docs).await;
		Ok(count)
	}

	/// `flush NAME`: propagates a flush barrier through every flow directly
	/// attached to `name`. Documents a flush emits into
	/// another stream are delivered as ordinary inserts into that stream —
	/// the barrier itself does not cascade past the first hop, which bounds
	/// termination when flows form a cycle (see DESIGN.md).
	pub async fn flush(&self, name: &str) -> Result<(), Error> {
		let stream = self.get_stream(name)?;
		for flow in stream.attached_flow_list() {
			if flow.is_faulted().await {
				continue;
			}
			match flow.flush().await {
				Ok(sinks) => {
					for sink in sinks {
						if let Sink::Stream(target, doc) = sink {
							match self.streams.get(&target) {
								Some(target_stream) => self.deliver(Arc::clone(target_stream.value()), vec![doc]).await,
								None => {
									let err = Error::resource(format!("insert_into target stream `{target}` does not exist"));
									flow.mark_faulted(&err).await;
									stream.detach_flow(flow.id);
								}
							}
						}
					}
				}
				Err(err) => {
					flow.mark_faulted(&err).await;
					stream.detach_flow(flow.id);
				}
			}
		}
		Ok(())
	}

	/// `subscribe STREAM`: registers an unbounded channel receiving every
	/// document subsequently inserted into `name`.
	pub fn subscribe(&self, name: &str) -> Result<(Uuid, channel::Receiver<Value>), Error> {
		let stream = self.get_stream(name)?;
		let (tx, rx) = channel::unbounded();
		let id = Uuid::new_v4();
		stream.subscribers.insert(id, tx);
		self.subscriptions.insert(id, name.to_string());
		Ok((id, rx))
	}

	/// `unsubscribe ID`: returns whether a live subscription was removed.
	pub fn unsubscribe(&self, id: Uuid) -> bool {
		match self.subscriptions.remove(&id) {
			Some((_, stream_name)) => {
				if let Some(stream) = self.streams.get(&stream_name) {
					stream.subscribers.remove(&id);
				}
				true
			}
			None => false,
		}
	}

	/// Tears down every stream/flow whose TTL has elapsed. Advisory in
	/// cadence (see `DEFAULT_TTL_SWEEP_INTERVAL_MS`) but not in correctness
	/// — a stream/flow past its deadline is always eligible, regardless of
	/// how long it sits unswept.
	pub fn sweep_expired(&self) {
		let now = Instant::now();
		let expired_streams: Vec<String> = self.streams.iter().filter(|entry| entry.value().is_expired(now)).map(|entry| entry.key().clone()).collect();
		for name in expired_streams {
			if self.delete_stream(&name).is_ok() {
				debug!(stream = %name, "stream expired by ttl");
			}
		}
		let expired_flows: Vec<String> = self.flows.iter().filter(|entry| entry.value().is_expired(now)).map(|entry| entry.key().clone()).collect();
		for name in expired_flows {
			if self.delete_flow(&name).is_ok() {
				debug!(flow = %name, "flow expired by ttl");
			}
		}
	}

	pub fn list_streams(&self) -> Vec<StreamInfo> {
		self.streams.iter().map(|entry| entry.value().info()).collect()
	}

	pub async fn list_flows(&self) -> Vec<FlowInfo> {
		let mut out = Vec::with_capacity(self.flows.len());
		for entry in self.flows.iter() {
			out.push(entry.value().info().await);
		}
		out
	}

	pub fn info_stream(&self, name: &str) -> Option<StreamInfo> {
		self.streams.get(name).map(|entry| entry.value().info())
	}

	pub async fn info_flow(&self, name: &str) -> Option<FlowInfo> {
		let flow = self.flows.get(name).map(|entry| Arc::clone(entry.value()))?;
		Some(flow.info().await)
	}

	pub fn stream_exists(&self, name: &str) -> bool {
		self.streams.contains_key(name)
	}

	pub fn flow_exists(&self, name: &str) -> bool {
		self.flows.contains_key(name)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dbs::insert_into::InsertInto;
	use crate::dbs::operator::Operator;
	use crate::value::Document;

	fn doc_with_x(x: f64) -> Value {
		let mut d = Document::new();
		d.insert("x", Value::Number(x));
		Value::Object(d)
	}

	#[tokio::test]
	async fn insert_fans_out_to_subscriber_and_attached_flow() {
		let manager = StreamManager::new();
		manager.create_stream("n", false, None).unwrap();
		manager.create_stream("r", false, None).unwrap();
		let (_, rx) = manager.subscribe("n").unwrap();

		let pipeline = Pipeline::new(vec![Operator::InsertInto(InsertInto::new("r"))]);
		manager.create_flow("f", "n", None, pipeline, false).unwrap();

		manager.insert_into_stream("n", vec![doc_with_x(1.0)]).await.unwrap();

		assert_eq!(rx.try_recv().unwrap(), doc_with_x(1.0));
		let (_, rx_r) = manager.subscribe("r").unwrap();
		manager.insert_into_stream("n", vec![doc_with_x(2.0)]).await.unwrap();
		assert_eq!(rx_r.try_recv().unwrap(), doc_with_x(2.0));
	}

	#[tokio::test]
	async fn insert_into_missing_target_faults_flow_not_caller() {
		let manager = StreamManager::new();
		manager.create_stream("n", false, None).unwrap();
		let pipeline = Pipeline::new(vec![Operator::InsertInto(InsertInto::new("missing"))]);
		manager.create_flow("f", "n", None, pipeline, false).unwrap();

		let result = manager.insert_into_stream("n", vec![doc_with_x(1.0)]).await;
		assert!(result.is_ok());
		let info = manager.info_flow("f").await.unwrap();
		assert!(info.faulted.is_some());
	}

	#[tokio::test]
	async fn delete_stream_detaches_flows_and_closes_subscribers() {
		let manager = StreamManager::new();
		manager.create_stream("n", false, None).unwrap();
		let (_, rx) = manager.subscribe("n").unwrap();
		let pipeline = Pipeline::new(vec![Operator::InsertInto(InsertInto::new("n"))]);
		manager.create_flow("f", "n", None, pipeline, false).unwrap();

		manager.delete_stream("n").unwrap();
		assert!(rx.recv().await.is_err());
		assert!(manager.info_flow("f").await.is_some());
	}

	#[test]
	fn create_stream_without_replace_rejects_duplicate() {
		let manager = StreamManager::new();
		manager.create_stream("n", false, None).unwrap();
		assert!(manager.create_stream("n", false, None).is_err());
		assert!(manager.create_stream("n", true, None).is_ok());
	}

	#[test]
	fn unsubscribe_returns_false_for_unknown_id() {
		let manager = StreamManager::new();
		assert!(!manager.unsubscribe(Uuid::new_v4()));
	}
}
