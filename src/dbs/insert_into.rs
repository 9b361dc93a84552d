//! `insert_into(name)`: a sink operator. It holds no
//! state beyond its target stream name — actually forwarding a document
//! into that stream is `crate::dbs::pipeline::Pipeline`'s job, since doing
//! so means re-entering the stream manager's fan-out (see
//! `crate::dbs::manager::StreamManager::insert_into_stream`), not something
//! a single operator can do in isolation.

#[derive(Clone, Debug)]
pub struct InsertInto {
	target: String,
}

impl InsertInto {
	pub fn new(target: impl Into<String>) -> Self {
		Self {
			target: target.into(),
		}
	}

	pub fn target(&self) -> &str {
		&self.target
	}
}
