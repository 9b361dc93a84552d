//! The operator pipeline and stream-manager layer: the runtime half of the
//! engine that the query transpiler (`crate::syn`) is bound against — the
//! glue between parsed statements and executed state (see `crate::engine`
//! for the binder).

pub mod filter;
pub mod flow;
pub mod insert_into;
pub mod manager;
pub mod map;
pub mod operator;
pub mod pipeline;
pub mod scan;
pub mod select;
pub mod sorter;
pub mod stream;
pub mod summarize;

pub use filter::Filter;
pub use flow::{Flow, FlowInfo};
pub use insert_into::InsertInto;
pub use manager::StreamManager;
pub use map::Map;
pub use operator::Operator;
pub use pipeline::{Pipeline, Sink};
pub use scan::Scan;
pub use select::Select;
pub use sorter::Sorter;
pub use stream::{Stream, StreamInfo};
pub use summarize::Summarize;
