//! Engine-wide tunables.
//!
//! Collects the engine's runtime constants into one plain struct rather
//! than scattering magic numbers through `crate::dbs`. No environment-
//! variable indirection, since nothing here needs to be reconfigured
//! without a process restart.

/// Default bound on [`crate::dbs::sorter::Sorter`]'s reorder buffer when a
/// query doesn't specify one explicitly.
pub const DEFAULT_SORTER_BUFFER_SIZE: usize = 1024;

/// Upper bound on concurrently open `scan` matches per operator instance,
/// guarding against unbounded memory growth from a pattern that never
/// reaches its end step.
pub const DEFAULT_SCAN_MATCH_CAP: usize = 10_000;

/// How often, in milliseconds, a caller should be expected to invoke
/// [`crate::dbs::manager::StreamManager::sweep_expired`] to enforce flow and
/// stream TTLs. Purely advisory: TTL correctness does not depend on this
/// cadence, only its user-visible latency does.
pub const DEFAULT_TTL_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Tunables threaded through engine construction. Every field has a default
/// matching the constants above; callers override only what they need to.
#[derive(Debug, Clone)]
pub struct EngineConfig {
	pub sorter_buffer_size: usize,
	pub scan_match_cap: usize,
	pub ttl_sweep_interval_ms: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			sorter_buffer_size: DEFAULT_SORTER_BUFFER_SIZE,
			scan_match_cap: DEFAULT_SCAN_MATCH_CAP,
			ttl_sweep_interval_ms: DEFAULT_TTL_SWEEP_INTERVAL_MS,
		}
	}
}
