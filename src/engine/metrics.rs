// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for acquisition outcomes.
#[derive(Debug, Default)]
pub struct AcquisitionMetrics {
	attempts: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	cancellations: AtomicU64,
	cache_hits: AtomicU64,
	refresh_exchanges: AtomicU64,
	family_exchanges: AtomicU64,
	interactive_prompts: AtomicU64,
}
impl AcquisitionMetrics {
	/// Total acquisition attempts.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Acquisitions that produced a token.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Acquisitions that terminated with a failure.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Acquisitions ended by explicit user cancellation.
	pub fn cancellations(&self) -> u64 {
		self.cancellations.load(Ordering::Relaxed)
	}

	/// Silent acquisitions satisfied directly from the cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Per-client refresh token exchanges attempted.
	pub fn refresh_exchanges(&self) -> u64 {
		self.refresh_exchanges.load(Ordering::Relaxed)
	}

	/// Family refresh token exchanges attempted.
	pub fn family_exchanges(&self) -> u64 {
		self.family_exchanges.load(Ordering::Relaxed)
	}

	/// Interactive prompts presented to the user.
	pub fn interactive_prompts(&self) -> u64 {
		self.interactive_prompts.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.successes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cancellation(&self) {
		self.cancellations.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_exchange(&self) {
		self.refresh_exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_family_exchange(&self) {
		self.family_exchanges.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_interactive_prompt(&self) {
		self.interactive_prompts.fetch_add(1, Ordering::Relaxed);
	}
}
