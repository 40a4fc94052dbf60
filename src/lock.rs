//! Process-wide exclusion lock for interactive acquisitions.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

const FREE: u64 = 0;

/// Identifier for one acquisition request; never zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(u64);
impl RequestId {
	/// Wraps a non-zero request identifier.
	pub fn new(value: u64) -> Option<Self> {
		(value != FREE).then_some(Self(value))
	}

	/// Raw identifier value.
	pub fn get(self) -> u64 {
		self.0
	}

	/// Builds an id from a monotonically increasing counter, clamping away zero.
	pub(crate) fn from_counter(value: u64) -> Self {
		Self(value.max(1))
	}
}
impl Display for RequestId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}", self.0)
	}
}

/// Single-slot gate ensuring at most one interactive acquisition is in flight.
///
/// Acquisition is one atomic compare-and-swap; a failed attempt returns
/// immediately so callers can surface contention without blocking or delay.
#[derive(Debug, Default)]
pub struct ExclusionLock {
	holder: AtomicU64,
}
impl ExclusionLock {
	/// Creates an unheld lock.
	pub fn new() -> Self {
		Self { holder: AtomicU64::new(FREE) }
	}

	/// Attempts to claim the slot for `request_id`.
	///
	/// Returns a guard that releases the slot on drop, so release is
	/// guaranteed on every exit path including unwinds. Returns `None`
	/// without blocking when another request holds the slot.
	pub fn try_acquire(&self, request_id: RequestId) -> Option<ExclusionGuard<'_>> {
		self.holder
			.compare_exchange(FREE, request_id.get(), Ordering::AcqRel, Ordering::Acquire)
			.ok()
			.map(|_| ExclusionGuard { lock: self, request_id })
	}

	/// Releases the slot if `request_id` currently holds it.
	///
	/// Releasing a slot the caller does not hold is a no-op rather than an
	/// error so a double release can never poison the process.
	pub fn release(&self, request_id: RequestId) {
		let _ = self.holder.compare_exchange(
			request_id.get(),
			FREE,
			Ordering::AcqRel,
			Ordering::Acquire,
		);
	}

	/// Identifier of the current holder, if any.
	pub fn holder(&self) -> Option<RequestId> {
		RequestId::new(self.holder.load(Ordering::Acquire))
	}
}

/// RAII guard returned by [`ExclusionLock::try_acquire`].
#[derive(Debug)]
pub struct ExclusionGuard<'a> {
	lock: &'a ExclusionLock,
	request_id: RequestId,
}
impl ExclusionGuard<'_> {
	/// Identifier the guard was acquired for.
	pub fn request_id(&self) -> RequestId {
		self.request_id
	}
}
impl Drop for ExclusionGuard<'_> {
	fn drop(&mut self) {
		self.lock.release(self.request_id);
	}
}
