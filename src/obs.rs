//! Optional observability helpers for acquisition flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `directory_auth.flow` with the `flow`
//!   (acquisition step) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `directory_auth_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Acquisition flow steps observed by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Whole silent acquisition chain.
	Silent,
	/// Per-client refresh token exchange.
	Refresh,
	/// Family refresh token fallback exchange.
	FamilyRefresh,
	/// Interactive authorization + code exchange.
	Interactive,
	/// Broker redirect decryption and exchange.
	BrokerExchange,
	/// Authority instance discovery.
	Discovery,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Silent => "silent",
			FlowKind::Refresh => "refresh",
			FlowKind::FamilyRefresh => "family_refresh",
			FlowKind::Interactive => "interactive",
			FlowKind::BrokerExchange => "broker_exchange",
			FlowKind::Discovery => "discovery",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to an engine step.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
