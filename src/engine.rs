//! Token acquisition engine composing the cache, validator, lock, and collaborators.

pub mod request;

mod interactive;
mod metrics;
mod silent;

pub use metrics::AcquisitionMetrics;
pub use request::*;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::CacheItem,
	broker::{BrokerCryptoEngine, SymmetricKey},
	cache::TokenCache,
	discovery::AuthorityValidator,
	http::HttpTransport,
	lock::{ExclusionLock, RequestId},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	ui::AuthorizationUi,
};

/// Tunables injected into the engine at construction time.
///
/// There is no hidden global configuration: the host application builds one
/// settings value, hands it to the engine, and tears both down at exit.
#[derive(Clone, Debug)]
pub struct EngineSettings {
	/// Window subtracted from `expires_on` when judging access token expiry.
	pub expiration_buffer: Duration,
	/// Per-request network timeout handed to the transport collaborator.
	pub request_timeout: Option<Duration>,
	/// Whether authorities are validated through instance discovery before use.
	pub validate_authority: bool,
	/// URL scheme marking a redirect as broker-originated.
	pub broker_scheme: String,
}
impl Default for EngineSettings {
	fn default() -> Self {
		Self {
			expiration_buffer: Duration::minutes(5),
			request_timeout: Some(Duration::seconds(30)),
			validate_authority: true,
			broker_scheme: "x-broker-auth".into(),
		}
	}
}

/// Terminal result of one acquisition request.
///
/// Every acquisition maps to exactly one of these; callers never receive a
/// partially-populated success. Cancellation is a distinct status, not an
/// error: the user chose to stop, nothing failed.
#[derive(Debug)]
pub enum AcquisitionOutcome {
	/// A usable token was produced; the cache has already been updated.
	Succeeded(Box<CacheItem>),
	/// The user explicitly cancelled the interactive sign-in.
	Cancelled,
	/// The acquisition failed; the error names the decisive step.
	Failed(Error),
}
impl AcquisitionOutcome {
	/// Returns the acquired item, if the outcome is a success.
	pub fn token(&self) -> Option<&CacheItem> {
		match self {
			Self::Succeeded(item) => Some(item),
			_ => None,
		}
	}

	/// Returns `true` for [`AcquisitionOutcome::Cancelled`].
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}

	/// Returns the failure, if the outcome is an error.
	pub fn error(&self) -> Option<&Error> {
		match self {
			Self::Failed(err) => Some(err),
			_ => None,
		}
	}
}
impl From<Error> for AcquisitionOutcome {
	fn from(err: Error) -> Self {
		Self::Failed(err)
	}
}

/// Orchestrates the silent-first, interactive-fallback acquisition flow.
///
/// The engine owns no executor and opens no sockets: network calls go through
/// the [`HttpTransport`] collaborator and sign-in UI through the
/// [`AuthorizationUi`] collaborator, with the engine resuming when their
/// futures complete. Within one request the steps are strictly sequential;
/// across requests the cache and validator tolerate arbitrary interleaving.
pub struct AcquisitionEngine {
	/// Token cache consulted before any network traffic.
	pub cache: Arc<TokenCache>,
	/// Authority validator consulted before exchanges when enabled.
	pub validator: Arc<AuthorityValidator>,
	/// Transport collaborator executing token endpoint exchanges.
	pub transport: Arc<dyn HttpTransport>,
	/// Interactive sign-in collaborator.
	pub ui: Arc<dyn AuthorizationUi>,
	/// Shared counters for acquisition outcomes.
	pub metrics: Arc<AcquisitionMetrics>,
	settings: EngineSettings,
	exclusion: Arc<ExclusionLock>,
	broker_crypto: BrokerCryptoEngine,
	broker_key: Option<SymmetricKey>,
	request_counter: AtomicU64,
}
impl AcquisitionEngine {
	/// Creates an engine over the provided collaborators with default settings.
	pub fn new(
		cache: Arc<TokenCache>,
		validator: Arc<AuthorityValidator>,
		transport: Arc<dyn HttpTransport>,
		ui: Arc<dyn AuthorizationUi>,
	) -> Self {
		Self {
			cache,
			validator,
			transport,
			ui,
			metrics: Default::default(),
			settings: EngineSettings::default(),
			exclusion: Arc::new(ExclusionLock::new()),
			broker_crypto: BrokerCryptoEngine::new(),
			broker_key: None,
			request_counter: AtomicU64::new(0),
		}
	}

	/// Replaces the default settings.
	pub fn with_settings(mut self, settings: EngineSettings) -> Self {
		self.settings = settings;

		self
	}

	/// Shares an exclusion lock with other engines in the same process so the
	/// single-interactive-request guarantee spans all of them.
	pub fn with_exclusion_lock(mut self, lock: Arc<ExclusionLock>) -> Self {
		self.exclusion = lock;

		self
	}

	/// Configures the shared key for broker-mediated flows.
	pub fn with_broker_key(mut self, key: SymmetricKey) -> Self {
		self.broker_key = Some(key);

		self
	}

	/// Engine settings currently in effect.
	pub fn settings(&self) -> &EngineSettings {
		&self.settings
	}

	/// Acquires a token, silently when possible, interactively otherwise.
	pub async fn acquire(&self, request: AcquisitionRequest) -> AcquisitionOutcome {
		self.metrics.record_attempt();

		if let Err(err) = request.validate() {
			self.metrics.record_failure();

			return AcquisitionOutcome::Failed(err);
		}
		if self.settings.validate_authority
			&& let Err(err) =
				self.validator.validate(&request.authority, request.trusted_hint.as_deref()).await
		{
			self.metrics.record_failure();

			return AcquisitionOutcome::Failed(err);
		}

		let silent_error = if request.behavior == AcquisitionBehavior::InteractiveOnly {
			Error::UserInputNeeded
		} else {
			let span = FlowSpan::new(FlowKind::Silent, "acquire");

			obs::record_flow_outcome(FlowKind::Silent, FlowOutcome::Attempt);

			match span.instrument(self.acquire_silently(&request)).await {
				Ok(item) => {
					obs::record_flow_outcome(FlowKind::Silent, FlowOutcome::Success);
					self.metrics.record_success();

					return AcquisitionOutcome::Succeeded(Box::new(item));
				},
				Err(err) => {
					obs::record_flow_outcome(FlowKind::Silent, FlowOutcome::Failure);

					err
				},
			}
		};

		if request.behavior == AcquisitionBehavior::SilentOnly
			|| !eligible_for_interactive(&silent_error)
		{
			self.metrics.record_failure();

			return AcquisitionOutcome::Failed(silent_error);
		}

		let outcome = self.acquire_interactively(&request).await;

		match &outcome {
			AcquisitionOutcome::Succeeded(_) => self.metrics.record_success(),
			AcquisitionOutcome::Cancelled => self.metrics.record_cancellation(),
			AcquisitionOutcome::Failed(_) => self.metrics.record_failure(),
		}

		outcome
	}

	/// Acquires a token without ever presenting UI.
	///
	/// The request's behavior is forced to
	/// [`AcquisitionBehavior::SilentOnly`]; an exhausted silent chain yields
	/// [`Error::UserInputNeeded`].
	pub async fn acquire_silent(&self, request: AcquisitionRequest) -> AcquisitionOutcome {
		self.acquire(request.with_behavior(AcquisitionBehavior::SilentOnly)).await
	}

	pub(crate) fn next_request_id(&self) -> RequestId {
		RequestId::from_counter(self.request_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
	}

	pub(crate) fn exclusion(&self) -> &ExclusionLock {
		&self.exclusion
	}

	pub(crate) fn broker_crypto(&self) -> &BrokerCryptoEngine {
		&self.broker_crypto
	}

	pub(crate) fn broker_key(&self) -> Option<&SymmetricKey> {
		self.broker_key.as_ref()
	}
}
impl Debug for AcquisitionEngine {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AcquisitionEngine")
			.field("settings", &self.settings)
			.field("broker_key_set", &self.broker_key.is_some())
			.finish()
	}
}

/// A silent failure continues into the interactive path only when interaction
/// can plausibly fix it; outages and caller mistakes are surfaced directly.
fn eligible_for_interactive(err: &Error) -> bool {
	match err {
		Error::UserInputNeeded => true,
		Error::Server(server) => server.requires_user_interaction(),
		_ => false,
	}
}
