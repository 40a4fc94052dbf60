//! Authority validation backed by cached instance discovery.
//!
//! Validation results, accepted and explicitly rejected hosts alike, are
//! cached for the process lifetime so repeated calls for the same host never
//! re-hit the network. Transient transport failures are *not* cached; only an
//! explicit rejection from the discovery endpoint poisons a host.

// std
use std::collections::BTreeSet;
// self
use crate::{
	_prelude::*,
	auth::Authority,
	error::TransientError,
	http::{HttpRequest, HttpTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Successfully validated authority with its discovery metadata.
#[derive(Clone, Debug)]
pub struct ValidatedAuthority {
	/// The authority that was validated.
	pub authority: Authority,
	/// Tenant discovery endpoint advertised by the instance metadata.
	pub tenant_discovery_endpoint: Option<Url>,
}

/// Cached validation verdict for one authority host.
///
/// Records live until [`AuthorityValidator::clear`]; callers must not assume
/// any expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorityRecord {
	/// Lowercased authority host the record describes.
	pub host: String,
	/// Whether the host passed instance discovery.
	pub validated: bool,
	/// Alias hosts advertised alongside this one.
	pub aliases: BTreeSet<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
	tenant_discovery_endpoint: Option<String>,
	#[serde(default)]
	metadata: Vec<DiscoveryMetadata>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryMetadata {
	#[serde(default)]
	aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoveryErrorBody {
	error: String,
	error_description: Option<String>,
}

/// Validates authority hosts against a trusted instance discovery endpoint.
pub struct AuthorityValidator {
	transport: Arc<dyn HttpTransport>,
	trusted_host: String,
	records: RwLock<HashMap<String, AuthorityRecord>>,
	probes: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
	timeout: Option<Duration>,
}
impl AuthorityValidator {
	/// Creates a validator that probes through `trusted_host`.
	pub fn new(transport: Arc<dyn HttpTransport>, trusted_host: impl Into<String>) -> Self {
		Self {
			transport,
			trusted_host: trusted_host.into(),
			records: RwLock::new(HashMap::new()),
			probes: Mutex::new(HashMap::new()),
			timeout: None,
		}
	}

	/// Overrides the per-probe network timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Validates `authority`, consulting the record cache first.
	///
	/// `trusted_hint` overrides the validator's default trusted host for this
	/// call, used when the caller already knows which cloud instance the
	/// authority belongs to. Concurrent validations of the same host coalesce
	/// onto a single in-flight probe.
	pub async fn validate(
		&self,
		authority: &Authority,
		trusted_hint: Option<&str>,
	) -> Result<ValidatedAuthority> {
		let span = FlowSpan::new(FlowKind::Discovery, "validate");

		obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let host = authority.host().to_owned();

				if let Some(verdict) = self.cached_verdict(authority, &host) {
					return verdict;
				}

				let guard = self.probe_guard(&host);
				let _inflight = guard.lock().await;

				// A concurrent probe may have resolved the host while this
				// call waited on the guard.
				if let Some(verdict) = self.cached_verdict(authority, &host) {
					return verdict;
				}

				self.probe(authority, &host, trusted_hint).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Failure),
		}

		result
	}

	/// Validates a non-directory authority by probing its federation metadata.
	///
	/// Authorities that are not part of the directory's instance map (e.g.
	/// on-premises federation servers) cannot be confirmed by instance
	/// discovery; instead the authority itself must serve a federation
	/// metadata document. Verdicts are cached exactly like discovery verdicts.
	pub async fn validate_federated(&self, authority: &Authority) -> Result<ValidatedAuthority> {
		let span = FlowSpan::new(FlowKind::Discovery, "validate_federated");

		obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let host = authority.host().to_owned();

				if let Some(verdict) = self.cached_verdict(authority, &host) {
					return verdict;
				}

				let guard = self.probe_guard(&host);
				let _inflight = guard.lock().await;

				if let Some(verdict) = self.cached_verdict(authority, &host) {
					return verdict;
				}

				let url = authority.federation_metadata_url()?;
				let response =
					self.transport.execute(HttpRequest::get(url), self.timeout).await?;

				if response.is_success() {
					self.store_validated(&host, &BTreeSet::new());

					return Ok(ValidatedAuthority {
						authority: authority.clone(),
						tenant_discovery_endpoint: None,
					});
				}
				if (400..500).contains(&response.status) {
					self.store_rejected(&host);

					return Err(Error::AuthorityValidationFailed {
						authority: authority.as_str().into(),
						reason: format!(
							"federation metadata probe was refused with HTTP {}",
							response.status
						),
					});
				}

				Err(TransientError::Discovery {
					message: "Federation metadata endpoint is unavailable".into(),
					status: Some(response.status),
				}
				.into())
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(FlowKind::Discovery, FlowOutcome::Failure),
		}

		result
	}

	/// Returns the cached record for `host`, if any.
	pub fn record(&self, host: &str) -> Option<AuthorityRecord> {
		self.records.read().get(&host.to_ascii_lowercase()).cloned()
	}

	/// Empties the record cache; the only way records are destroyed.
	pub fn clear(&self) {
		self.records.write().clear();
	}

	fn cached_verdict(
		&self,
		authority: &Authority,
		host: &str,
	) -> Option<Result<ValidatedAuthority>> {
		let records = self.records.read();
		let record = records.get(host)?;

		if record.validated {
			Some(Ok(ValidatedAuthority {
				authority: authority.clone(),
				tenant_discovery_endpoint: None,
			}))
		} else {
			Some(Err(Error::AuthorityValidationFailed {
				authority: authority.as_str().into(),
				reason: "host was previously rejected by instance discovery".into(),
			}))
		}
	}

	fn probe_guard(&self, host: &str) -> Arc<AsyncMutex<()>> {
		let mut probes = self.probes.lock();

		probes.entry(host.to_owned()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
	}

	async fn probe(
		&self,
		authority: &Authority,
		host: &str,
		trusted_hint: Option<&str>,
	) -> Result<ValidatedAuthority> {
		let trusted_host = trusted_hint.unwrap_or(&self.trusted_host);
		let url = authority.instance_discovery_url(trusted_host)?;
		let response = self.transport.execute(HttpRequest::get(url), self.timeout).await?;

		if response.is_success() {
			let discovery: DiscoveryResponse = serde_json::from_slice(&response.body)
				.map_err(|e| TransientError::Discovery {
					message: format!("Malformed discovery document: {e}"),
					status: Some(response.status),
				})?;

			if let Some(endpoint) = discovery.tenant_discovery_endpoint {
				let endpoint = Url::parse(&endpoint).ok();
				let aliases: BTreeSet<String> = discovery
					.metadata
					.iter()
					.filter(|entry| entry.aliases.iter().any(|alias| alias == host))
					.flat_map(|entry| entry.aliases.iter().cloned())
					.collect();

				self.store_validated(host, &aliases);

				return Ok(ValidatedAuthority {
					authority: authority.clone(),
					tenant_discovery_endpoint: endpoint,
				});
			}
		}

		// Explicit rejection bodies are cached; anything else is transient.
		if let Ok(error) = serde_json::from_slice::<DiscoveryErrorBody>(&response.body) {
			self.store_rejected(host);

			return Err(Error::AuthorityValidationFailed {
				authority: authority.as_str().into(),
				reason: error
					.error_description
					.unwrap_or(error.error),
			});
		}

		Err(TransientError::Discovery {
			message: "Discovery endpoint returned neither metadata nor a rejection".into(),
			status: Some(response.status),
		}
		.into())
	}

	fn store_validated(&self, host: &str, aliases: &BTreeSet<String>) {
		let mut records = self.records.write();
		let mut hosts = aliases.clone();

		hosts.insert(host.to_owned());

		for alias in &hosts {
			records.insert(
				alias.to_ascii_lowercase(),
				AuthorityRecord {
					host: alias.to_ascii_lowercase(),
					validated: true,
					aliases: hosts.clone(),
				},
			);
		}
	}

	fn store_rejected(&self, host: &str) {
		self.records.write().insert(
			host.to_owned(),
			AuthorityRecord { host: host.to_owned(), validated: false, aliases: BTreeSet::new() },
		);
	}
}
impl Debug for AuthorityValidator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorityValidator")
			.field("trusted_host", &self.trusted_host)
			.field("records", &self.records.read().len())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::http::{HttpResponse, TransportFuture};

	struct CannedTransport {
		status: u16,
		body: &'static str,
		calls: Mutex<usize>,
	}
	impl CannedTransport {
		fn new(status: u16, body: &'static str) -> Arc<Self> {
			Arc::new(Self { status, body, calls: Mutex::new(0) })
		}

		fn calls(&self) -> usize {
			*self.calls.lock()
		}
	}
	impl HttpTransport for CannedTransport {
		fn execute(
			&self,
			_request: HttpRequest,
			_timeout: Option<Duration>,
		) -> TransportFuture<'_, HttpResponse> {
			*self.calls.lock() += 1;

			let status = self.status;
			let body = self.body.as_bytes().to_vec();

			Box::pin(async move { Ok(HttpResponse { status, headers: Vec::new(), body }) })
		}
	}

	fn authority() -> Authority {
		Authority::new("https://login.example.com/tenant")
			.expect("Authority fixture should be valid.")
	}

	#[tokio::test]
	async fn validation_caches_the_success_verdict() {
		let transport = CannedTransport::new(
			200,
			r#"{
				"tenant_discovery_endpoint": "https://login.example.com/tenant/.well-known/openid-configuration",
				"metadata": [{"aliases": ["login.example.com", "sts.example.com"]}]
			}"#,
		);
		let validator = AuthorityValidator::new(transport.clone(), "discovery.example.com");

		validator
			.validate(&authority(), None)
			.await
			.expect("First validation should succeed.");
		validator
			.validate(&authority(), None)
			.await
			.expect("Second validation should be served from cache.");

		assert_eq!(transport.calls(), 1, "Cached host must not re-hit the network.");

		let record = validator
			.record("login.example.com")
			.expect("Validated record should be cached.");

		assert!(record.validated);
		assert!(record.aliases.contains("sts.example.com"));
		assert!(
			validator.record("sts.example.com").is_some(),
			"Alias hosts should validate without another probe."
		);
	}

	#[tokio::test]
	async fn explicit_rejection_is_cached() {
		let transport = CannedTransport::new(
			400,
			r#"{"error":"invalid_instance","error_description":"Unknown authority host."}"#,
		);
		let validator = AuthorityValidator::new(transport.clone(), "discovery.example.com");

		let first = validator
			.validate(&authority(), None)
			.await
			.expect_err("Rejected host must fail validation.");
		let second = validator
			.validate(&authority(), None)
			.await
			.expect_err("Cached rejection must also fail.");

		assert!(matches!(first, Error::AuthorityValidationFailed { .. }));
		assert!(matches!(second, Error::AuthorityValidationFailed { .. }));
		assert_eq!(transport.calls(), 1, "Cached rejection must not re-hit the network.");
	}

	#[tokio::test]
	async fn transient_failures_are_not_cached() {
		let transport = CannedTransport::new(503, "Service Unavailable");
		let validator = AuthorityValidator::new(transport.clone(), "discovery.example.com");

		let first = validator
			.validate(&authority(), None)
			.await
			.expect_err("Outage must fail validation.");

		assert!(matches!(first, Error::Transient(_)));

		let _second = validator.validate(&authority(), None).await;

		assert_eq!(transport.calls(), 2, "Transient failures must not poison the cache.");
	}

	#[tokio::test]
	async fn federated_validation_caches_both_verdicts() {
		let accepted = CannedTransport::new(200, "<EntityDescriptor/>");
		let validator = AuthorityValidator::new(accepted.clone(), "discovery.example.com");

		validator
			.validate_federated(&authority())
			.await
			.expect("Reachable federation metadata should validate the authority.");
		validator
			.validate_federated(&authority())
			.await
			.expect("The cached verdict should satisfy the second call.");

		assert_eq!(accepted.calls(), 1);

		let refused = CannedTransport::new(404, "not found");
		let validator = AuthorityValidator::new(refused.clone(), "discovery.example.com");
		let err = validator
			.validate_federated(&authority())
			.await
			.expect_err("A refused probe must fail validation.");

		assert!(matches!(err, Error::AuthorityValidationFailed { .. }));

		let _cached = validator.validate_federated(&authority()).await;

		assert_eq!(refused.calls(), 1, "A cached rejection must not re-hit the network.");
	}

	#[tokio::test]
	async fn clear_discards_cached_records() {
		let transport = CannedTransport::new(
			200,
			r#"{"tenant_discovery_endpoint": "https://login.example.com/x"}"#,
		);
		let validator = AuthorityValidator::new(transport.clone(), "discovery.example.com");

		validator.validate(&authority(), None).await.expect("Validation should succeed.");
		validator.clear();

		assert!(validator.record("login.example.com").is_none());

		validator.validate(&authority(), None).await.expect("Revalidation should succeed.");

		assert_eq!(transport.calls(), 2);
	}
}
