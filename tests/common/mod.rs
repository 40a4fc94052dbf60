//! Shared fixtures and mock collaborators for the integration suites.

#![allow(dead_code)]

// std
use std::sync::{Arc, Mutex};
// crates.io
use httpmock::MockServer;
use time::{Duration, OffsetDateTime};
// self
use directory_auth::url::Url;
use directory_auth::{
	auth::{Authority, CacheItem, CacheKey, UserInfo},
	cache::TokenCache,
	discovery::AuthorityValidator,
	engine::{AcquisitionEngine, EngineSettings},
	http::ReqwestTransport,
	ui::{AuthorizationOutcome, AuthorizationUi, UiFuture},
};

pub const CLIENT_ID: &str = "client-under-test";
pub const RESOURCE: &str = "https://graph.example.com";
pub const USER: &str = "ada@example.com";

/// UI collaborator that replays scripted outcomes without rendering anything.
pub struct ScriptedUi {
	outcomes: Mutex<Vec<ScriptedOutcome>>,
	invocations: Mutex<usize>,
}

/// One scripted reply, resolved against the actual start URL when needed.
pub enum ScriptedOutcome {
	/// Echo the state from the start URL back with this authorization code.
	Code(String),
	/// Return this exact redirect URL (used for broker responses).
	Redirect(Url),
	/// Report explicit user cancellation.
	Cancelled,
	/// Report a collaborator failure.
	Failed(String),
	/// Sleep before cancelling, to hold the exclusion lock in concurrency tests.
	HoldThenCancel(std::time::Duration),
}
impl ScriptedUi {
	pub fn new(outcomes: impl IntoIterator<Item = ScriptedOutcome>) -> Arc<Self> {
		Arc::new(Self {
			outcomes: Mutex::new(outcomes.into_iter().collect()),
			invocations: Mutex::new(0),
		})
	}

	pub fn invocations(&self) -> usize {
		*self.invocations.lock().expect("Invocation counter mutex should not be poisoned.")
	}
}
impl AuthorizationUi for ScriptedUi {
	fn start_authorization(&self, start_url: Url, redirect_uri: Url) -> UiFuture<'_> {
		*self.invocations.lock().expect("Invocation counter mutex should not be poisoned.") += 1;

		let next = {
			let mut outcomes =
				self.outcomes.lock().expect("Outcome queue mutex should not be poisoned.");

			if outcomes.is_empty() { None } else { Some(outcomes.remove(0)) }
		};

		Box::pin(async move {
			match next {
				None => AuthorizationOutcome::Failed {
					code: "scripted_ui_exhausted".into(),
					description: Some("No scripted outcome remains.".into()),
				},
				Some(ScriptedOutcome::Code(code)) => {
					let state = start_url
						.query_pairs()
						.find(|(name, _)| name == "state")
						.map(|(_, value)| value.into_owned())
						.unwrap_or_default();
					let mut redirect = redirect_uri;

					redirect
						.query_pairs_mut()
						.append_pair("code", &code)
						.append_pair("state", &state);

					AuthorizationOutcome::Redirect(redirect)
				},
				Some(ScriptedOutcome::Redirect(url)) => AuthorizationOutcome::Redirect(url),
				Some(ScriptedOutcome::Cancelled) => AuthorizationOutcome::Cancelled,
				Some(ScriptedOutcome::Failed(code)) =>
					AuthorizationOutcome::Failed { code, description: None },
				Some(ScriptedOutcome::HoldThenCancel(delay)) => {
					tokio::time::sleep(delay).await;

					AuthorizationOutcome::Cancelled
				},
			}
		})
	}
}

/// Authority pointing at the mock server's `/tenant` path.
pub fn mock_authority(server: &MockServer) -> Authority {
	Authority::new(server.url("/tenant"))
		.expect("Loopback mock authority should be accepted.")
}

/// Engine wired to the mock server with authority validation disabled.
pub fn build_engine(ui: Arc<ScriptedUi>) -> (AcquisitionEngine, Arc<TokenCache>) {
	let cache = Arc::new(TokenCache::new());
	let transport = Arc::new(ReqwestTransport::default());
	let validator = Arc::new(AuthorityValidator::new(transport.clone(), "localhost"));
	let settings = EngineSettings { validate_authority: false, ..Default::default() };
	let engine =
		AcquisitionEngine::new(cache.clone(), validator, transport, ui).with_settings(settings);

	(engine, cache)
}

pub fn exact_key(authority: &Authority) -> CacheKey {
	CacheKey::new(authority.clone(), Some(RESOURCE), CLIENT_ID)
}

/// Seeds an access token item for the exact resource key.
pub fn seed_access_token(
	cache: &TokenCache,
	authority: &Authority,
	access: &str,
	refresh: Option<&str>,
	expires_in: Duration,
) {
	let mut builder = CacheItem::builder(exact_key(authority), UserInfo::new(USER, true))
		.access_token(access)
		.access_token_type("Bearer")
		.expires_on(OffsetDateTime::now_utc() + expires_in);

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	cache
		.add_or_update(builder.build().expect("Access token fixture should build successfully."))
		.expect("Seeding the access token should succeed.");
}

/// Seeds a multi-resource refresh token for the client.
pub fn seed_mrrt(cache: &TokenCache, authority: &Authority, refresh: &str) {
	let item = CacheItem::builder(exact_key(authority).mrrt_key(), UserInfo::new(USER, true))
		.refresh_token(refresh)
		.build()
		.expect("MRRT fixture should build successfully.");

	cache.add_or_update(item).expect("Seeding the MRRT should succeed.");
}

/// Seeds a family refresh token for the user.
pub fn seed_frt(cache: &TokenCache, authority: &Authority, refresh: &str, family_id: &str) {
	let item = CacheItem::builder(
		exact_key(authority).family_key(family_id),
		UserInfo::new(USER, true),
	)
	.refresh_token(refresh)
	.family_id(family_id)
	.build()
	.expect("FRT fixture should build successfully.");

	cache.add_or_update(item).expect("Seeding the FRT should succeed.");
}

/// Standard success body for token endpoint mocks.
pub fn token_success_body(access: &str, refresh: Option<&str>, family_id: Option<&str>) -> String {
	let mut body = format!(
		r#"{{"access_token":"{access}","token_type":"Bearer","expires_in":3600,"resource":"{RESOURCE}""#
	);

	if let Some(refresh) = refresh {
		body.push_str(&format!(r#","refresh_token":"{refresh}""#));
	}
	if let Some(family_id) = family_id {
		body.push_str(&format!(r#","foci":"{family_id}""#));
	}

	body.push('}');
	body
}
