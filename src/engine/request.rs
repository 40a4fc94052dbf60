//! Acquisition request parameters and entry-point validation.

// self
use crate::{
	_prelude::*,
	auth::{Authority, CacheKey, UserInfo},
	error::ArgumentError,
};

/// How far the engine may go to obtain a token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AcquisitionBehavior {
	/// Silent first, interactive fallback when the silent chain is exhausted.
	#[default]
	Auto,
	/// Never present UI; an exhausted silent chain is a terminal failure.
	SilentOnly,
	/// Skip the cache and refresh tokens entirely and prompt immediately.
	InteractiveOnly,
}

/// Parameters for one token acquisition.
#[derive(Clone, Debug)]
pub struct AcquisitionRequest {
	/// Authority to request tokens from.
	pub authority: Authority,
	/// Resource the token should grant access to.
	pub resource: String,
	/// OAuth client identifier of the calling application.
	pub client_id: String,
	/// Redirect URI for interactive flows.
	pub redirect_uri: Option<Url>,
	/// User the credential must belong to; `None` permits any single user.
	pub user_id: Option<String>,
	/// Sign-in hint forwarded to the authorize endpoint.
	pub login_hint: Option<String>,
	/// Claims challenge forwarded verbatim to the authority.
	pub claims: Option<String>,
	/// Trusted discovery host override for authority validation.
	pub trusted_hint: Option<String>,
	/// How far the engine may go to obtain the token.
	pub behavior: AcquisitionBehavior,
}
impl AcquisitionRequest {
	/// Creates a request for the provided authority/resource/client triple.
	pub fn new(
		authority: Authority,
		resource: impl Into<String>,
		client_id: impl Into<String>,
	) -> Self {
		Self {
			authority,
			resource: resource.into(),
			client_id: client_id.into(),
			redirect_uri: None,
			user_id: None,
			login_hint: None,
			claims: None,
			trusted_hint: None,
			behavior: AcquisitionBehavior::default(),
		}
	}

	/// Sets the redirect URI used by interactive flows.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Restricts the acquisition to credentials of the provided user.
	pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());

		self
	}

	/// Sets the sign-in hint shown by the authorize endpoint.
	pub fn with_login_hint(mut self, login_hint: impl Into<String>) -> Self {
		self.login_hint = Some(login_hint.into());

		self
	}

	/// Forwards a claims challenge to the authority.
	pub fn with_claims(mut self, claims: impl Into<String>) -> Self {
		self.claims = Some(claims.into());

		self
	}

	/// Overrides the trusted discovery host for authority validation.
	pub fn with_trusted_hint(mut self, trusted_hint: impl Into<String>) -> Self {
		self.trusted_hint = Some(trusted_hint.into());

		self
	}

	/// Overrides the acquisition behavior.
	pub fn with_behavior(mut self, behavior: AcquisitionBehavior) -> Self {
		self.behavior = behavior;

		self
	}

	/// Validates the request before any I/O is attempted.
	pub fn validate(&self) -> Result<()> {
		if self.client_id.trim().is_empty() {
			return Err(ArgumentError::Empty { name: "client_id" }.into());
		}
		if self.resource.trim().is_empty() {
			return Err(ArgumentError::Empty { name: "resource" }.into());
		}
		if let Some(user_id) = &self.user_id
			&& user_id.trim().is_empty()
		{
			return Err(ArgumentError::Empty { name: "user_id" }.into());
		}

		Ok(())
	}

	/// Cache key addressed by this request.
	pub fn cache_key(&self) -> CacheKey {
		CacheKey::new(self.authority.clone(), Some(self.resource.clone()), &self.client_id)
	}

	/// User identity recorded for cache writes when the token response does
	/// not carry a decodable id token.
	pub(crate) fn fallback_user(&self) -> UserInfo {
		let hint = self.user_id.as_deref().or(self.login_hint.as_deref()).unwrap_or_default();

		UserInfo::new(hint, false)
	}
}
