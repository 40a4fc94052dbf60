//! Immutable cache item structs, lifecycle predicates, and builders.

// self
use crate::{
	_prelude::*,
	auth::{CacheKey, SessionKey, TokenSecret, UserInfo},
};

/// Errors produced by [`CacheItemBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum CacheItemBuilderError {
	/// Issued when neither an access token nor a refresh token was provided.
	#[error("A cache item needs an access token or a refresh token.")]
	MissingCredential,
}

/// Immutable credential record stored in the token cache.
///
/// Items are never mutated in place: updates read the current item, derive a
/// new value, and write it back through the cache.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheItem {
	/// Lookup key the item is stored under.
	pub key: CacheKey,
	/// Access token secret, when the item carries one.
	pub access_token: Option<TokenSecret>,
	/// Token type reported by the authority (usually `Bearer`).
	pub access_token_type: Option<String>,
	/// Refresh token secret, when the authority issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Broker session key accompanying broker-issued credentials.
	pub session_key: Option<SessionKey>,
	/// Absolute access token expiry; `None` means the token is attempted once.
	pub expires_on: Option<OffsetDateTime>,
	/// Family id when the refresh token is valid across a client family.
	pub family_id: Option<String>,
	/// User the credential belongs to.
	pub user_info: UserInfo,
}
impl CacheItem {
	/// Returns a builder for the provided key + user pair.
	pub fn builder(key: CacheKey, user_info: UserInfo) -> CacheItemBuilder {
		CacheItemBuilder::new(key, user_info)
	}

	/// Returns `true` when the access token is expired at `now`, treating
	/// anything inside the expiration buffer as already expired.
	///
	/// An absent `expires_on` is treated as not expired so the token is still
	/// attempted once rather than discarded unused.
	pub fn is_expired_at(&self, now: OffsetDateTime, buffer: Duration) -> bool {
		match self.expires_on {
			Some(expires_on) => expires_on <= now + buffer,
			None => false,
		}
	}

	/// Returns `true` for a refresh token not bound to a single resource.
	pub fn is_multi_resource_refresh_token(&self) -> bool {
		self.access_token.is_none() && self.refresh_token.is_some() && self.key.resource.is_none()
	}

	/// Returns `true` when the refresh token is usable across a client family.
	pub fn is_family_refresh_token(&self) -> bool {
		self.family_id.is_some()
	}
}
impl Debug for CacheItem {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheItem")
			.field("key", &self.key)
			.field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
			.field("access_token_type", &self.access_token_type)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("session_key", &self.session_key.as_ref().map(|_| "<redacted>"))
			.field("expires_on", &self.expires_on)
			.field("family_id", &self.family_id)
			.field("user_id", &self.user_info.user_id)
			.finish()
	}
}

/// Builder for [`CacheItem`].
#[derive(Clone, Debug)]
pub struct CacheItemBuilder {
	key: CacheKey,
	user_info: UserInfo,
	access_token: Option<TokenSecret>,
	access_token_type: Option<String>,
	refresh_token: Option<TokenSecret>,
	session_key: Option<SessionKey>,
	expires_on: Option<OffsetDateTime>,
	family_id: Option<String>,
}
impl CacheItemBuilder {
	fn new(key: CacheKey, user_info: UserInfo) -> Self {
		Self {
			key,
			user_info,
			access_token: None,
			access_token_type: None,
			refresh_token: None,
			session_key: None,
			expires_on: None,
			family_id: None,
		}
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the access token type reported by the authority.
	pub fn access_token_type(mut self, token_type: impl Into<String>) -> Self {
		self.access_token_type = Some(token_type.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Attaches a broker session key.
	pub fn session_key(mut self, key: SessionKey) -> Self {
		self.session_key = Some(key);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_on(mut self, instant: OffsetDateTime) -> Self {
		self.expires_on = Some(instant);

		self
	}

	/// Marks the refresh token as usable across the provided client family.
	pub fn family_id(mut self, family_id: impl Into<String>) -> Self {
		self.family_id = Some(family_id.into());

		self
	}

	/// Consumes the builder and produces a [`CacheItem`].
	pub fn build(self) -> Result<CacheItem, CacheItemBuilderError> {
		if self.access_token.is_none() && self.refresh_token.is_none() {
			return Err(CacheItemBuilderError::MissingCredential);
		}

		Ok(CacheItem {
			key: self.key,
			access_token: self.access_token,
			access_token_type: self.access_token_type,
			refresh_token: self.refresh_token,
			session_key: self.session_key,
			expires_on: self.expires_on,
			family_id: self.family_id,
			user_info: self.user_info,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::auth::Authority;

	fn key(resource: Option<&str>) -> CacheKey {
		CacheKey::new(
			Authority::new("https://login.example.com/tenant")
				.expect("Authority fixture should be valid."),
			resource,
			"client-1",
		)
	}

	fn user() -> UserInfo {
		UserInfo::new("ada@example.com", true)
	}

	#[test]
	fn expiration_buffer_boundaries() {
		let now = macros::datetime!(2025-06-01 12:00 UTC);
		let buffer = Duration::minutes(5);
		let expiring = CacheItem::builder(key(Some("resource")), user())
			.access_token("at")
			.expires_on(now + buffer - Duration::seconds(1))
			.build()
			.expect("Expiring item should build successfully.");
		let valid = CacheItem::builder(key(Some("resource")), user())
			.access_token("at")
			.expires_on(now + buffer + Duration::seconds(1))
			.build()
			.expect("Valid item should build successfully.");

		assert!(expiring.is_expired_at(now, buffer));
		assert!(!valid.is_expired_at(now, buffer));
	}

	#[test]
	fn absent_expiry_is_not_expired() {
		let item = CacheItem::builder(key(Some("resource")), user())
			.access_token("at")
			.build()
			.expect("Item without expiry should build successfully.");

		assert!(!item.is_expired_at(OffsetDateTime::now_utc(), Duration::minutes(5)));
	}

	#[test]
	fn mrrt_predicate_requires_all_three_conditions() {
		let mrrt = CacheItem::builder(key(None), user())
			.refresh_token("rt")
			.build()
			.expect("MRRT item should build successfully.");
		let bound = CacheItem::builder(key(Some("resource")), user())
			.refresh_token("rt")
			.build()
			.expect("Resource-bound item should build successfully.");
		let with_at = CacheItem::builder(key(None), user())
			.access_token("at")
			.refresh_token("rt")
			.build()
			.expect("Access-token item should build successfully.");

		assert!(mrrt.is_multi_resource_refresh_token());
		assert!(!bound.is_multi_resource_refresh_token());
		assert!(!with_at.is_multi_resource_refresh_token());
	}

	#[test]
	fn family_predicate_tracks_the_family_id() {
		let frt = CacheItem::builder(key(None), user())
			.refresh_token("rt")
			.family_id("1")
			.build()
			.expect("FRT item should build successfully.");

		assert!(frt.is_family_refresh_token());
	}

	#[test]
	fn builder_requires_a_credential() {
		let err = CacheItem::builder(key(None), user())
			.build()
			.expect_err("Credential-free build must fail.");

		assert_eq!(err, CacheItemBuilderError::MissingCredential);
	}

	#[test]
	fn debug_redacts_secrets() {
		let item = CacheItem::builder(key(Some("resource")), user())
			.access_token("secret-at")
			.refresh_token("secret-rt")
			.build()
			.expect("Item fixture should build successfully.");
		let rendered = format!("{item:?}");

		assert!(!rendered.contains("secret-at"));
		assert!(!rendered.contains("secret-rt"));
	}
}
