//! Cache lookup keys and MRRT/FRT key derivation.

// self
use crate::{_prelude::*, auth::Authority};

/// Prefix for the synthetic client id family refresh tokens are cached under.
const FAMILY_CLIENT_PREFIX: &str = "family-refresh:";

/// Immutable cache lookup key.
///
/// Two keys are equal iff authority, resource, and client id all match; the
/// authority is compared in its normalized form while resource and client id
/// are compared byte-for-byte. `resource = None` denotes the multi-resource
/// (MRRT) or family (FRT) refresh token slot for an authority + client pair.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
	/// Normalized authority the credential was issued by.
	pub authority: Authority,
	/// Resource the credential is scoped to; `None` for MRRT/FRT slots.
	pub resource: Option<String>,
	/// OAuth client identifier the credential was issued to.
	pub client_id: String,
}
impl CacheKey {
	/// Builds a key for an exact authority/resource/client triple.
	pub fn new(
		authority: Authority,
		resource: Option<impl Into<String>>,
		client_id: impl Into<String>,
	) -> Self {
		Self { authority, resource: resource.map(Into::into), client_id: client_id.into() }
	}

	/// Returns a copy of this key with the resource cleared, used to probe for
	/// a multi-resource refresh token sharing the same authority + client.
	pub fn mrrt_key(&self) -> Self {
		Self { authority: self.authority.clone(), resource: None, client_id: self.client_id.clone() }
	}

	/// Returns the key a family refresh token for `family_id` is cached under.
	///
	/// Family tokens are shared across every client in the family, so they are
	/// stored once per authority under a synthetic client id instead of per
	/// requesting client.
	pub fn family_key(&self, family_id: &str) -> Self {
		Self {
			authority: self.authority.clone(),
			resource: None,
			client_id: format!("{FAMILY_CLIENT_PREFIX}{family_id}"),
		}
	}

	/// Returns `true` when this key addresses a family refresh token slot.
	pub fn is_family_key(&self) -> bool {
		self.resource.is_none() && self.client_id.starts_with(FAMILY_CLIENT_PREFIX)
	}
}
impl Debug for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CacheKey")
			.field("authority", &self.authority.as_str())
			.field("resource", &self.resource)
			.field("client_id", &self.client_id)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn authority() -> Authority {
		Authority::new("https://login.example.com/tenant")
			.expect("Authority fixture should be valid.")
	}

	#[test]
	fn keys_compare_resource_and_client_byte_for_byte() {
		let a = CacheKey::new(authority(), Some("https://graph.example.com"), "client-1");
		let b = CacheKey::new(authority(), Some("https://graph.example.com"), "client-1");
		let c = CacheKey::new(authority(), Some("https://Graph.example.com"), "client-1");

		assert_eq!(a, b);
		assert_ne!(a, c, "Resource comparison must not normalize case.");
	}

	#[test]
	fn authority_normalization_unifies_keys() {
		let upper = Authority::new("https://LOGIN.example.com/Tenant/")
			.expect("Upper-case authority fixture should be valid.");
		let a = CacheKey::new(upper, Some("resource"), "client");
		let b = CacheKey::new(authority(), Some("resource"), "client");

		assert_eq!(a, b);
	}

	#[test]
	fn mrrt_key_clears_only_the_resource() {
		let key = CacheKey::new(authority(), Some("resource"), "client");
		let mrrt = key.mrrt_key();

		assert_eq!(mrrt.authority, key.authority);
		assert_eq!(mrrt.client_id, key.client_id);
		assert_eq!(mrrt.resource, None);
	}

	#[test]
	fn family_key_uses_the_synthetic_client_id() {
		let key = CacheKey::new(authority(), Some("resource"), "client");
		let family = key.family_key("1");

		assert_eq!(family.client_id, "family-refresh:1");
		assert_eq!(family.resource, None);
		assert!(family.is_family_key());
		assert!(!key.is_family_key());
	}
}
