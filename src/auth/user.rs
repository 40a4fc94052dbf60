//! User identity records derived from id tokens or caller hints.

// std
use std::collections::BTreeMap;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

/// Errors produced while decoding an id token payload.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdTokenError {
	/// The compact JWT did not contain the expected three segments.
	#[error("Id token is not a compact JWT.")]
	MalformedToken,
	/// The payload segment was not valid base64url.
	#[error("Id token payload is not valid base64url.")]
	PayloadDecode,
	/// The payload segment was not a JSON object.
	#[error("Id token payload is not a JSON object.")]
	PayloadParse,
	/// No claim usable as a subject identifier was present.
	#[error("Id token carries no subject identifier claim.")]
	MissingSubject,
}

/// Identity of the user a cached credential belongs to.
///
/// Two values represent the same user iff their user ids match after
/// normalization (trim + lowercase).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
	/// Unique-per-subject identifier (UPN, email, or subject claim).
	pub user_id: String,
	/// Whether `user_id` is suitable for display (UPN/email vs. opaque subject).
	pub displayable: bool,
	/// Immutable directory object id, when the authority supplied one.
	pub unique_id: Option<String>,
	/// Raw compact id token the record was derived from, when available.
	pub raw_id_token: Option<String>,
	/// All claims decoded from the id token payload.
	pub claims: BTreeMap<String, serde_json::Value>,
}
impl UserInfo {
	/// Builds a minimal record from a caller-supplied identifier.
	pub fn new(user_id: impl Into<String>, displayable: bool) -> Self {
		Self {
			user_id: user_id.into(),
			displayable,
			unique_id: None,
			raw_id_token: None,
			claims: BTreeMap::new(),
		}
	}

	/// Decodes the payload segment of a compact JWT id token.
	///
	/// The signature is not validated here; the token arrived over TLS from
	/// the authority that minted it and is used only for cache partitioning.
	pub fn from_id_token(raw: &str) -> Result<Self, IdTokenError> {
		let payload = raw.split('.').nth(1).ok_or(IdTokenError::MalformedToken)?;
		let decoded =
			URL_SAFE_NO_PAD.decode(payload).map_err(|_| IdTokenError::PayloadDecode)?;
		let claims: BTreeMap<String, serde_json::Value> =
			serde_json::from_slice(&decoded).map_err(|_| IdTokenError::PayloadParse)?;
		let displayable_id = ["upn", "preferred_username", "email"]
			.iter()
			.find_map(|claim| claim_str(&claims, claim));
		let subject_id = claim_str(&claims, "sub");
		let (user_id, displayable) = match (&displayable_id, &subject_id) {
			(Some(id), _) => (id.clone(), true),
			(None, Some(id)) => (id.clone(), false),
			(None, None) => return Err(IdTokenError::MissingSubject),
		};
		let unique_id = claim_str(&claims, "oid").or(subject_id);

		Ok(Self { user_id, displayable, unique_id, raw_id_token: Some(raw.into()), claims })
	}

	/// Normalized user id used for cache partitioning (trim + lowercase).
	pub fn normalized_id(&self) -> String {
		normalize_user_id(&self.user_id)
	}

	/// Returns `true` when both values identify the same subject.
	pub fn same_user(&self, other: &Self) -> bool {
		self.normalized_id() == other.normalized_id()
	}
}

/// Normalizes a raw user identifier for comparison and cache partitioning.
pub fn normalize_user_id(user_id: &str) -> String {
	user_id.trim().to_lowercase()
}

fn claim_str(claims: &BTreeMap<String, serde_json::Value>, name: &str) -> Option<String> {
	claims.get(name).and_then(|value| value.as_str()).map(ToOwned::to_owned)
}
