//! Redacting wrappers for token and session-key material.

// crates.io
use zeroize::{Zeroize, ZeroizeOnDrop};
// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Symmetric session key delivered alongside broker-issued tokens.
///
/// The bytes are wiped on drop and never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey(Vec<u8>);
impl SessionKey {
	/// Wraps raw session key bytes.
	pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
		Self(bytes.into())
	}

	/// Returns the inner key bytes. Callers must avoid logging them.
	pub fn expose(&self) -> &[u8] {
		&self.0
	}
}
impl Debug for SessionKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SessionKey").field(&"<redacted>").finish()
	}
}
