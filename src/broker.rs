//! Broker inter-process credential exchange: message model and crypto engine.
//!
//! A broker is a separate trusted process that signs users in on behalf of
//! multiple apps and returns results through an encrypted redirect. This
//! module parses those redirects into [`BrokerMessage`]s and verifies +
//! decrypts them with a shared [`SymmetricKey`].

pub mod crypto;

pub use crypto::*;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use zeroize::{Zeroize, ZeroizeOnDrop};
// self
use crate::{_prelude::*, error::BrokerCryptoError};

const SYMMETRIC_KEY_LEN: usize = 32;

/// Shared symmetric key material for broker response decryption.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LEN]);
impl SymmetricKey {
	/// Key length in bytes.
	pub const LEN: usize = SYMMETRIC_KEY_LEN;

	/// Wraps raw key bytes.
	pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
		Self(bytes)
	}

	/// Validates and wraps a byte slice.
	pub fn try_from_slice(slice: &[u8]) -> Result<Self, BrokerCryptoError> {
		let bytes: [u8; Self::LEN] = slice.try_into().map_err(|_| {
			BrokerCryptoError::malformed(format!(
				"symmetric key must be {} bytes, got {}",
				Self::LEN,
				slice.len()
			))
		})?;

		Ok(Self(bytes))
	}

	/// Returns the raw key bytes. Callers must avoid logging them.
	pub fn expose(&self) -> &[u8; Self::LEN] {
		&self.0
	}
}
impl Debug for SymmetricKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SymmetricKey").field(&"<redacted>").finish()
	}
}

/// One encrypted broker response, consumed exactly once by the crypto engine.
#[derive(Clone, Debug)]
pub struct BrokerMessage {
	/// Protocol version declared by the broker.
	pub protocol_version: u32,
	/// Ciphertext carrying the serialized token response.
	pub payload: Vec<u8>,
	/// MAC computed by the broker over the ciphertext.
	pub hash: Vec<u8>,
	/// Random nonce for the authenticated cipher; required by version 2.
	pub nonce: Option<Vec<u8>>,
}
impl BrokerMessage {
	/// Parses a broker-originated redirect URL into a message.
	///
	/// The redirect carries `response` (base64 ciphertext), `hash` (base64
	/// MAC), `msg_protocol_ver`, and an optional base64 `nonce`.
	pub fn from_redirect_url(url: &Url) -> Result<Self, BrokerCryptoError> {
		let mut response = None;
		let mut hash = None;
		let mut version = None;
		let mut nonce = None;

		for (name, value) in url.query_pairs() {
			match name.as_ref() {
				"response" => response = Some(value.into_owned()),
				"hash" => hash = Some(value.into_owned()),
				"msg_protocol_ver" => version = Some(value.into_owned()),
				"nonce" => nonce = Some(value.into_owned()),
				_ => {},
			}
		}

		let payload = decode_field("response", response)?;
		let hash = decode_field("hash", hash)?;
		let protocol_version = version
			.ok_or_else(|| BrokerCryptoError::malformed("missing msg_protocol_ver"))?
			.parse::<u32>()
			.map_err(|_| BrokerCryptoError::malformed("msg_protocol_ver is not an integer"))?;
		let nonce = nonce.map(|value| decode_field("nonce", Some(value))).transpose()?;

		Ok(Self { protocol_version, payload, hash, nonce })
	}
}

fn decode_field(name: &str, value: Option<String>) -> Result<Vec<u8>, BrokerCryptoError> {
	let value = value.ok_or_else(|| BrokerCryptoError::malformed(format!("missing {name}")))?;

	STANDARD
		.decode(value.as_bytes())
		.map_err(|_| BrokerCryptoError::malformed(format!("{name} is not valid base64")))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn redirect_urls_parse_into_messages() {
		let url = Url::parse(&format!(
			"x-broker-auth://callback?response={}&hash={}&msg_protocol_ver=2&nonce={}",
			STANDARD.encode(b"ciphertext"),
			STANDARD.encode(b"mac-bytes"),
			STANDARD.encode(b"nonce-bytes"),
		))
		.expect("Broker redirect fixture should parse successfully.");
		let message = BrokerMessage::from_redirect_url(&url)
			.expect("Broker message should parse successfully.");

		assert_eq!(message.protocol_version, 2);
		assert_eq!(message.payload, b"ciphertext");
		assert_eq!(message.hash, b"mac-bytes");
		assert_eq!(message.nonce.as_deref(), Some(b"nonce-bytes".as_slice()));
	}

	#[test]
	fn missing_fields_are_malformed() {
		let url = Url::parse("x-broker-auth://callback?hash=AA%3D%3D&msg_protocol_ver=2")
			.expect("URL fixture should parse successfully.");

		assert!(matches!(
			BrokerMessage::from_redirect_url(&url),
			Err(BrokerCryptoError::MalformedPayload { .. })
		));

		let bad_version = Url::parse(&format!(
			"x-broker-auth://callback?response={}&hash={}&msg_protocol_ver=two",
			STANDARD.encode(b"x"),
			STANDARD.encode(b"y"),
		))
		.expect("URL fixture should parse successfully.");

		assert!(matches!(
			BrokerMessage::from_redirect_url(&bad_version),
			Err(BrokerCryptoError::MalformedPayload { .. })
		));
	}

	#[test]
	fn symmetric_key_validates_length() {
		assert!(SymmetricKey::try_from_slice(&[0_u8; 32]).is_ok());
		assert!(SymmetricKey::try_from_slice(&[0_u8; 16]).is_err());
	}

	#[test]
	fn symmetric_key_debug_redacts() {
		let key = SymmetricKey::from_bytes([7_u8; 32]);

		assert_eq!(format!("{key:?}"), "SymmetricKey(\"<redacted>\")");
	}
}
