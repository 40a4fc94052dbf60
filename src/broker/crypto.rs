//! Key derivation, verification, and decryption for broker responses.
//!
//! Version 2 of the protocol derives separate encryption and signing keys
//! from the shared secret with a counter-mode KDF (NIST SP 800-108, HMAC-SHA256
//! PRF) so the transport key never touches the wire payload directly. Version 1
//! predates the KDF and uses the shared key for both roles. The MAC over the
//! ciphertext is always verified, in constant time, before any decryption.

// crates.io
use aes_gcm::{Aes256Gcm, KeyInit, Nonce, aead::Aead};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;
// self
use crate::{
	_prelude::*,
	broker::{BrokerMessage, SymmetricKey},
	error::BrokerCryptoError,
	oauth::TokenResponse,
};

type HmacSha256 = Hmac<Sha256>;

const ENCRYPT_LABEL: &[u8] = b"broker-protocol-encrypt";
const SIGN_LABEL: &[u8] = b"broker-protocol-sign";
const DERIVED_KEY_LEN: usize = 32;
const GCM_NONCE_LEN: usize = 12;

/// Verifies and decrypts broker responses with a shared symmetric key.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrokerCryptoEngine;
impl BrokerCryptoEngine {
	/// Creates a stateless engine.
	pub fn new() -> Self {
		Self
	}

	/// Verifies `message` against its MAC and decrypts the token response.
	///
	/// Fail-closed: an unknown protocol version or a MAC mismatch returns an
	/// error before a single byte of ciphertext is decrypted.
	pub fn decrypt(
		&self,
		message: &BrokerMessage,
		key: &SymmetricKey,
	) -> Result<TokenResponse, BrokerCryptoError> {
		let (enc_key, mac_key) = keys_for_version(message, key)?;
		let expected = hmac_sha256(&mac_key, &message.payload);

		if message.hash.len() != expected.len()
			|| !bool::from(expected.as_slice().ct_eq(message.hash.as_slice()))
		{
			return Err(BrokerCryptoError::HashMismatch);
		}

		let nonce_bytes = message
			.nonce
			.as_deref()
			.ok_or_else(|| BrokerCryptoError::malformed("missing cipher nonce"))?;

		if nonce_bytes.len() != GCM_NONCE_LEN {
			return Err(BrokerCryptoError::malformed(format!(
				"cipher nonce must be {GCM_NONCE_LEN} bytes, got {}",
				nonce_bytes.len()
			)));
		}

		let cipher = Aes256Gcm::new_from_slice(enc_key.as_slice())
			.map_err(|_| BrokerCryptoError::malformed("invalid derived key length"))?;
		let plaintext = cipher
			.decrypt(Nonce::from_slice(nonce_bytes), message.payload.as_slice())
			.map_err(|_| BrokerCryptoError::malformed("payload failed authenticated decryption"))?;
		let deserializer = &mut serde_json::Deserializer::from_slice(&plaintext);

		serde_path_to_error::deserialize(deserializer).map_err(|e| {
			BrokerCryptoError::malformed(format!("decrypted payload is not a token response: {e}"))
		})
	}

	/// Encrypts and signs a serialized token response the way a broker
	/// process does, producing the message counterpart of [`Self::decrypt`].
	pub fn seal(
		&self,
		plaintext: &[u8],
		key: &SymmetricKey,
		protocol_version: u32,
		nonce: [u8; GCM_NONCE_LEN],
	) -> Result<BrokerMessage, BrokerCryptoError> {
		let probe = BrokerMessage {
			protocol_version,
			payload: Vec::new(),
			hash: Vec::new(),
			nonce: Some(nonce.to_vec()),
		};
		let (enc_key, mac_key) = keys_for_version(&probe, key)?;
		let cipher = Aes256Gcm::new_from_slice(enc_key.as_slice())
			.map_err(|_| BrokerCryptoError::malformed("invalid derived key length"))?;
		let payload = cipher
			.encrypt(Nonce::from_slice(&nonce), plaintext)
			.map_err(|_| BrokerCryptoError::malformed("payload failed encryption"))?;
		let hash = hmac_sha256(&mac_key, &payload).to_vec();

		Ok(BrokerMessage { protocol_version, payload, hash, nonce: Some(nonce.to_vec()) })
	}
}

fn keys_for_version(
	message: &BrokerMessage,
	key: &SymmetricKey,
) -> Result<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>), BrokerCryptoError> {
	match message.protocol_version {
		// Legacy scheme: the shared key plays both roles.
		1 => Ok((
			Zeroizing::new(key.expose().to_vec()),
			Zeroizing::new(key.expose().to_vec()),
		)),
		2 => {
			let context = message.nonce.as_deref().unwrap_or_default();

			Ok((
				derive_key(key, ENCRYPT_LABEL, context),
				derive_key(key, SIGN_LABEL, context),
			))
		},
		version => Err(BrokerCryptoError::UnsupportedVersion { version }),
	}
}

/// Counter-mode KDF (SP 800-108 CTR): `HMAC(key, [i] || label || 0x00 || context || [L])`.
fn derive_key(key: &SymmetricKey, label: &[u8], context: &[u8]) -> Zeroizing<Vec<u8>> {
	let output_bits = (DERIVED_KEY_LEN * 8) as u32;
	let mut output = Zeroizing::new(Vec::with_capacity(DERIVED_KEY_LEN));
	let mut counter = 1_u32;

	while output.len() < DERIVED_KEY_LEN {
		let mut mac = new_hmac(key.expose());

		mac.update(&counter.to_be_bytes());
		mac.update(label);
		mac.update(&[0_u8]);
		mac.update(context);
		mac.update(&output_bits.to_be_bytes());

		let block = mac.finalize().into_bytes();
		let take = (DERIVED_KEY_LEN - output.len()).min(block.len());

		output.extend_from_slice(&block[..take]);

		counter += 1;
	}

	output
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
	let mut mac = new_hmac(key);

	mac.update(data);
	mac.finalize().into_bytes().into()
}

fn new_hmac(key: &[u8]) -> HmacSha256 {
	<HmacSha256 as Mac>::new_from_slice(key).expect("HMAC can take a key of any size")
}
