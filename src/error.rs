//! Crate-level error types shared across the cache, engine, and collaborators.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Malformed caller input; detected before any I/O is attempted.
	#[error(transparent)]
	Argument(#[from] ArgumentError),
	/// Cache storage or snapshot failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::cache::StorageError,
	),
	/// OAuth error response returned by the token endpoint.
	#[error(transparent)]
	Server(#[from] ServerError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Broker response decryption or verification failure.
	#[error(transparent)]
	BrokerCrypto(#[from] BrokerCryptoError),

	/// A cache lookup without a user id matched items for multiple users.
	#[error("Cache lookup matched {matches} distinct users; a user identifier is required.")]
	AmbiguousUser {
		/// Number of distinct users matching the lookup key.
		matches: usize,
	},
	/// The silent flow exhausted every credential without reaching a usable token.
	#[error("Silent token acquisition failed; user interaction is required.")]
	UserInputNeeded,
	/// Another interactive acquisition already holds the exclusion lock.
	#[error("An interactive authentication request is already in progress.")]
	MultipleInteractiveRequests,
	/// The authority host was rejected by instance discovery.
	#[error("Authority `{authority}` could not be validated: {reason}.")]
	AuthorityValidationFailed {
		/// Authority string as supplied by the caller.
		authority: String,
		/// Discovery- or validator-supplied reason string.
		reason: String,
	},
	/// Defensive catch-all for invariant violations.
	#[error("Internal invariant violated: {reason}.")]
	Internal {
		/// Description of the violated invariant.
		reason: String,
	},
}
impl Error {
	/// Builds an [`Error::Internal`] from any displayable reason.
	pub fn internal(reason: impl Into<String>) -> Self {
		Self::Internal { reason: reason.into() }
	}
}

/// Argument validation failures raised before any I/O.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ArgumentError {
	/// A required string argument was empty or whitespace.
	#[error("Argument `{name}` cannot be empty.")]
	Empty {
		/// Name of the offending argument.
		name: &'static str,
	},
	/// The authority URL does not use HTTPS and is not loopback.
	#[error("Authority `{authority}` must use HTTPS.")]
	InsecureAuthority {
		/// Authority string as supplied by the caller.
		authority: String,
	},
	/// The authority URL could not be parsed.
	#[error("Authority is not a valid URL.")]
	MalformedAuthority {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The authority URL is structurally unusable (no host, query, fragment).
	#[error("Authority `{authority}` is malformed: {reason}.")]
	UnusableAuthority {
		/// Authority string as supplied by the caller.
		authority: String,
		/// Description of the structural problem.
		reason: &'static str,
	},
	/// The redirect URI could not be parsed.
	#[error("Redirect URI is invalid.")]
	MalformedRedirect {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}

/// OAuth 2.0 error response from the token endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("Token endpoint returned `{code}`.")]
pub struct ServerError {
	/// Protocol error code (`invalid_grant`, `interaction_required`, ...).
	pub code: String,
	/// Human-readable description supplied by the server.
	pub description: Option<String>,
	/// Provider-specific numeric error codes, when supplied.
	pub error_codes: Vec<i64>,
	/// HTTP status of the response carrying the error, when known.
	pub status: Option<u16>,
}
impl ServerError {
	/// Returns `true` when the error means the presented refresh credential is
	/// unusable and the engine may fall back to the family refresh token or an
	/// interactive prompt. Any other server error is surfaced as-is so real
	/// outages are not masked behind a sign-in prompt.
	pub fn requires_user_interaction(&self) -> bool {
		matches!(self.code.as_str(), "invalid_grant" | "interaction_required")
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Summary of the unexpected response.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Instance discovery returned an unexpected response.
	#[error("Instance discovery returned an unexpected response: {message}.")]
	Discovery {
		/// Summary of the unexpected response.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the authority.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the authority.")]
	Io(#[from] std::io::Error),
	/// The request exceeded the caller-configured timeout.
	#[error("Request to the authority timed out after {timeout}.")]
	Timeout {
		/// Configured timeout that elapsed.
		timeout: Duration,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}

/// Broker inter-process message verification and decryption failures.
///
/// Hash mismatch is fail-closed: the payload is never decrypted or parsed when
/// the MAC does not verify.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum BrokerCryptoError {
	/// The MAC computed over the ciphertext does not match the message hash.
	#[error("Broker response hash does not match the received payload.")]
	HashMismatch,
	/// The message declares a protocol version this crate does not implement.
	#[error("Broker protocol version {version} is not supported.")]
	UnsupportedVersion {
		/// Declared protocol version.
		version: u32,
	},
	/// The payload could not be decoded, decrypted, or parsed.
	#[error("Broker response payload is malformed: {reason}.")]
	MalformedPayload {
		/// Description of the malformation.
		reason: String,
	},
}
impl BrokerCryptoError {
	/// Builds a [`BrokerCryptoError::MalformedPayload`] from any displayable reason.
	pub fn malformed(reason: impl Into<String>) -> Self {
		Self::MalformedPayload { reason: reason.into() }
	}
}
