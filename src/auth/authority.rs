//! Authority parsing, normalization, and endpoint derivation.

// self
use crate::{_prelude::*, error::ArgumentError};

const AUTHORIZE_SUFFIX: &str = "oauth2/authorize";
const TOKEN_SUFFIX: &str = "oauth2/token";

/// Validated, normalized authority base URL tokens are requested from.
///
/// The canonical form is lowercased with a single trailing slash, so two
/// spellings of the same authority always compare equal and produce the same
/// cache keys. Non-HTTPS authorities are rejected unless the host is loopback.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Authority {
	canonical: String,
	host: String,
	authorize: Url,
	token: Url,
}
impl Authority {
	/// Parses and normalizes an authority string.
	pub fn new(value: impl AsRef<str>) -> Result<Self, ArgumentError> {
		let raw = value.as_ref().trim();

		if raw.is_empty() {
			return Err(ArgumentError::Empty { name: "authority" });
		}

		let url = Url::parse(raw).map_err(|source| ArgumentError::MalformedAuthority { source })?;
		let host = match url.host_str() {
			Some(host) if !host.is_empty() => host.to_ascii_lowercase(),
			_ =>
				return Err(ArgumentError::UnusableAuthority {
					authority: raw.into(),
					reason: "missing host",
				}),
		};

		if url.scheme() != "https" && !is_loopback(&host) {
			return Err(ArgumentError::InsecureAuthority { authority: raw.into() });
		}
		if url.query().is_some() || url.fragment().is_some() {
			return Err(ArgumentError::UnusableAuthority {
				authority: raw.into(),
				reason: "query and fragment components are not allowed",
			});
		}

		let mut canonical = url.as_str().to_ascii_lowercase();

		while canonical.ends_with('/') {
			canonical.pop();
		}

		canonical.push('/');

		let base = Url::parse(&canonical)
			.map_err(|source| ArgumentError::MalformedAuthority { source })?;
		let authorize = base
			.join(AUTHORIZE_SUFFIX)
			.map_err(|source| ArgumentError::MalformedAuthority { source })?;
		let token = base
			.join(TOKEN_SUFFIX)
			.map_err(|source| ArgumentError::MalformedAuthority { source })?;

		Ok(Self { canonical, host, authorize, token })
	}

	/// Canonical authority string (lowercased, single trailing slash).
	pub fn as_str(&self) -> &str {
		&self.canonical
	}

	/// Lowercased authority host.
	pub fn host(&self) -> &str {
		&self.host
	}

	/// Authorization endpoint under this authority.
	pub fn authorize_endpoint(&self) -> &Url {
		&self.authorize
	}

	/// Token endpoint under this authority.
	pub fn token_endpoint(&self) -> &Url {
		&self.token
	}

	/// Federation metadata document URL for non-directory authorities.
	pub fn federation_metadata_url(&self) -> Result<Url, ArgumentError> {
		Url::parse(&self.canonical)
			.and_then(|base| base.join("federationmetadata/2007-06/federationmetadata.xml"))
			.map_err(|source| ArgumentError::MalformedAuthority { source })
	}

	/// Instance discovery URL served by a trusted host, probing this authority.
	///
	/// Loopback trusted hosts are probed over plain HTTP, mirroring the
	/// loopback exception for authorities themselves.
	pub fn instance_discovery_url(&self, trusted_host: &str) -> Result<Url, ArgumentError> {
		let bare_host = trusted_host.rsplit_once(':').map_or(trusted_host, |(host, _)| host);
		let scheme = if is_loopback(bare_host) { "http" } else { "https" };
		let mut url = Url::parse(&format!("{scheme}://{trusted_host}/common/discovery/instance"))
			.map_err(|source| ArgumentError::MalformedAuthority { source })?;

		url.query_pairs_mut()
			.append_pair("api-version", "1.1")
			.append_pair("authorization_endpoint", self.authorize.as_str());

		Ok(url)
	}
}
impl AsRef<str> for Authority {
	fn as_ref(&self) -> &str {
		&self.canonical
	}
}
impl From<Authority> for String {
	fn from(value: Authority) -> Self {
		value.canonical
	}
}
impl TryFrom<String> for Authority {
	type Error = ArgumentError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl FromStr for Authority {
	type Err = ArgumentError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl PartialEq for Authority {
	fn eq(&self, other: &Self) -> bool {
		self.canonical == other.canonical
	}
}
impl Eq for Authority {}
impl PartialOrd for Authority {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}
impl Ord for Authority {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.canonical.cmp(&other.canonical)
	}
}
impl Hash for Authority {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.canonical.hash(state);
	}
}
impl Debug for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Authority({})", self.canonical)
	}
}
impl Display for Authority {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.canonical)
	}
}

fn is_loopback(host: &str) -> bool {
	matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn authority_normalizes_case_and_trailing_slash() {
		let mixed = Authority::new("https://Login.Example.COM/Tenant")
			.expect("Mixed-case authority should parse successfully.");
		let slashed = Authority::new("https://login.example.com/tenant///")
			.expect("Slash-heavy authority should parse successfully.");

		assert_eq!(mixed, slashed);
		assert_eq!(mixed.as_str(), "https://login.example.com/tenant/");
		assert_eq!(mixed.host(), "login.example.com");
	}

	#[test]
	fn authority_rejects_insecure_and_malformed_inputs() {
		assert!(matches!(
			Authority::new("http://login.example.com/tenant"),
			Err(ArgumentError::InsecureAuthority { .. })
		));
		assert!(matches!(Authority::new(""), Err(ArgumentError::Empty { .. })));
		assert!(matches!(Authority::new("   "), Err(ArgumentError::Empty { .. })));
		assert!(matches!(
			Authority::new("not a url"),
			Err(ArgumentError::MalformedAuthority { .. })
		));
		assert!(matches!(
			Authority::new("https://login.example.com/tenant?x=1"),
			Err(ArgumentError::UnusableAuthority { .. })
		));
	}

	#[test]
	fn loopback_authorities_may_use_http() {
		let local = Authority::new("http://localhost:5000/tenant")
			.expect("Loopback HTTP authority should be accepted.");

		assert_eq!(local.as_str(), "http://localhost:5000/tenant/");
	}

	#[test]
	fn endpoints_derive_from_the_canonical_form() {
		let authority = Authority::new("https://login.example.com/tenant")
			.expect("Authority fixture should be valid.");

		assert_eq!(
			authority.token_endpoint().as_str(),
			"https://login.example.com/tenant/oauth2/token"
		);
		assert_eq!(
			authority.authorize_endpoint().as_str(),
			"https://login.example.com/tenant/oauth2/authorize"
		);

		let discovery = authority
			.instance_discovery_url("discovery.example.com")
			.expect("Discovery URL should build successfully.");

		assert_eq!(discovery.host_str(), Some("discovery.example.com"));
		assert!(
			discovery
				.query()
				.expect("Discovery URL should carry a query string.")
				.contains("authorization_endpoint")
		);

		let federation = authority
			.federation_metadata_url()
			.expect("Federation metadata URL should build successfully.");

		assert_eq!(
			federation.as_str(),
			"https://login.example.com/tenant/federationmetadata/2007-06/federationmetadata.xml"
		);
	}

	#[test]
	fn serde_round_trip_enforces_validation() {
		let authority: Authority = serde_json::from_str("\"https://login.example.com/t\"")
			.expect("Authority should deserialize successfully.");

		assert_eq!(authority.as_str(), "https://login.example.com/t/");
		assert!(serde_json::from_str::<Authority>("\"http://evil.example.com\"").is_err());
	}
}
