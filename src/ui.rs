//! Interactive authorization collaborator contract and redirect plumbing.
//!
//! The core never renders UI: it builds the authorize URL, hands it to an
//! [`AuthorizationUi`] implementation (webview, system browser, broker app),
//! and interprets the redirect that comes back.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{_prelude::*, auth::Authority, error::ServerError};

const STATE_LEN: usize = 32;

/// Terminal outcome reported by the authorization collaborator.
#[derive(Clone, Debug)]
pub enum AuthorizationOutcome {
	/// The user completed sign-in; the full redirect URL is returned.
	Redirect(Url),
	/// The user explicitly cancelled the sign-in.
	Cancelled,
	/// The collaborator failed before producing a redirect.
	Failed {
		/// Error code reported by the collaborator or authorize endpoint.
		code: String,
		/// Optional human-readable description.
		description: Option<String>,
	},
}

/// Boxed future returned by [`AuthorizationUi`] implementations.
pub type UiFuture<'a> = Pin<Box<dyn Future<Output = AuthorizationOutcome> + 'a + Send>>;

/// Interactive sign-in contract implemented outside the core.
pub trait AuthorizationUi
where
	Self: Send + Sync,
{
	/// Presents `start_url` and resolves once the flow reaches `redirect_uri`,
	/// is cancelled, or fails.
	fn start_authorization(&self, start_url: Url, redirect_uri: Url) -> UiFuture<'_>;
}

/// Credential material extracted from a completed authorization redirect.
#[derive(Clone, Debug)]
pub enum ParsedRedirect {
	/// Plain authorization code to exchange at the token endpoint.
	Code(String),
	/// Broker-originated redirect carrying an encrypted response.
	Broker(Url),
}

/// Builds the authorize URL for an interactive sign-in.
pub(crate) fn build_authorize_url(
	authority: &Authority,
	client_id: &str,
	resource: Option<&str>,
	redirect_uri: &Url,
	state: &str,
	login_hint: Option<&str>,
	claims: Option<&str>,
) -> Url {
	let mut url = authority.authorize_endpoint().clone();

	{
		let mut pairs = url.query_pairs_mut();

		pairs.append_pair("response_type", "code");
		pairs.append_pair("client_id", client_id);
		pairs.append_pair("redirect_uri", redirect_uri.as_str());

		if let Some(resource) = resource {
			pairs.append_pair("resource", resource);
		}

		pairs.append_pair("state", state);

		if let Some(login_hint) = login_hint {
			pairs.append_pair("login_hint", login_hint);
		}
		if let Some(claims) = claims {
			pairs.append_pair("claims", claims);
		}
	}

	url
}

/// Generates the opaque state value round-tripped through the redirect.
pub(crate) fn random_state() -> String {
	rand::rng().sample_iter(Alphanumeric).take(STATE_LEN).map(char::from).collect()
}

/// Interprets a completed authorization redirect.
///
/// Broker-originated redirects are recognized by their URL scheme and passed
/// through for decryption; everything else must carry the expected `state`
/// and either a `code` or an OAuth error.
pub(crate) fn parse_redirect(
	redirect: &Url,
	expected_state: &str,
	broker_scheme: &str,
) -> Result<ParsedRedirect> {
	if redirect.scheme().eq_ignore_ascii_case(broker_scheme) {
		return Ok(ParsedRedirect::Broker(redirect.clone()));
	}

	let mut code = None;
	let mut state = None;
	let mut error = None;
	let mut error_description = None;

	for (name, value) in redirect.query_pairs() {
		match name.as_ref() {
			"code" => code = Some(value.into_owned()),
			"state" => state = Some(value.into_owned()),
			"error" => error = Some(value.into_owned()),
			"error_description" => error_description = Some(value.into_owned()),
			_ => {},
		}
	}

	if let Some(error) = error {
		return Err(ServerError {
			code: error,
			description: error_description,
			error_codes: Vec::new(),
			status: None,
		}
		.into());
	}
	if state.as_deref() != Some(expected_state) {
		return Err(Error::internal("authorization response state mismatch"));
	}

	match code {
		Some(code) => Ok(ParsedRedirect::Code(code)),
		None => Err(Error::internal("authorization response carried neither a code nor an error")),
	}
}
