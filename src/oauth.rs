//! Token endpoint wire layer: request building and response parsing.
//!
//! The engine speaks to the token endpoint through [`HttpRequest`] descriptors
//! built here and interprets the JSON that comes back. The server's view wins
//! over the caller's: when a response names a `resource`, cache entries are
//! keyed by that resource rather than the one requested.

// self
use crate::{
	_prelude::*,
	auth::{CacheItem, CacheKey, UserInfo},
	error::{ServerError, TransientError},
	http::HttpRequest,
};

/// Grant types the engine exchanges at the token endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantType {
	/// Authorization code obtained from an interactive sign-in.
	AuthorizationCode,
	/// Refresh token exchange (per-client or family).
	RefreshToken,
	/// Resource-owner password credentials.
	Password,
	/// On-behalf-of JWT bearer assertion.
	JwtBearer,
}
impl GrantType {
	/// Returns the wire identifier for the grant.
	pub const fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
			GrantType::Password => "password",
			GrantType::JwtBearer => "urn:ietf:params:oauth:grant-type:jwt-bearer",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Form-encoded token endpoint request.
#[derive(Clone, Debug)]
pub struct TokenRequest {
	/// Grant being exchanged.
	pub grant: GrantType,
	/// OAuth client identifier.
	pub client_id: String,
	/// Resource the token should be scoped to.
	pub resource: Option<String>,
	/// Redirect URI; required for authorization-code exchanges.
	pub redirect_uri: Option<Url>,
	/// User name; required for the password grant.
	pub username: Option<String>,
	/// Grant credential: code, refresh token, password, or assertion.
	pub credential: String,
	/// Additional claims challenge forwarded verbatim.
	pub claims: Option<String>,
}
impl TokenRequest {
	/// Builds an authorization-code exchange request.
	pub fn authorization_code(
		client_id: impl Into<String>,
		code: impl Into<String>,
		redirect_uri: Url,
		resource: Option<String>,
		claims: Option<String>,
	) -> Self {
		Self {
			grant: GrantType::AuthorizationCode,
			client_id: client_id.into(),
			resource,
			redirect_uri: Some(redirect_uri),
			username: None,
			credential: code.into(),
			claims,
		}
	}

	/// Builds a refresh-token exchange request.
	pub fn refresh_token(
		client_id: impl Into<String>,
		refresh_token: impl Into<String>,
		resource: Option<String>,
		claims: Option<String>,
	) -> Self {
		Self {
			grant: GrantType::RefreshToken,
			client_id: client_id.into(),
			resource,
			redirect_uri: None,
			username: None,
			credential: refresh_token.into(),
			claims,
		}
	}

	/// Builds a resource-owner password credentials request.
	pub fn password(
		client_id: impl Into<String>,
		username: impl Into<String>,
		password: impl Into<String>,
		resource: Option<String>,
	) -> Self {
		Self {
			grant: GrantType::Password,
			client_id: client_id.into(),
			resource,
			redirect_uri: None,
			username: Some(username.into()),
			credential: password.into(),
			claims: None,
		}
	}

	/// Builds an on-behalf-of JWT bearer assertion request.
	pub fn jwt_bearer(
		client_id: impl Into<String>,
		assertion: impl Into<String>,
		resource: Option<String>,
	) -> Self {
		Self {
			grant: GrantType::JwtBearer,
			client_id: client_id.into(),
			resource,
			redirect_uri: None,
			username: None,
			credential: assertion.into(),
			claims: None,
		}
	}

	/// Renders the request as a form-encoded POST descriptor.
	pub fn into_http_request(self, token_endpoint: &Url) -> HttpRequest {
		let mut pairs: Vec<(&str, &str)> = vec![
			("grant_type", self.grant.as_str()),
			("client_id", &self.client_id),
		];
		let redirect = self.redirect_uri.as_ref().map(Url::to_string);

		if let Some(resource) = &self.resource {
			pairs.push(("resource", resource));
		}
		if let Some(redirect) = &redirect {
			pairs.push(("redirect_uri", redirect));
		}
		if let Some(username) = &self.username {
			pairs.push(("username", username));
		}

		let credential_field = match self.grant {
			GrantType::AuthorizationCode => "code",
			GrantType::RefreshToken => "refresh_token",
			GrantType::Password => "password",
			GrantType::JwtBearer => "assertion",
		};

		pairs.push((credential_field, &self.credential));

		if let Some(claims) = &self.claims {
			pairs.push(("claims", claims));
		}

		HttpRequest::post_form(token_endpoint.clone(), pairs)
	}
}

/// Parsed token endpoint success payload.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TokenResponse {
	/// Issued access token.
	pub access_token: Option<String>,
	/// Token type label (usually `Bearer`).
	pub token_type: Option<String>,
	/// Relative expiry in seconds; some authorities send it as a string.
	#[serde(default, deserialize_with = "de_opt_i64")]
	pub expires_in: Option<i64>,
	/// Rotated refresh token, when the server issued one.
	pub refresh_token: Option<String>,
	/// Compact JWT id token.
	pub id_token: Option<String>,
	/// Resource the token was actually issued for; may differ from the request.
	pub resource: Option<String>,
	/// Family-of-client-ids marker for family refresh tokens.
	#[serde(rename = "foci")]
	pub family_id: Option<String>,
}
impl TokenResponse {
	/// Absolute expiry derived from `expires_in`, when present.
	pub fn expires_on(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
		self.expires_in.map(|seconds| now + Duration::seconds(seconds))
	}
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
	error: String,
	error_description: Option<String>,
	#[serde(default)]
	error_codes: Vec<i64>,
}

/// Interprets a token endpoint response body.
///
/// An OAuth error body maps to [`ServerError`]; anything that is neither a
/// usable success payload nor an error body becomes a [`TransientError`] so
/// callers can distinguish protocol rejections from endpoint misbehavior.
pub fn parse_token_response(status: u16, body: &[u8]) -> Result<TokenResponse> {
	if let Ok(error) = serde_json::from_slice::<ErrorBody>(body) {
		return Err(ServerError {
			code: error.error,
			description: error.error_description,
			error_codes: error.error_codes,
			status: Some(status),
		}
		.into());
	}
	if !(200..300).contains(&status) {
		return Err(TransientError::TokenEndpoint {
			message: format!("HTTP {status} without an OAuth error body"),
			status: Some(status),
		}
		.into());
	}

	let deserializer = &mut serde_json::Deserializer::from_slice(body);
	let response: TokenResponse = serde_path_to_error::deserialize(deserializer)
		.map_err(|source| TransientError::TokenResponseParse { source, status: Some(status) })?;

	if response.access_token.is_none() && response.refresh_token.is_none() {
		return Err(TransientError::TokenEndpoint {
			message: "Response carried neither an access token nor a refresh token".into(),
			status: Some(status),
		}
		.into());
	}

	Ok(response)
}

/// Converts a token response into the cache items it should replace.
///
/// The response's `resource` wins over the requested one. A refresh token in
/// the response additionally produces an MRRT item, and a family id produces
/// an FRT item shared across the client family.
pub fn cache_items_from_response(
	response: &TokenResponse,
	requested: &CacheKey,
	fallback_user: &UserInfo,
	now: OffsetDateTime,
) -> Vec<CacheItem> {
	let user_info = response
		.id_token
		.as_deref()
		.and_then(|raw| UserInfo::from_id_token(raw).ok())
		.unwrap_or_else(|| fallback_user.clone());
	let resource = response.resource.clone().or_else(|| requested.resource.clone());
	let expires_on = response.expires_on(now);
	let mut items = Vec::with_capacity(3);

	if let Some(access_token) = &response.access_token {
		let key =
			CacheKey::new(requested.authority.clone(), resource.clone(), &requested.client_id);
		let mut builder = CacheItem::builder(key, user_info.clone())
			.access_token(access_token)
			.access_token_type(response.token_type.as_deref().unwrap_or("Bearer"));

		if let Some(expires_on) = expires_on {
			builder = builder.expires_on(expires_on);
		}
		if let Some(refresh_token) = &response.refresh_token {
			builder = builder.refresh_token(refresh_token);
		}
		if let Some(family_id) = &response.family_id {
			builder = builder.family_id(family_id);
		}
		if let Ok(item) = builder.build() {
			items.push(item);
		}
	}
	if let Some(refresh_token) = &response.refresh_token {
		let mut builder = CacheItem::builder(requested.mrrt_key(), user_info.clone())
			.refresh_token(refresh_token);

		if let Some(family_id) = &response.family_id {
			builder = builder.family_id(family_id);
		}
		if let Ok(item) = builder.build() {
			items.push(item);
		}

		if let Some(family_id) = &response.family_id {
			let family_item = CacheItem::builder(requested.family_key(family_id), user_info.clone())
				.refresh_token(refresh_token)
				.family_id(family_id)
				.build();

			if let Ok(item) = family_item {
				items.push(item);
			}
		}
	}

	items
}

fn de_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	use serde::de::Error as DeError;

	#[derive(Deserialize)]
	#[serde(untagged)]
	enum NumberOrString {
		Number(i64),
		String(String),
	}

	match Option::<NumberOrString>::deserialize(deserializer)? {
		None => Ok(None),
		Some(NumberOrString::Number(value)) => Ok(Some(value)),
		Some(NumberOrString::String(value)) => value
			.parse::<i64>()
			.map(Some)
			.map_err(|_| DeError::custom(format!("invalid expires_in value `{value}`"))),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::Authority;

	fn requested_key() -> CacheKey {
		CacheKey::new(
			Authority::new("https://login.example.com/tenant")
				.expect("Authority fixture should be valid."),
			Some("https://graph.example.com"),
			"client-1",
		)
	}

	#[test]
	fn refresh_request_renders_expected_form_fields() {
		let endpoint = Url::parse("https://login.example.com/tenant/oauth2/token")
			.expect("Endpoint fixture should parse successfully.");
		let request = TokenRequest::refresh_token(
			"client-1",
			"refresh-secret",
			Some("https://graph.example.com".into()),
			None,
		)
		.into_http_request(&endpoint);
		let body = String::from_utf8(request.body).expect("Form body should be UTF-8.");

		assert!(body.contains("grant_type=refresh_token"));
		assert!(body.contains("client_id=client-1"));
		assert!(body.contains("refresh_token=refresh-secret"));
		assert!(body.contains("resource=https%3A%2F%2Fgraph.example.com"));
	}

	#[test]
	fn code_request_carries_redirect_and_claims() {
		let endpoint = Url::parse("https://login.example.com/tenant/oauth2/token")
			.expect("Endpoint fixture should parse successfully.");
		let redirect = Url::parse("app://auth/callback")
			.expect("Redirect fixture should parse successfully.");
		let request = TokenRequest::authorization_code(
			"client-1",
			"auth-code",
			redirect,
			Some("resource".into()),
			Some("{\"access_token\":{}}".into()),
		)
		.into_http_request(&endpoint);
		let body = String::from_utf8(request.body).expect("Form body should be UTF-8.");

		assert!(body.contains("grant_type=authorization_code"));
		assert!(body.contains("code=auth-code"));
		assert!(body.contains("redirect_uri=app%3A%2F%2Fauth%2Fcallback"));
		assert!(body.contains("claims="));
	}

	#[test]
	fn password_and_assertion_requests_use_their_own_fields() {
		let endpoint = Url::parse("https://login.example.com/tenant/oauth2/token")
			.expect("Endpoint fixture should parse successfully.");
		let password_body = String::from_utf8(
			TokenRequest::password("client-1", "ada@example.com", "hunter2", None)
				.into_http_request(&endpoint)
				.body,
		)
		.expect("Form body should be UTF-8.");
		let assertion_body = String::from_utf8(
			TokenRequest::jwt_bearer("client-1", "signed.jwt.assertion", None)
				.into_http_request(&endpoint)
				.body,
		)
		.expect("Form body should be UTF-8.");

		assert!(password_body.contains("grant_type=password"));
		assert!(password_body.contains("username=ada%40example.com"));
		assert!(password_body.contains("password=hunter2"));
		assert!(
			assertion_body
				.contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer")
		);
		assert!(assertion_body.contains("assertion=signed.jwt.assertion"));
	}

	#[test]
	fn error_bodies_map_to_server_errors() {
		let body = br#"{"error":"invalid_grant","error_description":"Expired.","error_codes":[70002]}"#;
		let err = parse_token_response(400, body)
			.expect_err("Error body must surface as a server error.");

		match err {
			Error::Server(server) => {
				assert_eq!(server.code, "invalid_grant");
				assert_eq!(server.error_codes, vec![70002]);
				assert!(server.requires_user_interaction());
			},
			other => panic!("Expected a server error, got {other:?}."),
		}
	}

	#[test]
	fn string_expires_in_is_accepted() {
		let body = br#"{"access_token":"at","token_type":"Bearer","expires_in":"3599"}"#;
		let response =
			parse_token_response(200, body).expect("String expires_in should parse successfully.");

		assert_eq!(response.expires_in, Some(3599));
	}

	#[test]
	fn credential_free_bodies_are_transient_errors() {
		let err = parse_token_response(200, br#"{"token_type":"Bearer"}"#)
			.expect_err("A body with no credential must be rejected.");

		assert!(matches!(err, Error::Transient(TransientError::TokenEndpoint { .. })));
	}

	#[test]
	fn cache_items_trust_the_response_resource() {
		let response = TokenResponse {
			access_token: Some("at".into()),
			token_type: Some("Bearer".into()),
			expires_in: Some(3600),
			refresh_token: Some("rt".into()),
			id_token: None,
			resource: Some("https://other.example.com".into()),
			family_id: Some("1".into()),
		};
		let user = UserInfo::new("ada@example.com", true);
		let items = cache_items_from_response(
			&response,
			&requested_key(),
			&user,
			OffsetDateTime::now_utc(),
		);

		assert_eq!(items.len(), 3);
		assert_eq!(items[0].key.resource.as_deref(), Some("https://other.example.com"));
		assert!(items[1].is_multi_resource_refresh_token());
		assert!(items[2].is_family_refresh_token());
		assert!(items[2].key.is_family_key());
	}
}
