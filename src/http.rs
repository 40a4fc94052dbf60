//! Transport collaborator contract for authority round-trips.
//!
//! The core never opens sockets: it builds [`HttpRequest`] descriptors,
//! hands them to an [`HttpTransport`] implementation, and consumes the
//! [`HttpResponse`] descriptors that come back. The default reqwest-backed
//! transport lives behind `feature = "reqwest"`.

// self
use crate::{_prelude::*, error::TransportError};

/// HTTP methods the core issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
	/// Idempotent metadata fetch (instance discovery).
	Get,
	/// Form-encoded token endpoint exchange.
	Post,
}

/// Outbound request descriptor built by the core.
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// Request method.
	pub method: HttpMethod,
	/// Fully-formed request URL.
	pub url: Url,
	/// Header name/value pairs.
	pub headers: Vec<(String, String)>,
	/// Raw request body; empty for GET requests.
	pub body: Vec<u8>,
}
impl HttpRequest {
	/// Builds a GET request with no body.
	pub fn get(url: Url) -> Self {
		Self {
			method: HttpMethod::Get,
			url,
			headers: vec![("Accept".into(), "application/json".into())],
			body: Vec::new(),
		}
	}

	/// Builds a form-encoded POST request from the provided pairs.
	pub fn post_form<'p>(url: Url, pairs: impl IntoIterator<Item = (&'p str, &'p str)>) -> Self {
		let body = url::form_urlencoded::Serializer::new(String::new())
			.extend_pairs(pairs)
			.finish()
			.into_bytes();

		Self {
			method: HttpMethod::Post,
			url,
			headers: vec![
				("Accept".into(), "application/json".into()),
				("Content-Type".into(), "application/x-www-form-urlencoded".into()),
			],
			body,
		}
	}
}

/// Inbound response descriptor consumed by the core.
#[derive(Clone, Debug)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Header name/value pairs as returned by the transport.
	pub headers: Vec<(String, String)>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Boxed future returned by [`HttpTransport`] implementations.
pub type TransportFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, TransportError>> + 'a + Send>>;

/// Transport contract implemented outside the core.
///
/// Implementations honor the caller-configured `timeout` per request and
/// surface it as [`TransportError::Timeout`], a connection-error result rather
/// than a crash. There is no mid-flight cancellation of a dispatched request;
/// cancellation only prevents new steps from starting.
pub trait HttpTransport
where
	Self: Send + Sync,
{
	/// Executes one request and resolves with the response descriptor.
	fn execute(&self, request: HttpRequest, timeout: Option<Duration>)
	-> TransportFuture<'_, HttpResponse>;
}

/// Default transport backed by [`ReqwestClient`].
///
/// Redirect following should stay disabled on any custom client passed in:
/// token endpoints return results directly instead of delegating to another
/// URI.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(
		&self,
		request: HttpRequest,
		timeout: Option<Duration>,
	) -> TransportFuture<'_, HttpResponse> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = match request.method {
				HttpMethod::Get => client.get(request.url.clone()),
				HttpMethod::Post => client.post(request.url.clone()).body(request.body.clone()),
			};

			for (name, value) in &request.headers {
				builder = builder.header(name, value);
			}
			if let Some(timeout) = timeout {
				builder = builder
					.timeout(std::time::Duration::from_millis(
						timeout.whole_milliseconds().max(0) as u64,
					));
			}

			let response = builder.send().await.map_err(|e| {
				if e.is_timeout() {
					TransportError::Timeout { timeout: timeout.unwrap_or(Duration::ZERO) }
				} else {
					TransportError::network(e)
				}
			})?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.map(|(name, value)| {
					(name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned())
				})
				.collect();
			let body = response.bytes().await.map_err(TransportError::network)?.to_vec();

			Ok(HttpResponse { status, headers, body })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn post_form_encodes_pairs_and_headers() {
		let url = Url::parse("https://login.example.com/tenant/oauth2/token")
			.expect("Token endpoint fixture should parse successfully.");
		let request = HttpRequest::post_form(
			url,
			[("grant_type", "refresh_token"), ("resource", "https://graph.example.com/")],
		);

		assert_eq!(request.method, HttpMethod::Post);
		assert_eq!(
			String::from_utf8(request.body).expect("Form body should be UTF-8."),
			"grant_type=refresh_token&resource=https%3A%2F%2Fgraph.example.com%2F"
		);
		assert!(
			request
				.headers
				.iter()
				.any(|(name, value)| name == "Content-Type"
					&& value == "application/x-www-form-urlencoded")
		);
	}

	#[test]
	fn status_classification_covers_the_2xx_range() {
		let ok = HttpResponse { status: 200, headers: Vec::new(), body: Vec::new() };
		let redirect = HttpResponse { status: 302, headers: Vec::new(), body: Vec::new() };
		let error = HttpResponse { status: 400, headers: Vec::new(), body: Vec::new() };

		assert!(ok.is_success());
		assert!(!redirect.is_success());
		assert!(!error.is_success());
	}
}
