#![cfg(feature = "reqwest")]

mod common;

// std
use std::sync::Arc;
// crates.io
use httpmock::prelude::*;
// self
use common::*;
use directory_auth::{
	discovery::AuthorityValidator,
	engine::{AcquisitionRequest, EngineSettings},
	error::Error,
	http::ReqwestTransport,
};

fn trusted_host(server: &MockServer) -> String {
	format!("127.0.0.1:{}", server.port())
}

#[tokio::test]
async fn discovery_validates_once_and_caches_the_verdict() {
	let server = MockServer::start_async().await;
	let authority = mock_authority(&server);
	let discovery_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/common/discovery/instance")
				.query_param("api-version", "1.1");
			then.status(200).header("content-type", "application/json").body(
				r#"{
					"tenant_discovery_endpoint": "https://login.example.com/tenant/.well-known/openid-configuration",
					"metadata": [{"aliases": ["127.0.0.1", "sts.example.com"]}]
				}"#,
			);
		})
		.await;
	let transport = Arc::new(ReqwestTransport::default());
	let validator = AuthorityValidator::new(transport, trusted_host(&server));

	let validated = validator
		.validate(&authority, None)
		.await
		.expect("Discovery should validate the loopback authority.");

	assert_eq!(validated.authority, authority);
	assert!(validated.tenant_discovery_endpoint.is_some());

	validator
		.validate(&authority, None)
		.await
		.expect("The cached verdict should satisfy the second call.");

	assert_eq!(discovery_mock.hits_async().await, 1);
	assert!(
		validator.record("sts.example.com").is_some(),
		"Alias hosts should be registered from the discovery metadata."
	);
}

#[tokio::test]
async fn rejected_authorities_block_acquisition_before_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let discovery_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/common/discovery/instance");
			then.status(400)
				.header("content-type", "application/json")
				.body(r#"{"error":"invalid_instance","error_description":"Unknown host."}"#);
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/tenant/oauth2/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_success_body("never-issued", None, None));
		})
		.await;
	let ui = ScriptedUi::new([]);
	let (engine, cache) = build_engine(ui.clone());
	let engine = engine.with_settings(EngineSettings {
		validate_authority: true,
		..Default::default()
	});

	seed_mrrt(&cache, &mock_authority(&server), "refresh");

	let request = AcquisitionRequest::new(mock_authority(&server), RESOURCE, CLIENT_ID)
		.with_user(USER)
		.with_trusted_hint(trusted_host(&server));
	let outcome = engine.acquire_silent(request).await;

	assert!(matches!(outcome.error(), Some(Error::AuthorityValidationFailed { .. })));
	assert_eq!(discovery_mock.hits_async().await, 1);
	assert_eq!(
		token_mock.hits_async().await,
		0,
		"A rejected authority must never reach the token endpoint."
	);
}
