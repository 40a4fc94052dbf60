//! Interactive fallback: exclusion lock, UI collaborator, code exchange.

// self
use crate::{
	_prelude::*,
	auth::CacheItem,
	broker::BrokerMessage,
	engine::{AcquisitionEngine, AcquisitionOutcome, AcquisitionRequest},
	error::{ArgumentError, ServerError},
	oauth::{self, TokenRequest},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	ui::{self, AuthorizationOutcome, ParsedRedirect},
};

impl AcquisitionEngine {
	/// Runs one interactive acquisition under the exclusion lock.
	///
	/// The lock is claimed with a single compare-and-swap before the UI
	/// collaborator is touched; contention fails immediately with
	/// [`Error::MultipleInteractiveRequests`]. The guard releases the slot on
	/// every exit path, including server errors, cancellation, and unwinds.
	pub(crate) async fn acquire_interactively(
		&self,
		request: &AcquisitionRequest,
	) -> AcquisitionOutcome {
		let Some(redirect_uri) = request.redirect_uri.clone() else {
			return AcquisitionOutcome::Failed(
				ArgumentError::Empty { name: "redirect_uri" }.into(),
			);
		};
		let request_id = self.next_request_id();
		let Some(_guard) = self.exclusion().try_acquire(request_id) else {
			return AcquisitionOutcome::Failed(Error::MultipleInteractiveRequests);
		};
		let span = FlowSpan::new(FlowKind::Interactive, "acquire_interactively");

		obs::record_flow_outcome(FlowKind::Interactive, FlowOutcome::Attempt);
		self.metrics.record_interactive_prompt();

		let outcome = span
			.instrument(async move {
				let state = ui::random_state();
				let start_url = ui::build_authorize_url(
					&request.authority,
					&request.client_id,
					Some(&request.resource),
					&redirect_uri,
					&state,
					request.login_hint.as_deref(),
					request.claims.as_deref(),
				);

				match self.ui.start_authorization(start_url, redirect_uri.clone()).await {
					AuthorizationOutcome::Cancelled => AcquisitionOutcome::Cancelled,
					AuthorizationOutcome::Failed { code, description } =>
						AcquisitionOutcome::Failed(
							ServerError {
								code,
								description,
								error_codes: Vec::new(),
								status: None,
							}
							.into(),
						),
					AuthorizationOutcome::Redirect(url) => {
						let parsed =
							ui::parse_redirect(&url, &state, &self.settings().broker_scheme);

						match parsed {
							Err(err) => AcquisitionOutcome::Failed(err),
							Ok(ParsedRedirect::Code(code)) => self
								.exchange_authorization_code(request, &redirect_uri, code)
								.await
								.map_or_else(
									AcquisitionOutcome::Failed,
									|item| AcquisitionOutcome::Succeeded(Box::new(item)),
								),
							Ok(ParsedRedirect::Broker(broker_url)) => self
								.complete_broker_redirect(request, &broker_url)
								.map_or_else(
									AcquisitionOutcome::Failed,
									|item| AcquisitionOutcome::Succeeded(Box::new(item)),
								),
						}
					},
				}
			})
			.await;

		match &outcome {
			AcquisitionOutcome::Succeeded(_) =>
				obs::record_flow_outcome(FlowKind::Interactive, FlowOutcome::Success),
			_ => obs::record_flow_outcome(FlowKind::Interactive, FlowOutcome::Failure),
		}

		outcome
	}

	/// Completes an acquisition from an out-of-band broker redirect.
	///
	/// Hosts receiving the broker's response URL directly (outside an
	/// in-process UI collaborator) validate and ingest it here; the cache is
	/// updated exactly as for an in-band exchange.
	pub fn acquire_with_broker_response(
		&self,
		request: &AcquisitionRequest,
		redirect: &Url,
	) -> AcquisitionOutcome {
		self.metrics.record_attempt();

		if let Err(err) = request.validate() {
			self.metrics.record_failure();

			return AcquisitionOutcome::Failed(err);
		}

		match self.complete_broker_redirect(request, redirect) {
			Ok(item) => {
				self.metrics.record_success();

				AcquisitionOutcome::Succeeded(Box::new(item))
			},
			Err(err) => {
				self.metrics.record_failure();

				AcquisitionOutcome::Failed(err)
			},
		}
	}

	async fn exchange_authorization_code(
		&self,
		request: &AcquisitionRequest,
		redirect_uri: &Url,
		code: String,
	) -> Result<CacheItem> {
		let http_request = TokenRequest::authorization_code(
			&request.client_id,
			code,
			redirect_uri.clone(),
			Some(request.resource.clone()),
			request.claims.clone(),
		)
		.into_http_request(request.authority.token_endpoint());
		let response =
			self.transport.execute(http_request, self.settings().request_timeout).await?;
		let token_response = oauth::parse_token_response(response.status, &response.body)?;

		self.commit_token_response(
			&token_response,
			&request.cache_key(),
			&request.fallback_user(),
			None,
		)
	}

	fn complete_broker_redirect(
		&self,
		request: &AcquisitionRequest,
		redirect: &Url,
	) -> Result<CacheItem> {
		let span = FlowSpan::new(FlowKind::BrokerExchange, "complete_broker_redirect");
		let _entered = span.entered();

		obs::record_flow_outcome(FlowKind::BrokerExchange, FlowOutcome::Attempt);

		let result = (|| {
			let key = self
				.broker_key()
				.ok_or_else(|| Error::internal("broker redirect received without a broker key"))?;
			let message = BrokerMessage::from_redirect_url(redirect)?;
			let response = self.broker_crypto().decrypt(&message, key)?;

			self.commit_token_response(
				&response,
				&request.cache_key(),
				&request.fallback_user(),
				None,
			)
		})();

		match &result {
			Ok(_) => obs::record_flow_outcome(FlowKind::BrokerExchange, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(FlowKind::BrokerExchange, FlowOutcome::Failure),
		}

		result
	}
}
