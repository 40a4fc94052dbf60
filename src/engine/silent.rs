//! Silent acquisition chain: cache lookup, refresh exchange, family fallback.

// self
use crate::{
	_prelude::*,
	auth::{CacheItem, CacheKey, TokenSecret, UserInfo},
	engine::{AcquisitionEngine, AcquisitionRequest},
	error::TransientError,
	oauth::{self, TokenRequest, TokenResponse},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

impl AcquisitionEngine {
	/// Runs the silent chain for `request`.
	///
	/// Step order is fixed: non-expired access token, per-client refresh token
	/// (exact-resource key first, then the MRRT key), family refresh token.
	/// A per-client rejection (`invalid_grant` / `interaction_required`) opens
	/// the family fallback; any other exchange failure is final so outages are
	/// never masked behind a sign-in prompt. When both refresh paths fail the
	/// per-client error is the one surfaced; the family exchange is shared
	/// infrastructure whose failures are less actionable to the caller.
	pub(crate) async fn acquire_silently(&self, request: &AcquisitionRequest) -> Result<CacheItem> {
		let key = request.cache_key();
		let user = request.user_id.as_deref();
		let now = OffsetDateTime::now_utc();
		let exact = self.cache.get(&key, user)?;

		if let Some(item) = &exact
			&& item.access_token.is_some()
			&& !item.is_expired_at(now, self.settings().expiration_buffer)
		{
			self.metrics.record_cache_hit();

			return Ok(item.clone());
		}

		let refresh_item = match exact.filter(|item| item.refresh_token.is_some()) {
			Some(item) => Some(item),
			None =>
				self.cache.get(&key.mrrt_key(), user)?.filter(|item| item.refresh_token.is_some()),
		};
		let per_client_error = match refresh_item {
			Some(item) =>
				match self.redeem_refresh_token(request, &key, &item, FlowKind::Refresh).await {
					Ok(renewed) => return Ok(renewed),
					Err(err) => {
						let recoverable = matches!(
							&err,
							Error::Server(server) if server.requires_user_interaction()
						);

						if !recoverable {
							return Err(err);
						}

						// A rejected refresh token is dropped so later attempts
						// do not replay a credential the server already refused.
						if matches!(&err, Error::Server(server) if server.code == "invalid_grant") {
							self.cache.remove(&item)?;
						}

						err
					},
				},
			None => Error::UserInputNeeded,
		};

		if let Some(family_item) = self.find_family_refresh_token(request, &key)?
			&& let Ok(renewed) = self
				.redeem_refresh_token(request, &key, &family_item, FlowKind::FamilyRefresh)
				.await
		{
			return Ok(renewed);
		}

		Err(per_client_error)
	}

	/// Scans the cache for a family refresh token usable for `request`.
	fn find_family_refresh_token(
		&self,
		request: &AcquisitionRequest,
		key: &CacheKey,
	) -> Result<Option<CacheItem>> {
		let mut candidates: Vec<CacheItem> = self
			.cache
			.get_all(None, request.user_id.as_deref())
			.into_iter()
			.filter(|item| {
				item.key.authority == key.authority
					&& item.key.is_family_key()
					&& item.is_family_refresh_token()
					&& item.refresh_token.is_some()
			})
			.collect();

		// Without a user filter a multi-user cache could yield family tokens
		// from different subjects; skip the fallback instead of guessing.
		if request.user_id.is_none() {
			let mut users: Vec<String> =
				candidates.iter().map(|item| item.user_info.normalized_id()).collect();

			users.sort();
			users.dedup();

			if users.len() > 1 {
				return Ok(None);
			}
		}

		Ok(candidates.pop())
	}

	/// Exchanges `item`'s refresh token at the token endpoint and replaces the
	/// affected cache entries with the response.
	async fn redeem_refresh_token(
		&self,
		request: &AcquisitionRequest,
		key: &CacheKey,
		item: &CacheItem,
		kind: FlowKind,
	) -> Result<CacheItem> {
		let span = FlowSpan::new(kind, "redeem_refresh_token");

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		match kind {
			FlowKind::FamilyRefresh => self.metrics.record_family_exchange(),
			_ => self.metrics.record_refresh_exchange(),
		}

		let result = span
			.instrument(async move {
				let refresh = item
					.refresh_token
					.as_ref()
					.ok_or_else(|| Error::internal("refresh item carries no refresh token"))?;
				let http_request = TokenRequest::refresh_token(
					&request.client_id,
					refresh.expose(),
					Some(request.resource.clone()),
					request.claims.clone(),
				)
				.into_http_request(request.authority.token_endpoint());
				let response = self
					.transport
					.execute(http_request, self.settings().request_timeout)
					.await?;
				let token_response = oauth::parse_token_response(response.status, &response.body)?;

				self.commit_token_response(
					&token_response,
					key,
					&item.user_info,
					item.refresh_token.as_ref(),
				)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
		}

		result
	}

	/// Writes a token response into the cache and returns the access item.
	///
	/// The response's resource wins over the requested one, and a refresh
	/// token absent from the response is carried forward from `prior_refresh`
	/// so a non-rotating exchange never drops a usable credential.
	pub(crate) fn commit_token_response(
		&self,
		response: &TokenResponse,
		requested: &CacheKey,
		fallback_user: &UserInfo,
		prior_refresh: Option<&TokenSecret>,
	) -> Result<CacheItem> {
		let now = OffsetDateTime::now_utc();
		let mut items =
			oauth::cache_items_from_response(response, requested, fallback_user, now);

		if response.refresh_token.is_none()
			&& let Some(prior) = prior_refresh
		{
			for item in items.iter_mut().filter(|item| item.access_token.is_some()) {
				item.refresh_token = Some(prior.clone());
			}
		}

		let access_item = items.iter().find(|item| item.access_token.is_some()).cloned();

		for item in items {
			self.cache.add_or_update(item)?;
		}

		access_item.ok_or_else(|| {
			TransientError::TokenEndpoint {
				message: "Exchange succeeded but returned no access token".into(),
				status: None,
			}
			.into()
		})
	}
}
