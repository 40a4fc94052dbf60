//! Client-side OAuth 2.0/OIDC token acquisition for directory identity providers—silent-first
//! flows, MRRT/FRT fallback caching, and encrypted broker handoffs in one crate built for
//! production.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod broker;
pub mod cache;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod http;
pub mod lock;
pub mod oauth;
pub mod obs;
pub mod ui;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		cache::TokenCache,
		discovery::AuthorityValidator,
		engine::{AcquisitionEngine, EngineSettings},
		http::ReqwestTransport,
		ui::{AuthorizationOutcome, AuthorizationUi, UiFuture},
	};

	/// UI collaborator that replays scripted outcomes without rendering anything.
	pub struct ScriptedUi {
		outcomes: Mutex<Vec<AuthorizationOutcome>>,
		invocations: Mutex<usize>,
	}
	impl ScriptedUi {
		/// Queues outcomes returned by successive `start_authorization` calls.
		pub fn new(outcomes: impl IntoIterator<Item = AuthorizationOutcome>) -> Self {
			Self {
				outcomes: Mutex::new(outcomes.into_iter().collect()),
				invocations: Mutex::new(0),
			}
		}

		/// Number of times the UI collaborator was invoked.
		pub fn invocations(&self) -> usize {
			*self.invocations.lock()
		}
	}
	impl AuthorizationUi for ScriptedUi {
		fn start_authorization(&self, _start_url: Url, _redirect_uri: Url) -> UiFuture<'_> {
			*self.invocations.lock() += 1;

			let outcome = {
				let mut outcomes = self.outcomes.lock();

				if outcomes.is_empty() {
					AuthorizationOutcome::Failed {
						code: "scripted_ui_exhausted".into(),
						description: Some("No scripted outcome remains.".into()),
					}
				} else {
					outcomes.remove(0)
				}
			};

			Box::pin(async move { outcome })
		}
	}

	/// Constructs an engine over a reqwest transport, an in-memory cache, and the
	/// provided scripted UI, with authority validation disabled for tests.
	pub fn build_reqwest_test_engine(ui: Arc<ScriptedUi>) -> (AcquisitionEngine, Arc<TokenCache>) {
		let cache = Arc::new(TokenCache::new());
		let transport = Arc::new(ReqwestTransport::default());
		let validator = Arc::new(AuthorityValidator::new(transport.clone(), "localhost"));
		let settings = EngineSettings { validate_authority: false, ..Default::default() };
		let engine = AcquisitionEngine::new(cache.clone(), validator, transport, ui)
			.with_settings(settings);

		(engine, cache)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tokio as _};
