//! Thread-safe token cache with uniqueness, ambiguity, and persistence rules.

pub mod snapshot;
pub mod storage;

pub use snapshot::*;
pub use storage::*;

// std
use std::collections::BTreeMap;
// self
use crate::{
	_prelude::*,
	auth::{CacheItem, CacheKey, normalize_user_id},
};

/// Error type produced by cache storage and snapshot operations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StorageError {
	/// Snapshot encoding/decoding failure.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// The snapshot declares a version this crate does not understand.
	///
	/// Deserialization fails closed rather than attempting a partial load.
	#[error("Cache snapshot version {version} is not supported.")]
	UnsupportedSnapshotVersion {
		/// Declared snapshot version.
		version: u32,
	},
}

/// Tombstone recorded by [`TokenCache::wipe_all_for_user`], signaling a
/// cross-app cache invalidation to other consumers of the same storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipeMarker {
	/// Identifier of the application that requested the wipe.
	pub wiped_by: String,
	/// Instant the wipe was performed.
	pub wiped_at: OffsetDateTime,
	/// Number of items the wipe removed.
	pub removed: usize,
}

type ItemMap = BTreeMap<(CacheKey, String), CacheItem>;

#[derive(Clone, Debug, Default)]
pub(crate) struct CacheState {
	pub(crate) items: ItemMap,
	pub(crate) wipe_marker: Option<WipeMarker>,
}

/// Thread-safe store of [`CacheItem`]s keyed by `(CacheKey, user id)`.
///
/// Reads run concurrently; writes are serialized by the lock. After every
/// successful write the cache snapshots itself to the optional
/// [`SecureStorage`] collaborator outside the lock, best-effort: a persistence
/// failure is logged and the in-memory state remains authoritative.
pub struct TokenCache {
	inner: RwLock<CacheState>,
	storage: Option<Arc<dyn SecureStorage>>,
}
impl TokenCache {
	/// Creates an empty in-memory cache without a persistence collaborator.
	pub fn new() -> Self {
		Self { inner: RwLock::new(CacheState::default()), storage: None }
	}

	/// Creates a cache backed by the provided storage collaborator, eagerly
	/// loading any snapshot it holds. An incompatible snapshot version fails
	/// the load rather than discarding data silently.
	pub fn with_storage(storage: Arc<dyn SecureStorage>) -> Result<Self, StorageError> {
		let state = match storage.load()? {
			Some(bytes) => CacheSnapshot::decode(&bytes)?.into_state(),
			None => CacheState::default(),
		};

		Ok(Self { inner: RwLock::new(state), storage: Some(storage) })
	}

	/// Fetches the item stored under `key` for `user_id`.
	///
	/// A lookup without a user id that matches items belonging to more than
	/// one distinct user fails with [`Error::AmbiguousUser`]; the cache never
	/// guesses which user the caller meant.
	pub fn get(&self, key: &CacheKey, user_id: Option<&str>) -> Result<Option<CacheItem>> {
		let state = self.inner.read();

		match user_id {
			Some(user_id) =>
				Ok(state.items.get(&(key.clone(), normalize_user_id(user_id))).cloned()),
			None => {
				let mut matches: Vec<&CacheItem> = state
					.items
					.iter()
					.filter(|((item_key, _), _)| item_key == key)
					.map(|(_, item)| item)
					.collect();
				let distinct_users = {
					let mut ids: Vec<String> =
						matches.iter().map(|item| item.user_info.normalized_id()).collect();

					ids.sort();
					ids.dedup();
					ids.len()
				};

				if distinct_users > 1 {
					return Err(Error::AmbiguousUser { matches: distinct_users });
				}

				Ok(matches.pop().cloned())
			},
		}
	}

	/// Enumerates items matching the optional key and user filters.
	///
	/// This is the unrestricted variant used for MRRT/FRT scans; it never
	/// raises ambiguity errors.
	pub fn get_all(&self, key: Option<&CacheKey>, user_id: Option<&str>) -> Vec<CacheItem> {
		let normalized_user = user_id.map(normalize_user_id);
		let state = self.inner.read();

		state
			.items
			.iter()
			.filter(|((item_key, item_user), _)| {
				key.is_none_or(|key| item_key == key)
					&& normalized_user.as_deref().is_none_or(|user| item_user == user)
			})
			.map(|(_, item)| item.clone())
			.collect()
	}

	/// Inserts `item`, atomically replacing any existing item that shares its
	/// `(key, user)` pair.
	pub fn add_or_update(&self, item: CacheItem) -> Result<()> {
		{
			let mut state = self.inner.write();

			state.items.insert((item.key.clone(), item.user_info.normalized_id()), item);
		}

		self.persist_best_effort();

		Ok(())
	}

	/// Removes `item` if present; removing a non-existent item is not an error.
	pub fn remove(&self, item: &CacheItem) -> Result<()> {
		{
			let mut state = self.inner.write();

			state.items.remove(&(item.key.clone(), item.user_info.normalized_id()));
		}

		self.persist_best_effort();

		Ok(())
	}

	/// Removes every item issued to `client_id`, returning the removed count.
	pub fn remove_all_for_client(&self, client_id: &str) -> usize {
		let removed = {
			let mut state = self.inner.write();
			let before = state.items.len();

			state.items.retain(|(key, _), _| key.client_id != client_id);

			before - state.items.len()
		};

		if removed > 0 {
			self.persist_best_effort();
		}

		removed
	}

	/// Removes every item for `user_id` issued to `client_id`.
	pub fn remove_all_for_user(&self, user_id: &str, client_id: &str) -> usize {
		let normalized = normalize_user_id(user_id);
		let removed = {
			let mut state = self.inner.write();
			let before = state.items.len();

			state
				.items
				.retain(|(key, user), _| key.client_id != client_id || *user != normalized);

			before - state.items.len()
		};

		if removed > 0 {
			self.persist_best_effort();
		}

		removed
	}

	/// Removes every item for `user_id` across all clients and records a
	/// [`WipeMarker`] naming `wiped_by` so other consumers of the same storage
	/// can observe the invalidation.
	pub fn wipe_all_for_user(&self, user_id: &str, wiped_by: impl Into<String>) -> usize {
		let normalized = normalize_user_id(user_id);
		let removed = {
			let mut state = self.inner.write();
			let before = state.items.len();

			state.items.retain(|(_, user), _| *user != normalized);

			let removed = before - state.items.len();

			state.wipe_marker = Some(WipeMarker {
				wiped_by: wiped_by.into(),
				wiped_at: OffsetDateTime::now_utc(),
				removed,
			});

			removed
		};

		self.persist_best_effort();

		removed
	}

	/// Returns the most recent wipe tombstone, if any.
	pub fn wipe_marker(&self) -> Option<WipeMarker> {
		self.inner.read().wipe_marker.clone()
	}

	/// Removes every item and the wipe marker.
	pub fn clear(&self) {
		{
			let mut state = self.inner.write();

			state.items.clear();
			state.wipe_marker = None;
		}

		self.persist_best_effort();
	}

	/// Number of items currently cached.
	pub fn len(&self) -> usize {
		self.inner.read().items.len()
	}

	/// Returns `true` when the cache holds no items.
	pub fn is_empty(&self) -> bool {
		self.inner.read().items.is_empty()
	}

	/// Snapshots the whole cache into the versioned wire format.
	pub fn serialize(&self) -> Result<Vec<u8>, StorageError> {
		CacheSnapshot::capture(&self.inner.read()).encode()
	}

	/// Replaces the in-memory state with a decoded snapshot.
	///
	/// State is only replaced when decoding succeeds; a malformed or
	/// incompatible snapshot leaves the cache untouched.
	pub fn deserialize(&self, bytes: &[u8]) -> Result<(), StorageError> {
		let state = CacheSnapshot::decode(bytes)?.into_state();

		*self.inner.write() = state;

		Ok(())
	}

	fn persist_best_effort(&self) {
		let Some(storage) = &self.storage else {
			return;
		};
		let encoded = CacheSnapshot::capture(&self.inner.read()).encode();

		match encoded {
			Ok(bytes) =>
				if let Err(err) = storage.save(&bytes) {
					log_persist_failure(&err);
				},
			Err(err) => log_persist_failure(&err),
		}
	}
}
impl Default for TokenCache {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("items", &self.len())
			.field("persistent", &self.storage.is_some())
			.finish()
	}
}

fn log_persist_failure(err: &StorageError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %err, "Cache persistence failed; in-memory state remains authoritative.");
	#[cfg(not(feature = "tracing"))]
	let _ = err;
}
