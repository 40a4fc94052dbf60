//! Versioned whole-cache snapshot format.

// self
use crate::{
	_prelude::*,
	auth::CacheItem,
	cache::{CacheState, StorageError, WipeMarker},
};

/// Snapshot version this crate reads and writes.
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

/// Versioned container persisted to secure storage.
///
/// The version is checked before the item list is interpreted; an unknown or
/// future version fails closed instead of attempting a partial load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheSnapshot {
	/// Snapshot format version.
	pub version: u32,
	/// Wipe tombstone carried across processes sharing the storage.
	pub wipe_marker: Option<WipeMarker>,
	/// Every cached item at capture time.
	pub items: Vec<CacheItem>,
}
impl CacheSnapshot {
	pub(crate) fn capture(state: &CacheState) -> Self {
		Self {
			version: CURRENT_SNAPSHOT_VERSION,
			wipe_marker: state.wipe_marker.clone(),
			items: state.items.values().cloned().collect(),
		}
	}

	pub(crate) fn into_state(self) -> CacheState {
		CacheState {
			items: self
				.items
				.into_iter()
				.map(|item| ((item.key.clone(), item.user_info.normalized_id()), item))
				.collect(),
			wipe_marker: self.wipe_marker,
		}
	}

	/// Encodes the snapshot as JSON bytes.
	pub fn encode(&self) -> Result<Vec<u8>, StorageError> {
		serde_json::to_vec(self).map_err(|e| StorageError::Serialization {
			message: format!("Failed to encode cache snapshot: {e}"),
		})
	}

	/// Decodes snapshot bytes, failing closed on unknown versions.
	pub fn decode(bytes: &[u8]) -> Result<Self, StorageError> {
		#[derive(Deserialize)]
		struct VersionProbe {
			version: u32,
		}

		let probe: VersionProbe =
			serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization {
				message: format!("Failed to read cache snapshot header: {e}"),
			})?;

		if probe.version != CURRENT_SNAPSHOT_VERSION {
			return Err(StorageError::UnsupportedSnapshotVersion { version: probe.version });
		}

		let deserializer = &mut serde_json::Deserializer::from_slice(bytes);

		serde_path_to_error::deserialize(deserializer).map_err(|e| StorageError::Serialization {
			message: format!("Failed to decode cache snapshot: {e}"),
		})
	}
}
