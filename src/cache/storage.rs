//! Secure storage collaborator contract and built-in implementations.
//!
//! OS keychains implement the same trait outside this crate; the cache only
//! produces and consumes opaque snapshot bytes.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{_prelude::*, cache::StorageError};

/// Opaque named-blob persistence contract for cache snapshots.
pub trait SecureStorage
where
	Self: Send + Sync,
{
	/// Returns the stored snapshot bytes, if any.
	fn load(&self) -> Result<Option<Vec<u8>>, StorageError>;

	/// Persists or replaces the snapshot bytes.
	fn save(&self, bytes: &[u8]) -> Result<(), StorageError>;

	/// Deletes the stored snapshot; deleting a missing blob is not an error.
	fn delete(&self) -> Result<(), StorageError>;
}

/// In-process storage backend for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryStorage(Mutex<Option<Vec<u8>>>);
impl SecureStorage for MemoryStorage {
	fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
		Ok(self.0.lock().clone())
	}

	fn save(&self, bytes: &[u8]) -> Result<(), StorageError> {
		*self.0.lock() = Some(bytes.to_vec());

		Ok(())
	}

	fn delete(&self) -> Result<(), StorageError> {
		*self.0.lock() = None;

		Ok(())
	}
}

/// File-backed storage for lightweight deployments.
///
/// Writes go through a temporary sibling file and an atomic rename so a crash
/// mid-write never leaves a truncated snapshot behind.
#[derive(Clone, Debug)]
pub struct FileStorage {
	path: PathBuf,
}
impl FileStorage {
	/// Creates a storage backend rooted at the provided path.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StorageError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StorageError::Backend {
				message: format!("Failed to create storage directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}
}
impl SecureStorage for FileStorage {
	fn load(&self) -> Result<Option<Vec<u8>>, StorageError> {
		if !self.path.exists() {
			return Ok(None);
		}

		let bytes = fs::read(&self.path).map_err(|e| StorageError::Backend {
			message: format!("Failed to read {}: {e}", self.path.display()),
		})?;

		if bytes.is_empty() { Ok(None) } else { Ok(Some(bytes)) }
	}

	fn save(&self, bytes: &[u8]) -> Result<(), StorageError> {
		Self::ensure_parent_exists(&self.path)?;

		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StorageError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(bytes).map_err(|e| StorageError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StorageError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StorageError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn delete(&self) -> Result<(), StorageError> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend {
				message: format!("Failed to delete {}: {e}", self.path.display()),
			}),
		}
	}
}
