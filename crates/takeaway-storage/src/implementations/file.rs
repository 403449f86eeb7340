//! File-based storage backend.
//!
//! Each key is one file in the storage directory. Writes go to a temporary
//! file that is renamed over the target, so readers never see a partial
//! document. Writers serialize on an exclusive `fs2` lock on `.lock` in the
//! same directory, which makes compare-and-swap atomic across tasks and
//! across processes sharing the directory. Key scans only list file names;
//! no document is read.

use crate::{scan_upper_bound, StorageError, StorageInterface};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use takeaway_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

const LOCK_FILE: &str = ".lock";
const EXTENSION: &str = "bin";

/// File-based storage implementation.
#[derive(Debug, Clone)]
pub struct FileStorage {
	base_path: PathBuf,
}

/// Encodes a key into a file name that cannot escape the base directory.
///
/// ASCII alphanumerics, `-` and `_` are kept, every other byte becomes `%XX`.
fn encode_key(key: &str) -> String {
	let mut out = String::with_capacity(key.len());
	for byte in key.bytes() {
		if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
			out.push(byte as char);
		} else {
			out.push_str(&format!("%{:02X}", byte));
		}
	}
	out
}

fn decode_key(name: &str) -> Option<String> {
	let bytes = name.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] == b'%' {
			let hex = name.get(i + 1..i + 3)?;
			out.push(u8::from_str_radix(hex, 16).ok()?);
			i += 3;
		} else {
			out.push(bytes[i]);
			i += 1;
		}
	}
	String::from_utf8(out).ok()
}

fn backend_err(e: impl std::fmt::Display) -> StorageError {
	StorageError::Backend(e.to_string())
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
	match fs::read(path) {
		Ok(data) => Ok(Some(data)),
		Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
		Err(e) => Err(backend_err(e)),
	}
}

impl FileStorage {
	/// Creates a storage rooted at `base_path`. The directory is created on
	/// first write.
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	fn path_for(&self, key: &str) -> PathBuf {
		self.base_path
			.join(format!("{}.{}", encode_key(key), EXTENSION))
	}

	/// Runs `f` on a blocking thread while holding the directory lock.
	async fn with_lock<T, F>(&self, f: F) -> Result<T, StorageError>
	where
		T: Send + 'static,
		F: FnOnce(&Path) -> Result<T, StorageError> + Send + 'static,
	{
		let base = self.base_path.clone();
		tokio::task::spawn_blocking(move || {
			fs::create_dir_all(&base).map_err(backend_err)?;
			let lock: File = OpenOptions::new()
				.create(true)
				.truncate(false)
				.write(true)
				.open(base.join(LOCK_FILE))
				.map_err(backend_err)?;
			lock.lock_exclusive().map_err(backend_err)?;
			let result = f(&base);
			if let Err(e) = FileExt::unlock(&lock) {
				tracing::warn!(error = %e, "Failed to release storage lock");
			}
			result
		})
		.await
		.map_err(backend_err)?
	}
}

/// Writes through a temporary file and renames it into place.
fn write_atomic(path: &Path, value: &[u8]) -> Result<(), StorageError> {
	let temp_path = path.with_extension("tmp");
	fs::write(&temp_path, value).map_err(backend_err)?;
	fs::rename(&temp_path, path).map_err(backend_err)
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		match tokio::fs::read(self.path_for(key)).await {
			Ok(data) => Ok(data),
			Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
			Err(e) => Err(backend_err(e)),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.path_for(key);
		self.with_lock(move |_| write_atomic(&path, &value)).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		tokio::fs::try_exists(self.path_for(key))
			.await
			.map_err(backend_err)
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let path = self.path_for(key);
		let expected = expected.map(<[u8]>::to_vec);
		self.with_lock(move |_| {
			let current = read_optional(&path)?;
			if current != expected {
				return Ok(false);
			}
			write_atomic(&path, &value)?;
			Ok(true)
		})
		.await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.path_for(key);
		self.with_lock(move |_| match fs::remove_file(&path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(backend_err(e)),
		})
		.await
	}

	async fn scan_keys(
		&self,
		prefix: &str,
		before: Option<&str>,
		limit: usize,
	) -> Result<Vec<String>, StorageError> {
		let base = self.base_path.clone();
		let prefix = prefix.to_string();
		let upper = scan_upper_bound(&prefix, before);
		tokio::task::spawn_blocking(move || {
			let entries = match fs::read_dir(&base) {
				Ok(entries) => entries,
				Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
				Err(e) => return Err(backend_err(e)),
			};

			let mut keys = Vec::new();
			for entry in entries {
				let path = entry.map_err(backend_err)?.path();
				if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
					continue;
				}
				let Some(key) = path
					.file_stem()
					.and_then(|s| s.to_str())
					.and_then(decode_key)
				else {
					tracing::debug!(path = %path.display(), "Skipping file with undecodable name");
					continue;
				};
				if key.starts_with(&prefix) && key < upper {
					keys.push(key);
				}
			}
			keys.sort_unstable_by(|a, b| b.cmp(a));
			keys.truncate(limit);
			Ok(keys)
		})
		.await
		.map_err(backend_err)?
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn ping(&self) -> Result<(), StorageError> {
		self.with_lock(|base| fs::metadata(base).map(|_| ()).map_err(backend_err))
			.await
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String)
				.with_validator(takeaway_types::validation::non_empty)],
		)
		.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for order files (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl takeaway_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}
