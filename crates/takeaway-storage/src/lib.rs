//! Storage module for the takeaway ordering system.
//!
//! Orders are kept as JSON documents in a key/value store. Backends only
//! deal with bytes; [`StorageService`] adds typed access on top. Every
//! backend supports an atomic compare-and-swap on a single key, which is the
//! only coordination the order lifecycle relies on.
//!
//! Listings go through secondary indexes: value-less keys of the form
//! `index:sort_key:id` that backends return in descending key order, a page
//! at a time, without reading any document.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use takeaway_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
	pub mod postgres;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// An insert-if-absent found the key already taken.
	#[error("Already exists: {0}")]
	AlreadyExists(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface implemented by every storage backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, overwriting any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Atomically replaces the value of `key` if it still equals `expected`.
	///
	/// `expected == None` means the key must be absent (insert-if-absent).
	/// Returns `false` without writing when the current value differs.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
	) -> Result<bool, StorageError>;

	/// Removes a key. Removing a missing key is not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Returns up to `limit` keys starting with `prefix`, in descending order.
	///
	/// With `before`, only keys strictly below it are returned, which pages
	/// through a prefix from the last key of the previous page.
	async fn scan_keys(
		&self,
		prefix: &str,
		before: Option<&str>,
		limit: usize,
	) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Checks that the backend answers.
	async fn ping(&self) -> Result<(), StorageError> {
		self.exists("health:ping").await.map(|_| ())
	}
}

/// Type alias for storage factory functions.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory, postgres};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
		(postgres::Registry::NAME, postgres::Registry::factory()),
	]
}

/// Exclusive upper bound of a descending key scan.
///
/// Without `before` this is the prefix followed by the highest code point,
/// which sorts above every key of the prefix in byte order.
pub(crate) fn scan_upper_bound(prefix: &str, before: Option<&str>) -> String {
	match before {
		Some(before) => before.to_string(),
		None => format!("{}{}", prefix, char::MAX),
	}
}

/// One entry of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
	key: String,
	/// Id of the indexed document.
	pub id: String,
}

impl IndexEntry {
	/// Full storage key of the entry.
	pub fn key(&self) -> &str {
		&self.key
	}
}

/// A decoded value together with the exact bytes it was read from.
///
/// The bytes are the token for a later [`StorageService::replace`].
#[derive(Debug, Clone)]
pub struct Versioned<T> {
	pub value: T,
	raw: Vec<u8>,
}

impl<T> Versioned<T> {
	/// Bytes the value was decoded from.
	pub fn raw(&self) -> &[u8] {
		&self.raw
	}
}

/// Typed storage operations on top of a [`StorageInterface`] backend.
///
/// Values are serialized as JSON and addressed by `namespace:id`.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

fn key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a value, overwriting any previous one.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.backend
			.set_bytes(&key(namespace, id), encode(data)?)
			.await
	}

	/// Stores a value only if nothing is stored under the key yet.
	pub async fn insert_new<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = key(namespace, id);
		if self
			.backend
			.compare_and_swap(&key, None, encode(data)?)
			.await?
		{
			Ok(())
		} else {
			Err(StorageError::AlreadyExists(key))
		}
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&key(namespace, id)).await?;
		decode(&bytes)
	}

	/// Retrieves a value along with the bytes needed to replace it later.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Versioned<T>, StorageError> {
		let raw = self.backend.get_bytes(&key(namespace, id)).await?;
		let value = decode(&raw)?;
		Ok(Versioned { value, raw })
	}

	/// Writes `data` if the stored bytes are still those of `current`.
	///
	/// Returns `false` when another writer got there first.
	pub async fn replace<T: Serialize, U>(
		&self,
		namespace: &str,
		id: &str,
		current: &Versioned<U>,
		data: &T,
	) -> Result<bool, StorageError> {
		self.backend
			.compare_and_swap(&key(namespace, id), Some(current.raw()), encode(data)?)
			.await
	}

	/// Adds `id` to `index` under `sort_key`. Adding twice is a no-op.
	///
	/// Sort keys must not contain `:` and should be fixed width so that
	/// byte order is the intended order.
	pub async fn add_to_index(
		&self,
		index: &str,
		sort_key: &str,
		id: &str,
	) -> Result<(), StorageError> {
		let key = format!("{}:{}:{}", index, sort_key, id);
		self.backend.set_bytes(&key, Vec::new()).await
	}

	/// Removes one index entry.
	pub async fn remove_from_index(&self, entry: &IndexEntry) -> Result<(), StorageError> {
		self.backend.delete(&entry.key).await
	}

	/// Returns up to `limit` entries of `index`, highest sort key first,
	/// continuing below `after` when given.
	pub async fn index_page(
		&self,
		index: &str,
		after: Option<&IndexEntry>,
		limit: usize,
	) -> Result<Vec<IndexEntry>, StorageError> {
		let prefix = format!("{}:", index);
		let mut cursor = after.map(|entry| entry.key.clone());
		loop {
			let keys = self
				.backend
				.scan_keys(&prefix, cursor.as_deref(), limit)
				.await?;
			let exhausted = keys.len() < limit;
			cursor = keys.last().cloned();
			let entries: Vec<IndexEntry> = keys
				.into_iter()
				.filter_map(|key| {
					let id = key.strip_prefix(prefix.as_str())?.split_once(':')?.1.to_string();
					Some(IndexEntry { key, id })
				})
				.collect();
			if !entries.is_empty() || exhausted || cursor.is_none() {
				return Ok(entries);
			}
		}
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&key(namespace, id)).await
	}

	/// Checks that the backend answers.
	pub async fn ping(&self) -> Result<(), StorageError> {
		self.backend.ping().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Doc {
		n: u32,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_insert_new_is_insert_if_absent() {
		let storage = service();
		storage.insert_new("docs", "a", &Doc { n: 1 }).await.unwrap();
		let err = storage
			.insert_new("docs", "a", &Doc { n: 2 })
			.await
			.unwrap_err();
		assert!(matches!(err, StorageError::AlreadyExists(key) if key == "docs:a"));
		assert_eq!(
			storage.retrieve::<Doc>("docs", "a").await.unwrap(),
			Doc { n: 1 }
		);
	}

	#[tokio::test]
	async fn test_replace_detects_stale_version() {
		let storage = service();
		storage.insert_new("docs", "a", &Doc { n: 1 }).await.unwrap();

		let first = storage.retrieve_versioned::<Doc>("docs", "a").await.unwrap();
		let second = storage.retrieve_versioned::<Doc>("docs", "a").await.unwrap();

		assert!(storage
			.replace("docs", "a", &first, &Doc { n: 2 })
			.await
			.unwrap());
		assert!(!storage
			.replace("docs", "a", &second, &Doc { n: 3 })
			.await
			.unwrap());
		assert_eq!(
			storage.retrieve::<Doc>("docs", "a").await.unwrap(),
			Doc { n: 2 }
		);
	}

	#[tokio::test]
	async fn test_index_pages_highest_sort_key_first() {
		let backend = MemoryStorage::new();
		backend.set_bytes("by_day:malformed", Vec::new()).await.unwrap();
		let storage = StorageService::new(Box::new(backend));
		storage.add_to_index("by_day", "20261014", "c").await.unwrap();
		storage.add_to_index("by_day", "20261016", "a").await.unwrap();
		storage.add_to_index("by_day", "20261015", "b").await.unwrap();
		storage.add_to_index("by_day", "20261016", "a").await.unwrap();
		storage.add_to_index("by_dayz", "20261017", "x").await.unwrap();
		storage.store("by_day", "doc", &Doc { n: 1 }).await.unwrap();

		let first = storage.index_page("by_day", None, 2).await.unwrap();
		let ids: Vec<_> = first.iter().map(|e| e.id.as_str()).collect();
		assert_eq!(ids, ["a", "b"]);
		assert_eq!(first[0].key(), "by_day:20261016:a");

		let rest = storage.index_page("by_day", first.last(), 10).await.unwrap();
		let ids: Vec<_> = rest.iter().map(|e| e.id.as_str()).collect();
		assert_eq!(ids, ["c"]);

		storage.remove_from_index(&first[0]).await.unwrap();
		let all = storage.index_page("by_day", None, 10).await.unwrap();
		let ids: Vec<_> = all.iter().map(|e| e.id.as_str()).collect();
		assert_eq!(ids, ["b", "c"]);
	}

	#[tokio::test]
	async fn test_missing_key() {
		let storage = service();
		assert!(matches!(
			storage.retrieve::<Doc>("docs", "nope").await,
			Err(StorageError::NotFound)
		));
		assert!(!storage.exists("docs", "nope").await.unwrap());
		storage.ping().await.unwrap();
	}
}
