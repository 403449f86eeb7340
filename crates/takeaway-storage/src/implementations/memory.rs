//! In-memory storage backend.
//!
//! Nothing survives a restart. Used in tests and for local development.

use crate::{scan_upper_bound, StorageError, StorageInterface};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use takeaway_types::{ConfigSchema, Schema, ValidationError};
use tokio::sync::RwLock;

/// In-memory storage implementation.
///
/// A compare-and-swap holds the write lock for the whole compare and write,
/// which makes it atomic with respect to every other operation. Keys are
/// kept ordered so key scans are range walks.
#[derive(Clone, Default)]
pub struct MemoryStorage {
	store: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
	/// Creates a new MemoryStorage instance.
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.store.write().await.insert(key.to_string(), value);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.store.read().await.contains_key(key))
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let mut store = self.store.write().await;
		if store.get(key).map(Vec::as_slice) != expected {
			return Ok(false);
		}
		store.insert(key.to_string(), value);
		Ok(true)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.store.write().await.remove(key);
		Ok(())
	}

	async fn scan_keys(
		&self,
		prefix: &str,
		before: Option<&str>,
		limit: usize,
	) -> Result<Vec<String>, StorageError> {
		let upper = scan_upper_bound(prefix, before);
		if upper.as_str() <= prefix {
			return Ok(Vec::new());
		}
		let store = self.store.read().await;
		Ok(store
			.range::<str, _>((Bound::Included(prefix), Bound::Excluded(upper.as_str())))
			.rev()
			.map(|(key, _)| key.clone())
			.take(limit)
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}
}

/// Configuration schema for MemoryStorage. Takes no settings.
pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Factory function to create a memory storage backend from configuration.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

/// Registry for the memory storage implementation.
pub struct Registry;

impl takeaway_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_basic_operations() {
		let storage = MemoryStorage::new();

		storage.set_bytes("k", b"v1".to_vec()).await.unwrap();
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"v1");
		assert!(storage.exists("k").await.unwrap());

		storage.set_bytes("k", b"v2".to_vec()).await.unwrap();
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"v2");

		assert!(matches!(
			storage.get_bytes("missing").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_compare_and_swap() {
		let storage = MemoryStorage::new();

		assert!(storage.compare_and_swap("k", None, b"a".to_vec()).await.unwrap());
		assert!(!storage.compare_and_swap("k", None, b"b".to_vec()).await.unwrap());
		assert!(!storage
			.compare_and_swap("k", Some(&b"x"[..]), b"b".to_vec())
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap("k", Some(&b"a"[..]), b"b".to_vec())
			.await
			.unwrap());
		assert_eq!(storage.get_bytes("k").await.unwrap(), b"b");
		assert!(!storage
			.compare_and_swap("missing", Some(&b"a"[..]), b"c".to_vec())
			.await
			.unwrap());
	}

	#[tokio::test]
	async fn test_concurrent_cas_has_one_winner() {
		let storage = MemoryStorage::new();
		storage.set_bytes("k", b"0".to_vec()).await.unwrap();

		let mut handles = Vec::new();
		for i in 0..16u8 {
			let storage = storage.clone();
			handles.push(tokio::spawn(async move {
				storage
					.compare_and_swap("k", Some(&b"0"[..]), vec![b'a' + i])
					.await
					.unwrap()
			}));
		}
		let mut winners = 0;
		for handle in handles {
			if handle.await.unwrap() {
				winners += 1;
			}
		}
		assert_eq!(winners, 1);
	}

	#[tokio::test]
	async fn test_scan_keys_newest_first_and_paged() {
		let storage = MemoryStorage::new();
		for key in ["idx:001:a", "idx:002:b", "idx:003:c", "idy:999:z", "id:000"] {
			storage.set_bytes(key, Vec::new()).await.unwrap();
		}

		let first = storage.scan_keys("idx:", None, 2).await.unwrap();
		assert_eq!(first, ["idx:003:c", "idx:002:b"]);
		let rest = storage
			.scan_keys("idx:", Some(first[1].as_str()), 10)
			.await
			.unwrap();
		assert_eq!(rest, ["idx:001:a"]);
		assert!(storage
			.scan_keys("idx:", Some("idx:001:a"), 10)
			.await
			.unwrap()
			.is_empty());
		assert!(storage.scan_keys("idx:", Some("ida"), 10).await.unwrap().is_empty());

		storage.delete("idx:003:c").await.unwrap();
		storage.delete("idx:003:c").await.unwrap();
		assert_eq!(
			storage.scan_keys("idx:", None, 10).await.unwrap(),
			["idx:002:b", "idx:001:a"]
		);
	}

	#[test]
	fn test_factory_rejects_non_table() {
		assert!(create_storage(&toml::Value::Integer(1)).is_err());
		assert!(create_storage(&toml::Value::Table(Default::default())).is_ok());
	}
}
