//! PostgreSQL storage backend.
//!
//! Keys and values live in a two-column table that is created on first use.
//! Compare-and-swap maps onto a conditional `INSERT ... ON CONFLICT DO
//! NOTHING` or `UPDATE ... WHERE value = $expected`, so the database row
//! lock provides the atomicity. The key column uses the `C` collation so
//! prefix scans are byte-ordered range reads on the primary key index.

use crate::{scan_upper_bound, StorageError, StorageInterface};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use takeaway_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use tokio::sync::OnceCell;

const DEFAULT_TABLE: &str = "takeaway_kv";

/// PostgreSQL storage implementation.
pub struct PostgresStorage {
	pool: PgPool,
	table: String,
	ready: OnceCell<()>,
}

fn backend_err(e: sqlx::Error) -> StorageError {
	StorageError::Backend(e.to_string())
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn is_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
		&& chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
		&& name.len() <= 63
}

impl PostgresStorage {
	/// Creates a storage on top of an existing pool.
	pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self, StorageError> {
		let table = table.into();
		if !is_identifier(&table) {
			return Err(StorageError::Configuration(format!(
				"Invalid table name '{}'",
				table
			)));
		}
		Ok(Self {
			pool,
			table,
			ready: OnceCell::new(),
		})
	}

	/// Creates the table the first time any operation runs.
	async fn pool(&self) -> Result<&PgPool, StorageError> {
		self.ready
			.get_or_try_init(|| async {
				let ddl = format!(
					"CREATE TABLE IF NOT EXISTS {} (key TEXT COLLATE \"C\" PRIMARY KEY, value BYTEA NOT NULL)",
					self.table
				);
				sqlx::query(&ddl)
					.execute(&self.pool)
					.await
					.map_err(backend_err)?;
				tracing::debug!(table = %self.table, "Storage table ready");
				Ok::<(), StorageError>(())
			})
			.await?;
		Ok(&self.pool)
	}
}

#[async_trait]
impl StorageInterface for PostgresStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let sql = format!("SELECT value FROM {} WHERE key = $1", self.table);
		let row = sqlx::query(&sql)
			.bind(key)
			.fetch_optional(self.pool().await?)
			.await
			.map_err(backend_err)?
			.ok_or(StorageError::NotFound)?;
		row.try_get::<Vec<u8>, _>("value").map_err(backend_err)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let sql = format!(
			"INSERT INTO {} (key, value) VALUES ($1, $2) \
			 ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
			self.table
		);
		sqlx::query(&sql)
			.bind(key)
			.bind(value)
			.execute(self.pool().await?)
			.await
			.map_err(backend_err)?;
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let sql = format!("SELECT 1 FROM {} WHERE key = $1", self.table);
		let row = sqlx::query(&sql)
			.bind(key)
			.fetch_optional(self.pool().await?)
			.await
			.map_err(backend_err)?;
		Ok(row.is_some())
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let pool = self.pool().await?;
		let result = match expected {
			None => {
				let sql = format!(
					"INSERT INTO {} (key, value) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING",
					self.table
				);
				sqlx::query(&sql).bind(key).bind(value).execute(pool).await
			},
			Some(expected) => {
				let sql = format!(
					"UPDATE {} SET value = $2 WHERE key = $1 AND value = $3",
					self.table
				);
				sqlx::query(&sql)
					.bind(key)
					.bind(value)
					.bind(expected)
					.execute(pool)
					.await
			},
		}
		.map_err(backend_err)?;
		Ok(result.rows_affected() == 1)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let sql = format!("DELETE FROM {} WHERE key = $1", self.table);
		sqlx::query(&sql)
			.bind(key)
			.execute(self.pool().await?)
			.await
			.map_err(backend_err)?;
		Ok(())
	}

	async fn scan_keys(
		&self,
		prefix: &str,
		before: Option<&str>,
		limit: usize,
	) -> Result<Vec<String>, StorageError> {
		let sql = format!(
			"SELECT key FROM {} WHERE key >= $1 AND key < $2 ORDER BY key DESC LIMIT $3",
			self.table
		);
		let rows = sqlx::query(&sql)
			.bind(prefix)
			.bind(scan_upper_bound(prefix, before))
			.bind(i64::try_from(limit).unwrap_or(i64::MAX))
			.fetch_all(self.pool().await?)
			.await
			.map_err(backend_err)?;
		rows.into_iter()
			.map(|row| row.try_get::<String, _>("key").map_err(backend_err))
			.collect()
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(PostgresStorageSchema)
	}

	async fn ping(&self) -> Result<(), StorageError> {
		sqlx::query("SELECT 1")
			.execute(self.pool().await?)
			.await
			.map_err(backend_err)?;
		Ok(())
	}
}

/// Configuration schema for PostgresStorage.
pub struct PostgresStorageSchema;

impl ConfigSchema for PostgresStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("database_url", FieldType::String).with_validator(|value| {
				match value.as_str() {
					Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {
						Ok(())
					},
					_ => Err("must start with postgres:// or postgresql://".to_string()),
				}
			})],
			vec![
				Field::new("table", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(name) if is_identifier(name) => Ok(()),
						_ => Err("must be a lowercase SQL identifier".to_string()),
					}
				}),
				Field::new(
					"max_connections",
					FieldType::Integer {
						min: Some(1),
						max: Some(100),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a PostgreSQL storage backend.
///
/// Configuration parameters:
/// - `database_url`: connection string (required)
/// - `table`: table name (default: "takeaway_kv")
/// - `max_connections`: pool size (default: 5)
///
/// The pool connects lazily, so a database that is down at startup only
/// fails the first request.
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	PostgresStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let database_url = config
		.get("database_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| StorageError::Configuration("database_url is required".into()))?;
	let table = config
		.get("table")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_TABLE);
	let max_connections = config
		.get("max_connections")
		.and_then(|v| v.as_integer())
		.unwrap_or(5) as u32;

	let pool = PgPoolOptions::new()
		.max_connections(max_connections)
		.connect_lazy(database_url)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	Ok(Box::new(PostgresStorage::new(pool, table)?))
}

/// Registry for the PostgreSQL storage implementation.
pub struct Registry;

impl takeaway_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "postgres";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_identifier_check() {
		assert!(is_identifier("takeaway_kv"));
		assert!(is_identifier("_orders2"));
		assert!(!is_identifier("Orders"));
		assert!(!is_identifier("2orders"));
		assert!(!is_identifier("kv; DROP TABLE x"));
		assert!(!is_identifier(""));
	}

	#[test]
	fn test_schema() {
		let schema = PostgresStorageSchema;
		let ok: toml::Value =
			toml::from_str("database_url = \"postgres://u:p@localhost/shop\"\ntable = \"kv\"")
				.unwrap();
		assert!(schema.validate(&ok).is_ok());

		let missing: toml::Value = toml::from_str("table = \"kv\"").unwrap();
		assert!(schema.validate(&missing).is_err());

		let bad_url: toml::Value = toml::from_str("database_url = \"mysql://x\"").unwrap();
		assert!(schema.validate(&bad_url).is_err());

		let bad_table: toml::Value =
			toml::from_str("database_url = \"postgres://x\"\ntable = \"a-b\"").unwrap();
		assert!(schema.validate(&bad_table).is_err());
	}

	#[tokio::test]
	async fn test_factory_connects_lazily() {
		let config: toml::Value =
			toml::from_str("database_url = \"postgres://nobody@127.0.0.1:1/none\"").unwrap();
		assert!(create_storage(&config).is_ok());
	}
}
