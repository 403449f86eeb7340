//! Loader for configurations split across several files.
//!
//! The entry file may name other files in an `include` array. Included
//! files are merged section by section into the entry file; a section that
//! appears twice is an error, as is a file that ends up including itself.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Loads a configuration file and the files it includes.
pub struct ConfigLoader {
	/// Directory relative includes are resolved against.
	base_path: PathBuf,
	/// Canonical paths already read.
	visited: HashSet<PathBuf>,
	/// Section name -> file that defined it.
	owners: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	/// Creates a loader resolving relative paths against `base_path`.
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			owners: HashMap::new(),
		}
	}

	/// Reads `config_path`, merges its includes and validates the result.
	pub async fn load_config(&mut self, config_path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let entry = self.resolve_path(config_path)?;
		let mut merged = self.read_table(&entry).await?;

		let includes = match merged.remove("include") {
			None => Vec::new(),
			Some(toml::Value::String(path)) => vec![PathBuf::from(path)],
			Some(toml::Value::Array(items)) => items
				.into_iter()
				.map(|item| match item {
					toml::Value::String(path) => Ok(PathBuf::from(path)),
					_ => Err(ConfigError::Validation(
						"Include array must contain only strings".into(),
					)),
				})
				.collect::<Result<_, _>>()?,
			Some(_) => {
				return Err(ConfigError::Validation(
					"Include must be a string or array of strings".into(),
				))
			},
		};

		for key in merged.keys() {
			self.owners.insert(key.clone(), entry.clone());
		}

		for include in includes {
			let path = self.resolve_path(&include)?;
			let table = self.read_table(&path).await?;
			if table.contains_key("include") {
				return Err(ConfigError::Validation(format!(
					"Nested include in {} is not supported",
					path.display()
				)));
			}
			for (key, value) in table {
				if let Some(owner) = self.owners.get(&key) {
					return Err(ConfigError::Validation(format!(
						"Duplicate section '{}' found in {} and {}. \
						Each top-level section must be unique across all configuration files.",
						key,
						owner.display(),
						path.display()
					)));
				}
				self.owners.insert(key.clone(), path.clone());
				merged.insert(key, value);
			}
		}

		let combined = toml::to_string(&toml::Value::Table(merged)).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		combined.parse()
	}

	/// Reads one file, resolves environment variables and parses it.
	async fn read_table(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;
		if !self.visited.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		let resolved = resolve_env_vars(&content)?;
		Ok(toml::from_str(&resolved)?)
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}

		Ok(resolved)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const BASE: &str = r#"
[kitchen]
pin = "4711"
"#;

	const STORAGE: &str = r#"
[storage]
primary = "memory"
[storage.implementations.memory]
"#;

	#[tokio::test]
	async fn test_single_file_config() {
		let dir = TempDir::new().unwrap();
		fs::write(dir.path().join("config.toml"), format!("{}{}", BASE, STORAGE)).unwrap();

		let mut loader = ConfigLoader::new(dir.path());
		let config = loader.load_config("config.toml").await.unwrap();
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("main.toml"),
			format!("include = [\"storage.toml\", \"payment.toml\"]\n{}", BASE),
		)
		.unwrap();
		fs::write(dir.path().join("storage.toml"), STORAGE).unwrap();
		fs::write(
			dir.path().join("payment.toml"),
			r#"
[payment]
primary = "mock"
app_base_url = "https://shop.example"
[payment.implementations.mock]
"#,
		)
		.unwrap();

		let config = Config::from_file(dir.path().join("main.toml").to_str().unwrap())
			.await
			.unwrap();
		assert_eq!(config.storage.primary, "memory");
		assert_eq!(config.payment.unwrap().app_base_url, "https://shop.example");
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("main.toml"),
			format!("include = \"dup.toml\"\n{}{}", BASE, STORAGE),
		)
		.unwrap();
		fs::write(dir.path().join("dup.toml"), "[kitchen]\npin = \"9999\"\n").unwrap();

		let mut loader = ConfigLoader::new(dir.path());
		let err = loader.load_config("main.toml").await.unwrap_err();
		assert!(err.to_string().contains("Duplicate section 'kitchen'"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let dir = TempDir::new().unwrap();
		fs::write(
			dir.path().join("self.toml"),
			format!("include = [\"self.toml\"]\n{}", BASE),
		)
		.unwrap();

		let mut loader = ConfigLoader::new(dir.path());
		let err = loader.load_config("self.toml").await.unwrap_err();
		assert!(err.to_string().contains("already loaded"));
	}

	#[tokio::test]
	async fn test_missing_file() {
		let dir = TempDir::new().unwrap();
		let mut loader = ConfigLoader::new(dir.path());
		let err = loader.load_config("nope.toml").await.unwrap_err();
		assert!(matches!(err, ConfigError::Io(_)));
	}
}
