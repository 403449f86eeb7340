//! Configuration module for the takeaway ordering service.
//!
//! Configuration is read from a TOML file. String values may reference
//! environment variables as `${VAR}` or `${VAR:-default}`, which keeps
//! credentials such as the kitchen PIN or gateway tokens out of the file.
//!
//! ## Modular Configuration Support
//!
//! A file may pull in others with `include = ["payment.toml"]`. Every
//! top-level section must be defined in exactly one file.

mod loader;

pub use loader::ConfigLoader;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use takeaway_types::SecretString;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		ConfigError::Parse(err.message().to_string())
	}
}

/// Main configuration structure of the service.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Shop identity and order lifecycle settings.
	#[serde(default)]
	pub shop: ShopConfig,
	/// Kitchen dashboard access.
	pub kitchen: KitchenConfig,
	/// Storage backend selection.
	pub storage: StorageConfig,
	/// Ready SMS settings. Without a primary provider no SMS is sent.
	#[serde(default)]
	pub notification: NotificationConfig,
	/// Online payment settings. Absent means payments are disabled.
	pub payment: Option<PaymentConfig>,
	/// HTTP server settings.
	#[serde(default)]
	pub api: ApiConfig,
}

/// Rule applied when the kitchen changes an order's status.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
	/// Any status may follow any other.
	#[default]
	Permissive,
	/// Status may only move forward along the lifecycle or stay the same.
	ForwardOnly,
}

/// Shop identity and order lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShopConfig {
	#[serde(default = "default_shop_name")]
	pub name: String,
	/// ISO 4217 code stored on every new order.
	#[serde(default = "default_currency")]
	pub currency: String,
	/// Country prefix prepended to national phone numbers.
	#[serde(default = "default_country_code")]
	pub default_country_code: String,
	/// Seconds after pickup before an order moves to the archive view.
	#[serde(default = "default_archive_grace_seconds")]
	pub archive_grace_seconds: u64,
	#[serde(default)]
	pub transition_policy: TransitionPolicy,
}

impl Default for ShopConfig {
	fn default() -> Self {
		Self {
			name: default_shop_name(),
			currency: default_currency(),
			default_country_code: default_country_code(),
			archive_grace_seconds: default_archive_grace_seconds(),
			transition_policy: TransitionPolicy::default(),
		}
	}
}

fn default_shop_name() -> String {
	"Takeaway".to_string()
}

fn default_currency() -> String {
	"CHF".to_string()
}

fn default_country_code() -> String {
	"+41".to_string()
}

/// Three minutes.
fn default_archive_grace_seconds() -> u64 {
	180
}

/// Kitchen dashboard access.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KitchenConfig {
	/// Shared PIN expected in the `x-kitchen-pin` header.
	pub pin: SecretString,
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration of the ready SMS.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
	/// SMS provider to use. `None` disables notifications.
	pub primary: Option<String>,
	/// Text sent when an order becomes ready.
	#[serde(default = "default_ready_message")]
	pub ready_message: String,
	/// Upper bound for one provider call.
	#[serde(default = "default_notification_timeout")]
	pub timeout_seconds: u64,
	/// How long a send claim blocks concurrent sends for the same order.
	#[serde(default = "default_claim_lease")]
	pub claim_lease_seconds: u64,
	/// Map of SMS provider names to their configurations.
	#[serde(default)]
	pub implementations: HashMap<String, toml::Value>,
}

impl Default for NotificationConfig {
	fn default() -> Self {
		Self {
			primary: None,
			ready_message: default_ready_message(),
			timeout_seconds: default_notification_timeout(),
			claim_lease_seconds: default_claim_lease(),
			implementations: HashMap::new(),
		}
	}
}

fn default_ready_message() -> String {
	"Deine Bestellung ist bereit zur Abholung. Guten Appetit! 🥙".to_string()
}

fn default_notification_timeout() -> u64 {
	10
}

fn default_claim_lease() -> u64 {
	60
}

/// Configuration of online payments.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentConfig {
	/// Which payment provider to use.
	pub primary: String,
	/// Public base URL of the shop, used for the checkout redirect URLs.
	pub app_base_url: String,
	/// Map of payment provider names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration. Permissive when absent.
	pub cors: Option<CorsConfig>,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			host: default_api_host(),
			port: default_api_port(),
			timeout_seconds: default_api_timeout(),
			max_request_size: default_max_request_size(),
			cors: None,
		}
	}
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
	/// Allowed headers for CORS.
	#[serde(default)]
	pub allowed_headers: Vec<String>,
	/// Allowed methods for CORS.
	#[serde(default)]
	pub allowed_methods: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_api_timeout() -> u64 {
	30
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of the environment variable and
/// `${VAR_NAME:-fallback}` with the fallback when the variable is unset.
/// Inputs above 1MB are rejected before the regex runs.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;
	for cap in re.captures_iter(input) {
		let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(name.as_str()), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(fallback)) => fallback.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					name.as_str()
				)))
			},
		};
		result.push_str(&input[last..whole.start()]);
		result.push_str(&value);
		last = whole.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Time after pickup before an order leaves the active view.
	pub fn archive_grace(&self) -> Duration {
		Duration::from_secs(self.shop.archive_grace_seconds)
	}

	/// Checks cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		let currency = &self.shop.currency;
		if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
			return Err(ConfigError::Validation(format!(
				"Shop currency '{}' must be a three-letter ISO code",
				currency
			)));
		}
		let country = &self.shop.default_country_code;
		let country_digits = country.strip_prefix('+').unwrap_or_default();
		if country_digits.is_empty()
			|| country_digits.len() > 3
			|| !country_digits.chars().all(|c| c.is_ascii_digit())
		{
			return Err(ConfigError::Validation(format!(
				"default_country_code '{}' must look like +41",
				country
			)));
		}

		if self.kitchen.pin.is_empty() {
			return Err(ConfigError::Validation("Kitchen PIN cannot be empty".into()));
		}

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}

		let notification = &self.notification;
		if let Some(primary) = &notification.primary {
			if !notification.implementations.contains_key(primary) {
				return Err(ConfigError::Validation(format!(
					"Primary notification provider '{}' not found in implementations",
					primary
				)));
			}
		}
		if notification.timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"notification.timeout_seconds must be greater than 0".into(),
			));
		}
		if notification.claim_lease_seconds <= notification.timeout_seconds {
			return Err(ConfigError::Validation(
				"notification.claim_lease_seconds must exceed notification.timeout_seconds"
					.into(),
			));
		}

		if let Some(payment) = &self.payment {
			if !payment.implementations.contains_key(&payment.primary) {
				return Err(ConfigError::Validation(format!(
					"Primary payment provider '{}' not found in implementations",
					payment.primary
				)));
			}
			if !(payment.app_base_url.starts_with("http://")
				|| payment.app_base_url.starts_with("https://"))
			{
				return Err(ConfigError::Validation(format!(
					"payment.app_base_url '{}' must be an http(s) URL",
					payment.app_base_url
				)));
			}
		}

		if self.api.timeout_seconds <= notification.timeout_seconds {
			return Err(ConfigError::Validation(
				"api.timeout_seconds must exceed notification.timeout_seconds".into(),
			));
		}

		if self.api.max_request_size == 0 {
			return Err(ConfigError::Validation(
				"api.max_request_size must be greater than 0".into(),
			));
		}

		Ok(())
	}
}

/// Parses a TOML string, resolving environment variables and validating
/// the result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
