//! Main entry point for the takeaway order service.
//!
//! Serves the customer and kitchen API of a takeaway shop: order intake,
//! status tracking, the ready SMS and online payments. Storage backend, SMS
//! provider and payment provider are selected in the configuration file.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use takeaway_config::Config;

mod apis;
mod factory_registry;
mod server;

/// Command-line arguments for the takeaway service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

/// Main entry point for the takeaway service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the shop engine with the configured implementations
/// 5. Serves the HTTP API until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	// RUST_LOG wins over --log-level
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started takeaway service");

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!(
		shop = %config.shop.name,
		storage = %config.storage.primary,
		"Loaded configuration"
	);

	let api_config = config.api.clone();
	let shop = Arc::new(factory_registry::build_shop_from_config(config)?);

	server::start_server(api_config, shop).await?;

	tracing::info!("Stopped takeaway service");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_args_default_values() {
		let args = Args::try_parse_from(["takeaway"]).unwrap();
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_custom_values() {
		let args =
			Args::try_parse_from(["takeaway", "--config", "shop.toml", "-l", "debug"]).unwrap();
		assert_eq!(args.config, PathBuf::from("shop.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[tokio::test]
	async fn test_build_shop_from_config_file() {
		let dir = tempfile::tempdir().unwrap();
		let providers = dir.path().join("providers.toml");
		std::fs::write(
			&providers,
			r#"
[notification]
primary = "log"
ready_message = "Fertig!"
[notification.implementations.log]
prefix = "dev"
"#,
		)
		.unwrap();
		let main = dir.path().join("config.toml");
		std::fs::write(
			&main,
			format!(
				r#"
include = ["providers.toml"]

[shop]
name = "Test Kebab"

[kitchen]
pin = "4711"

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "{}"
"#,
				dir.path().join("data").display()
			),
		)
		.unwrap();

		let config = Config::from_file(&main.to_string_lossy()).await.unwrap();
		assert_eq!(config.shop.name, "Test Kebab");
		assert_eq!(config.notification.ready_message, "Fertig!");

		let shop = factory_registry::build_shop_from_config(config).unwrap();
		assert!(shop.notifications_enabled());
		assert!(!shop.payments_enabled());
		assert!(shop.health().await.is_ok());
	}
}
