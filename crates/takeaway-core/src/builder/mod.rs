//! Builder for constructing shop engines.
//!
//! Composes a [`ShopEngine`] from the implementations named in the
//! configuration. Each implementation is created through a factory function
//! looked up by name, so the binary decides which backends and providers are
//! available while the configuration decides which one is used.

use crate::state::{OrderStore, OrderStoreSettings};
use crate::ShopEngine;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use takeaway_config::Config;
use takeaway_notify::{NotificationService, NotifyError, SmsInterface};
use takeaway_payment::{PaymentError, PaymentInterface, PaymentService};
use takeaway_storage::{StorageError, StorageInterface, StorageService};
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every pluggable component, keyed by implementation name.
pub struct ShopFactories<SF, NF, PF> {
	pub storage_factories: HashMap<String, SF>,
	pub sms_factories: HashMap<String, NF>,
	pub payment_factories: HashMap<String, PF>,
}

/// Builder for constructing a ShopEngine with pluggable implementations.
pub struct ShopBuilder {
	config: Config,
}

/// Creates every configured implementation of one component and returns
/// the primary one.
///
/// All configured implementations with a known factory are created so a
/// broken secondary configuration is reported at startup.
fn load_primary<T, E, F>(
	component: &'static str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	E: Display,
	F: Fn(&toml::Value) -> Result<T, E>,
{
	if !factories.contains_key(primary) {
		return Err(BuilderError::MissingComponent(format!(
			"no {} implementation named '{}'",
			component, primary
		)));
	}

	let mut selected = None;
	for (name, config) in implementations {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "Unknown implementation, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = name == primary;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				if is_primary {
					selected = Some(implementation);
				}
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	selected.ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' has no configuration",
			component, primary
		))
	})
}

impl ShopBuilder {
	/// Creates a new ShopBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the ShopEngine using factories for each component type.
	pub fn build<SF, NF, PF>(self, factories: ShopFactories<SF, NF, PF>) -> Result<ShopEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		NF: Fn(&toml::Value) -> Result<Box<dyn SmsInterface>, NotifyError>,
		PF: Fn(&toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError>,
	{
		let config = self.config;

		let backend = load_primary(
			"storage",
			&config.storage.primary,
			&config.storage.implementations,
			&factories.storage_factories,
		)?;
		let storage = Arc::new(StorageService::new(backend));

		let notifier = match &config.notification.primary {
			Some(primary) => {
				let provider = load_primary(
					"notification",
					primary,
					&config.notification.implementations,
					&factories.sms_factories,
				)?;
				Some(Arc::new(NotificationService::new(
					provider,
					config.notification.ready_message.clone(),
					Duration::from_secs(config.notification.timeout_seconds),
				)))
			},
			None => {
				tracing::info!(component = "notification", "No SMS provider, ready SMS disabled");
				None
			},
		};

		let payment = match &config.payment {
			Some(payment_config) => {
				let provider = load_primary(
					"payment",
					&payment_config.primary,
					&payment_config.implementations,
					&factories.payment_factories,
				)?;
				Some(Arc::new(PaymentService::new(
					provider,
					payment_config.primary.clone(),
					&payment_config.app_base_url,
				)))
			},
			None => {
				tracing::info!(component = "payment", "No payment provider, payments disabled");
				None
			},
		};

		let settings = OrderStoreSettings {
			currency: config.shop.currency.clone(),
			default_country_code: config.shop.default_country_code.clone(),
			archive_grace: chrono::Duration::from_std(config.archive_grace())
				.map_err(|e| BuilderError::Config(format!("archive grace out of range: {}", e)))?,
			transition_policy: config.shop.transition_policy,
		};
		let claim_lease = i64::try_from(config.notification.claim_lease_seconds)
			.ok()
			.and_then(chrono::Duration::try_seconds)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"claim lease out of range: {}s",
					config.notification.claim_lease_seconds
				))
			})?;
		let store = Arc::new(OrderStore::new(storage.clone(), settings));

		Ok(ShopEngine::new(
			config,
			storage,
			store,
			notifier,
			payment,
			claim_lease,
		))
	}
}
