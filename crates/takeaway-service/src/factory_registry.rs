//! Dynamic factory registry for shop implementations.
//!
//! Every backend and provider crate exposes its implementations through
//! `get_all_implementations`; this module collects them once and hands the
//! ones named in the configuration to the [`ShopBuilder`].

use std::collections::HashMap;
use std::sync::OnceLock;
use takeaway_config::Config;
use takeaway_core::{ShopBuilder, ShopEngine, ShopFactories};
use takeaway_notify::SmsFactory;
use takeaway_payment::PaymentFactory;
use takeaway_storage::StorageFactory;

/// Global registry for all implementation factories
pub struct FactoryRegistry {
	pub storage: HashMap<String, StorageFactory>,
	pub sms: HashMap<String, SmsFactory>,
	pub payment: HashMap<String, PaymentFactory>,
}

impl FactoryRegistry {
	/// Create a new empty registry
	pub fn new() -> Self {
		Self {
			storage: HashMap::new(),
			sms: HashMap::new(),
			payment: HashMap::new(),
		}
	}

	pub fn register_storage(&mut self, name: impl Into<String>, factory: StorageFactory) {
		self.storage.insert(name.into(), factory);
	}

	pub fn register_sms(&mut self, name: impl Into<String>, factory: SmsFactory) {
		self.sms.insert(name.into(), factory);
	}

	pub fn register_payment(&mut self, name: impl Into<String>, factory: PaymentFactory) {
		self.payment.insert(name.into(), factory);
	}
}

static REGISTRY: OnceLock<FactoryRegistry> = OnceLock::new();

/// Get the global factory registry, initializing it on first use.
pub fn get_registry() -> &'static FactoryRegistry {
	REGISTRY.get_or_init(|| {
		let mut registry = FactoryRegistry::new();

		for (name, factory) in takeaway_storage::get_all_implementations() {
			tracing::debug!("Registering storage implementation: {}", name);
			registry.register_storage(name, factory);
		}

		for (name, factory) in takeaway_notify::get_all_implementations() {
			tracing::debug!("Registering SMS implementation: {}", name);
			registry.register_sms(name, factory);
		}

		for (name, factory) in takeaway_payment::get_all_implementations() {
			tracing::debug!("Registering payment implementation: {}", name);
			registry.register_payment(name, factory);
		}

		registry
	})
}

/// Macro to build factories from config implementations
macro_rules! build_factories {
	($registry:expr, $config_impls:expr, $registry_field:ident, $type_name:literal) => {{
		let mut factories = HashMap::new();
		for name in $config_impls.keys() {
			if let Some(factory) = $registry.$registry_field.get(name) {
				factories.insert(name.clone(), *factory);
			} else {
				let mut available: Vec<_> = $registry.$registry_field.keys().cloned().collect();
				available.sort();
				return Err(format!(
					"Unknown {} implementation '{}'. Available: [{}]",
					$type_name,
					name,
					available.join(", ")
				)
				.into());
			}
		}
		factories
	}};
}

/// Build the shop engine using the registry and config
pub fn build_shop_from_config(config: Config) -> Result<ShopEngine, Box<dyn std::error::Error>> {
	let registry = get_registry();

	let storage_factories =
		build_factories!(registry, config.storage.implementations, storage, "storage");
	let sms_factories =
		build_factories!(registry, config.notification.implementations, sms, "SMS");
	let no_payment: HashMap<String, toml::Value> = HashMap::new();
	let payment_impls = config
		.payment
		.as_ref()
		.map(|payment| &payment.implementations)
		.unwrap_or(&no_payment);
	let payment_factories = build_factories!(registry, payment_impls, payment, "payment");

	let factories = ShopFactories {
		storage_factories,
		sms_factories,
		payment_factories,
	};

	Ok(ShopBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_registry_knows_all_implementations() {
		let registry = get_registry();
		for name in ["file", "memory", "postgres"] {
			assert!(registry.storage.contains_key(name), "missing storage {}", name);
		}
		for name in ["bulkgate", "log"] {
			assert!(registry.sms.contains_key(name), "missing sms {}", name);
		}
		for name in ["mock", "payrexx"] {
			assert!(registry.payment.contains_key(name), "missing payment {}", name);
		}
	}

	#[test]
	fn test_unknown_implementation_is_reported() {
		let config: Config = r#"
[kitchen]
pin = "1234"

[storage]
primary = "redis"
[storage.implementations.redis]
"#
		.parse()
		.unwrap();
		let err = build_shop_from_config(config).err().unwrap();
		assert!(err.to_string().contains("Unknown storage implementation 'redis'"));
		assert!(err.to_string().contains("file, memory, postgres"));
	}

	#[test]
	fn test_build_with_payments() {
		let config: Config = r#"
[kitchen]
pin = "1234"

[storage]
primary = "memory"
[storage.implementations.memory]

[notification]
primary = "log"
[notification.implementations.log]

[payment]
primary = "mock"
app_base_url = "http://localhost:3000"
[payment.implementations.mock]
"#
		.parse()
		.unwrap();
		let shop = build_shop_from_config(config).unwrap();
		assert!(shop.notifications_enabled());
		assert!(shop.payments_enabled());
	}
}
