//! Fakes shared by the unit tests of this crate.

use crate::state::{OrderStore, OrderStoreSettings};
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use takeaway_notify::{NotifyError, SmsInterface, SmsReceipt};
use takeaway_storage::{implementations::memory::MemoryStorage, StorageService};
use takeaway_types::{ConfigSchema, CreateOrderRequest, Schema, ValidationError};

pub struct NoSchema;

impl ConfigSchema for NoSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// SMS provider that counts calls and can fail or stall on demand.
pub struct ScriptedSms {
	pub calls: Arc<AtomicUsize>,
	pub recipients: Arc<Mutex<Vec<String>>>,
	fail: bool,
	delay: Option<Duration>,
}

impl ScriptedSms {
	pub fn ok() -> Self {
		Self {
			calls: Arc::default(),
			recipients: Arc::default(),
			fail: false,
			delay: None,
		}
	}

	pub fn failing() -> Self {
		Self {
			fail: true,
			..Self::ok()
		}
	}

	pub fn slow(delay: Duration) -> Self {
		Self {
			delay: Some(delay),
			..Self::ok()
		}
	}
}

#[async_trait]
impl SmsInterface for ScriptedSms {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(NoSchema)
	}

	async fn send(&self, to: &str, _text: &str) -> Result<SmsReceipt, NotifyError> {
		let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
		self.recipients.lock().unwrap().push(to.to_string());
		if let Some(delay) = self.delay {
			tokio::time::sleep(delay).await;
		}
		if self.fail {
			return Err(NotifyError::Rejected("HTTP 400: invalid_phone_number".into()));
		}
		Ok(SmsReceipt {
			message_id: Some(format!("sms-{}", n)),
		})
	}
}

pub fn memory_store() -> OrderStore {
	let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
	OrderStore::new(storage, OrderStoreSettings::default())
}

/// Two Döner with garlic sauce, 38.00 CHF.
pub fn order_request(phone: Option<&str>) -> CreateOrderRequest {
	serde_json::from_value(json!({
		"lines": [{
			"id": "l1",
			"item": {"id": "doner", "name": "Döner", "price_cents": 1900},
			"qty": 2,
			"specs": {"sauce": ["knoblauch"]}
		}],
		"total_cents": 3800,
		"customer_phone": phone,
	}))
	.unwrap()
}
