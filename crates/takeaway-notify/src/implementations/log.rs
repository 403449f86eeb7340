//! Provider that only logs messages.
//!
//! For development and for shops that do not want to pay for SMS yet; the
//! order lifecycle behaves exactly as with a real provider.

use crate::{NotifyError, SmsInterface, SmsReceipt};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use takeaway_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

/// Writes every message to the log instead of sending it.
#[derive(Default)]
pub struct LogSms {
	prefix: String,
	sent: AtomicU64,
}

impl LogSms {
	/// Creates a provider whose receipts are numbered `{prefix}-{n}`.
	pub fn new(prefix: impl Into<String>) -> Self {
		Self {
			prefix: prefix.into(),
			sent: AtomicU64::new(0),
		}
	}
}

/// Masks all but the last three digits of a phone number.
fn mask(number: &str) -> String {
	let visible = number.len().saturating_sub(3);
	number
		.char_indices()
		.map(|(i, c)| if i < visible && c.is_ascii_digit() { '*' } else { c })
		.collect()
}

#[async_trait]
impl SmsInterface for LogSms {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LogSmsSchema)
	}

	async fn send(&self, to: &str, text: &str) -> Result<SmsReceipt, NotifyError> {
		let n = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
		tracing::info!(to = %mask(to), text = %text, "SMS (log provider)");
		Ok(SmsReceipt {
			message_id: Some(format!("{}-{}", self.prefix, n)),
		})
	}
}

/// Configuration schema for the log provider.
pub struct LogSmsSchema;

impl ConfigSchema for LogSmsSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![Field::new("prefix", FieldType::String)]).validate(config)
	}
}

/// Factory function to create the log provider.
///
/// Configuration parameters:
/// - `prefix`: prefix of the generated message ids (default: "log")
pub fn create_sms(config: &toml::Value) -> Result<Box<dyn SmsInterface>, NotifyError> {
	LogSmsSchema
		.validate(config)
		.map_err(|e| NotifyError::Configuration(e.to_string()))?;
	let prefix = config
		.get("prefix")
		.and_then(|v| v.as_str())
		.unwrap_or("log");
	Ok(Box::new(LogSms::new(prefix)))
}

/// Registry for the log provider.
pub struct Registry;

impl takeaway_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "log";
	type Factory = crate::SmsFactory;

	fn factory() -> Self::Factory {
		create_sms
	}
}

impl crate::SmsRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_mask() {
		assert_eq!(mask("+41791234567"), "+********567");
		assert_eq!(mask("12"), "12");
	}

	#[tokio::test]
	async fn test_receipts_are_numbered() {
		let sms = create_sms(&toml::from_str("prefix = \"dev\"").unwrap()).unwrap();
		let first = sms.send("+41791234567", "a").await.unwrap();
		let second = sms.send("+41791234567", "b").await.unwrap();
		assert_eq!(first.message_id.as_deref(), Some("dev-1"));
		assert_eq!(second.message_id.as_deref(), Some("dev-2"));
	}
}
