//! BulkGate SMS provider.
//!
//! Uses the "simple transactional" endpoint: one JSON POST per message,
//! authenticated by application id and token in the body.

use crate::{NotifyError, SmsInterface, SmsReceipt};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use takeaway_types::{
	non_empty, ConfigSchema, Field, FieldType, Schema, SecretString, ValidationError,
};

const DEFAULT_API_URL: &str = "https://portal.bulkgate.com/api/1.0/simple/transactional";
const DEFAULT_SENDER_ID: &str = "gText";
const DEFAULT_SENDER_VALUE: &str = "DonerShop";

/// Request body of the transactional endpoint.
#[derive(Debug, Serialize)]
struct TransactionalRequest<'a> {
	application_id: &'a str,
	application_token: &'a str,
	number: &'a str,
	text: &'a str,
	sender_id: &'a str,
	sender_id_value: &'a str,
}

/// BulkGate provider.
pub struct BulkGateSms {
	client: reqwest::Client,
	api_url: String,
	application_id: String,
	application_token: SecretString,
	sender_id: String,
	sender_id_value: String,
}

impl BulkGateSms {
	fn request<'a>(&'a self, to: &'a str, text: &'a str) -> TransactionalRequest<'a> {
		TransactionalRequest {
			application_id: &self.application_id,
			application_token: self.application_token.expose_secret(),
			number: to,
			text,
			sender_id: &self.sender_id,
			sender_id_value: &self.sender_id_value,
		}
	}
}

#[async_trait]
impl SmsInterface for BulkGateSms {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(BulkGateSchema)
	}

	async fn send(&self, to: &str, text: &str) -> Result<SmsReceipt, NotifyError> {
		let response = self
			.client
			.post(&self.api_url)
			.json(&self.request(to, text))
			.send()
			.await
			.map_err(|e| NotifyError::Network(e.to_string()))?;

		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| NotifyError::Network(e.to_string()))?;
		if !status.is_success() {
			return Err(NotifyError::Rejected(format!("HTTP {}: {}", status.as_u16(), body)));
		}

		// The message id is informational; an unexpected body still counts as sent.
		let message_id = serde_json::from_str::<serde_json::Value>(&body)
			.ok()
			.and_then(|v| {
				v.pointer("/data/sms_id")
					.and_then(|id| id.as_str())
					.map(str::to_string)
			});
		tracing::debug!(message_id = ?message_id, "BulkGate accepted message");
		Ok(SmsReceipt { message_id })
	}
}

/// Configuration schema for BulkGate.
pub struct BulkGateSchema;

impl ConfigSchema for BulkGateSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("application_id", FieldType::String).with_validator(non_empty),
				Field::new("application_token", FieldType::String).with_validator(non_empty),
			],
			vec![
				Field::new("sender_id", FieldType::String),
				Field::new("sender_id_value", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(s) if s.is_ascii() && s.len() <= 11 => Ok(()),
						_ => Err("must be at most 11 ASCII characters".to_string()),
					}
				}),
				Field::new("api_url", FieldType::Url),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(120),
					},
				),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create the BulkGate provider.
///
/// Configuration parameters:
/// - `application_id`, `application_token`: BulkGate credentials (required)
/// - `sender_id`: sender type (default: "gText")
/// - `sender_id_value`: sender name shown to the customer (default: "DonerShop")
/// - `api_url`: endpoint override
/// - `timeout_seconds`: HTTP client timeout (default: 10)
pub fn create_sms(config: &toml::Value) -> Result<Box<dyn SmsInterface>, NotifyError> {
	BulkGateSchema
		.validate(config)
		.map_err(|e| NotifyError::Configuration(e.to_string()))?;

	let text = |key: &str, default: &str| -> String {
		config
			.get(key)
			.and_then(|v| v.as_str())
			.unwrap_or(default)
			.to_string()
	};
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(10) as u64;

	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(timeout))
		.build()
		.map_err(|e| NotifyError::Configuration(e.to_string()))?;

	Ok(Box::new(BulkGateSms {
		client,
		api_url: text("api_url", DEFAULT_API_URL),
		application_id: text("application_id", ""),
		application_token: SecretString::new(text("application_token", "")),
		sender_id: text("sender_id", DEFAULT_SENDER_ID),
		sender_id_value: text("sender_id_value", DEFAULT_SENDER_VALUE),
	}))
}

/// Registry for the BulkGate provider.
pub struct Registry;

impl takeaway_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "bulkgate";
	type Factory = crate::SmsFactory;

	fn factory() -> Self::Factory {
		create_sms
	}
}

impl crate::SmsRegistry for Registry {}
