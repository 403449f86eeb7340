//! Payment provider for development and tests.
//!
//! Sessions point at `{redirect_base}/pay/{order}`. Webhooks use a flat
//! payload: `{"referenceId": "...", "transactionId": "...", "status":
//! "paid" | "failed"}`.

use crate::{
	PaymentError, PaymentInterface, PaymentOutcome, PaymentSession, SessionRequest, WebhookEvent,
};
use async_trait::async_trait;
use serde_json::Value;
use takeaway_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};

/// Mock payment provider.
pub struct MockPayment {
	redirect_base: String,
	fail_sessions: bool,
}

impl MockPayment {
	/// Creates a mock; with `fail_sessions` every session start fails.
	pub fn new(redirect_base: &str, fail_sessions: bool) -> Self {
		Self {
			redirect_base: redirect_base.trim_end_matches('/').to_string(),
			fail_sessions,
		}
	}
}

#[async_trait]
impl PaymentInterface for MockPayment {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockPaymentSchema)
	}

	async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession, PaymentError> {
		if self.fail_sessions {
			return Err(PaymentError::Gateway("mock configured to fail".into()));
		}
		Ok(PaymentSession {
			redirect_url: format!("{}/pay/{}", self.redirect_base, request.reference_id),
			gateway_id: format!("mock-{}", request.reference_id),
		})
	}

	fn parse_webhook(&self, payload: &Value) -> WebhookEvent {
		let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);
		let outcome = match payload.get("status").and_then(Value::as_str) {
			Some("paid") => PaymentOutcome::Succeeded,
			Some("failed") => PaymentOutcome::Failed,
			_ => PaymentOutcome::Other,
		};
		WebhookEvent {
			reference_id: text("referenceId"),
			transaction_id: text("transactionId"),
			outcome,
		}
	}
}

/// Configuration schema for the mock provider.
pub struct MockPaymentSchema;

impl ConfigSchema for MockPaymentSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![
				Field::new("redirect_base", FieldType::Url),
				Field::new("fail_sessions", FieldType::Boolean),
			],
		)
		.validate(config)
	}
}

/// Factory function to create the mock provider.
///
/// Configuration parameters:
/// - `redirect_base`: base of the fake checkout URLs (default: "http://localhost:3000/mock-pay")
/// - `fail_sessions`: make every session start fail (default: false)
pub fn create_payment(config: &toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError> {
	MockPaymentSchema
		.validate(config)
		.map_err(|e| PaymentError::Configuration(e.to_string()))?;
	let redirect_base = config
		.get("redirect_base")
		.and_then(|v| v.as_str())
		.unwrap_or("http://localhost:3000/mock-pay");
	let fail_sessions = config
		.get("fail_sessions")
		.and_then(|v| v.as_bool())
		.unwrap_or(false);
	Ok(Box::new(MockPayment::new(redirect_base, fail_sessions)))
}

/// Registry for the mock provider.
pub struct Registry;

impl takeaway_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = crate::PaymentFactory;

	fn factory() -> Self::Factory {
		create_payment
	}
}

impl crate::PaymentRegistry for Registry {}
