//! Payrexx payment provider.
//!
//! Sessions are Payrexx "Gateways": a form-encoded POST returns a hosted
//! checkout link. Webhook payloads vary between event types, so the parser
//! looks for the transaction under `data`, `transaction` or `gateway`.

use crate::{
	PaymentError, PaymentInterface, PaymentOutcome, PaymentSession, SessionRequest, WebhookEvent,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use takeaway_types::{
	non_empty, ConfigSchema, Field, FieldType, Schema, SecretString, ValidationError,
};

const DEFAULT_API_URL: &str = "https://api.payrexx.com/v1.0/Gateway";

/// Payrexx provider.
pub struct PayrexxPayment {
	client: reqwest::Client,
	api_url: String,
	instance: String,
	api_key: SecretString,
	payment_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
	#[serde(default)]
	data: Vec<Gateway>,
}

#[derive(Debug, Deserialize)]
struct Gateway {
	id: Option<Value>,
	link: Option<String>,
}

impl PayrexxPayment {
	fn form(&self, request: &SessionRequest) -> Vec<(&'static str, String)> {
		let mut form = vec![
			("amount", request.amount_cents.to_string()),
			("currency", request.currency.clone()),
			("referenceId", request.reference_id.clone()),
			("purpose", request.purpose.clone()),
			("successRedirectUrl", request.success_url.clone()),
			("failedRedirectUrl", request.failed_url.clone()),
			("cancelRedirectUrl", request.cancel_url.clone()),
		];
		for method in &self.payment_methods {
			form.push(("paymentMethods[]", method.clone()));
		}
		form
	}
}

/// Renders a JSON id (Payrexx sends numbers) as a string.
fn id_string(value: &Value) -> Option<String> {
	match value {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

/// Interprets a Payrexx webhook payload.
pub fn interpret_webhook(payload: &Value) -> WebhookEvent {
	let event = payload.get("event").and_then(Value::as_str).unwrap_or("");
	let data = ["data", "transaction", "gateway"]
		.iter()
		.find_map(|key| payload.get(*key).filter(|v| v.is_object()));

	let Some(data) = data else {
		return WebhookEvent {
			reference_id: None,
			transaction_id: None,
			outcome: PaymentOutcome::Other,
		};
	};

	let reference_id = ["referenceId", "reference_id"]
		.iter()
		.find_map(|key| data.get(*key).and_then(id_string));
	let transaction_id = data.get("id").and_then(id_string);
	let status = data.get("status").and_then(Value::as_str).unwrap_or("");

	let outcome = if event.contains("succeeded") || status == "confirmed" || status == "authorized" {
		PaymentOutcome::Succeeded
	} else if status == "error" || event.contains("failed") {
		PaymentOutcome::Failed
	} else {
		PaymentOutcome::Other
	};

	WebhookEvent {
		reference_id,
		transaction_id,
		outcome,
	}
}

#[async_trait]
impl PaymentInterface for PayrexxPayment {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(PayrexxSchema)
	}

	async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession, PaymentError> {
		let response = self
			.client
			.post(&self.api_url)
			.query(&[("instance", self.instance.as_str())])
			.bearer_auth(self.api_key.expose_secret())
			.form(&self.form(request))
			.send()
			.await
			.map_err(|e| PaymentError::Network(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(PaymentError::Gateway(format!(
				"HTTP {}: {}",
				status.as_u16(),
				body
			)));
		}

		let parsed: GatewayResponse = response
			.json()
			.await
			.map_err(|e| PaymentError::InvalidResponse(e.to_string()))?;
		let gateway = parsed
			.data
			.into_iter()
			.next()
			.ok_or_else(|| PaymentError::InvalidResponse("empty data".into()))?;

		match (gateway.link, gateway.id.as_ref().and_then(id_string)) {
			(Some(redirect_url), Some(gateway_id)) if !redirect_url.is_empty() => Ok(PaymentSession {
				redirect_url,
				gateway_id,
			}),
			_ => Err(PaymentError::InvalidResponse(
				"gateway without link or id".into(),
			)),
		}
	}

	fn parse_webhook(&self, payload: &Value) -> WebhookEvent {
		interpret_webhook(payload)
	}
}

/// Configuration schema for Payrexx.
pub struct PayrexxSchema;

impl ConfigSchema for PayrexxSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("instance", FieldType::String).with_validator(non_empty),
				Field::new("api_key", FieldType::String).with_validator(non_empty),
			],
			vec![
				Field::new(
					"payment_methods",
					FieldType::Array(Box::new(FieldType::String)),
				),
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

/// Factory function to create the Payrexx provider.
///
/// Configuration parameters:
/// - `instance`: Payrexx instance name (required)
/// - `api_key`: API secret (required)
/// - `payment_methods`: allowed methods (default: ["twint"])
/// - `api_url`: endpoint override
/// - `timeout_seconds`: HTTP client timeout (default: 15)
pub fn create_payment(config: &toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError> {
	PayrexxSchema
		.validate(config)
		.map_err(|e| PaymentError::Configuration(e.to_string()))?;

	let get_str = |key: &str| config.get(key).and_then(|v| v.as_str()).unwrap_or_default();
	let payment_methods = config
		.get("payment_methods")
		.and_then(|v| v.as_array())
		.map(|items| {
			items
				.iter()
				.filter_map(|v| v.as_str().map(str::to_string))
				.collect()
		})
		.unwrap_or_else(|| vec!["twint".to_string()]);
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.unwrap_or(15) as u64;

	let client = reqwest::Client::builder()
		.timeout(Duration::from_secs(timeout))
		.build()
		.map_err(|e| PaymentError::Configuration(e.to_string()))?;

	let api_url = match get_str("api_url") {
		"" => DEFAULT_API_URL,
		url => url,
	};

	Ok(Box::new(PayrexxPayment {
		client,
		api_url: api_url.to_string(),
		instance: get_str("instance").to_string(),
		api_key: SecretString::from(get_str("api_key")),
		payment_methods,
	}))
}

/// Registry for the Payrexx provider.
pub struct Registry;

impl takeaway_types::ImplementationRegistry for Registry {
	const NAME: &'static str = "payrexx";
	type Factory = crate::PaymentFactory;

	fn factory() -> Self::Factory {
		create_payment
	}
}

impl crate::PaymentRegistry for Registry {}
