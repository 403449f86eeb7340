//! Online payment module for the takeaway ordering system.
//!
//! A payment provider does two things for the shop: it opens a hosted
//! checkout session for an order and it interprets the webhook calls it
//! later makes back to the shop. Everything in between (card data, TWINT
//! flows, refunds) stays on the provider's side.

use async_trait::async_trait;
use takeaway_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod mock;
	pub mod payrexx;
}

/// Errors that can occur while talking to a payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
	/// The provider could not be reached.
	#[error("Network error: {0}")]
	Network(String),
	/// The provider answered with an error status.
	#[error("Gateway error: {0}")]
	Gateway(String),
	/// The provider answered successfully but without the expected data.
	#[error("Invalid gateway response: {0}")]
	InvalidResponse(String),
	/// The provider configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Everything a provider needs to open a checkout for one order.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
	/// Order id, sent as the provider-side reference.
	pub reference_id: String,
	/// Amount in minor units, at least 1.
	pub amount_cents: i64,
	pub currency: String,
	/// Text shown to the customer on the checkout page.
	pub purpose: String,
	pub success_url: String,
	pub failed_url: String,
	pub cancel_url: String,
}

/// An opened checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSession {
	/// Where to send the customer.
	pub redirect_url: String,
	/// Provider-side id of the session.
	pub gateway_id: String,
}

/// What a webhook call says about a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
	Succeeded,
	Failed,
	/// Anything else: pending, refunded, unknown events.
	Other,
}

/// A webhook call reduced to the fields the shop acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
	/// Order id the payment belongs to, if the payload names one.
	pub reference_id: Option<String>,
	/// Provider-side transaction id.
	pub transaction_id: Option<String>,
	pub outcome: PaymentOutcome,
}

/// Interface implemented by every payment provider.
#[async_trait]
pub trait PaymentInterface: Send + Sync {
	/// Returns the configuration schema for this provider.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Opens a hosted checkout session.
	async fn create_session(&self, request: &SessionRequest) -> Result<PaymentSession, PaymentError>;

	/// Interprets a webhook payload. Never fails: unknown shapes yield an
	/// event without reference.
	fn parse_webhook(&self, payload: &serde_json::Value) -> WebhookEvent;
}

/// Type alias for payment provider factory functions.
pub type PaymentFactory = fn(&toml::Value) -> Result<Box<dyn PaymentInterface>, PaymentError>;

/// Registry trait for payment provider implementations.
pub trait PaymentRegistry: ImplementationRegistry<Factory = PaymentFactory> {}

/// Get all registered payment provider implementations.
pub fn get_all_implementations() -> Vec<(&'static str, PaymentFactory)> {
	use implementations::{mock, payrexx};

	vec![
		(mock::Registry::NAME, mock::Registry::factory()),
		(payrexx::Registry::NAME, payrexx::Registry::factory()),
	]
}

/// Wraps the configured provider and builds session requests for orders.
pub struct PaymentService {
	provider: Box<dyn PaymentInterface>,
	provider_name: String,
	app_base_url: String,
}

impl PaymentService {
	/// Creates a service for `provider`, registered under `provider_name`.
	///
	/// `app_base_url` is the public URL of the shop front end; redirect URLs
	/// are derived from it.
	pub fn new(
		provider: Box<dyn PaymentInterface>,
		provider_name: impl Into<String>,
		app_base_url: &str,
	) -> Self {
		Self {
			provider,
			provider_name: provider_name.into(),
			app_base_url: app_base_url.trim_end_matches('/').to_string(),
		}
	}

	/// Name stored as `payment_provider` on orders.
	pub fn provider_name(&self) -> &str {
		&self.provider_name
	}

	/// Builds the session request for an order.
	pub fn session_request(&self, order_id: &str, total_cents: i64, currency: &str) -> SessionRequest {
		let redirect = |outcome: &str| {
			format!("{}/checkout/{}?order={}", self.app_base_url, outcome, order_id)
		};
		SessionRequest {
			reference_id: order_id.to_string(),
			amount_cents: total_cents.max(1),
			currency: currency.to_string(),
			purpose: format!("Bestellung {}", order_id),
			success_url: redirect("success"),
			failed_url: redirect("failed"),
			cancel_url: redirect("cancel"),
		}
	}

	/// Opens a checkout session for an order.
	pub async fn start_session(
		&self,
		order_id: &str,
		total_cents: i64,
		currency: &str,
	) -> Result<PaymentSession, PaymentError> {
		let request = self.session_request(order_id, total_cents, currency);
		tracing::info!(
			provider = %self.provider_name,
			order_id = %takeaway_types::truncate_id(order_id),
			amount = %takeaway_types::format_cents(request.amount_cents, currency),
			"Opening checkout session"
		);
		self.provider.create_session(&request).await
	}

	/// Interprets a webhook payload.
	pub fn interpret_webhook(&self, payload: &serde_json::Value) -> WebhookEvent {
		self.provider.parse_webhook(payload)
	}
}
