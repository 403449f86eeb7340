//! Payment handler.
//!
//! Opens checkout sessions for orders and applies provider webhooks to the
//! payment fields of an order. The kitchen status is never touched here.

use crate::state::{OrderStore, OrderStoreError};
use std::sync::Arc;
use takeaway_payment::{PaymentOutcome, PaymentService};
use takeaway_types::{truncate_id, Order, PaymentStatus};
use thiserror::Error;
use tracing::instrument;

/// Errors that can occur while handling payments.
#[derive(Debug, Error)]
pub enum PaymentHandlerError {
	#[error("Order id required")]
	MissingOrderId,
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Order already paid: {0}")]
	AlreadyPaid(String),
	#[error("Payments are not configured")]
	NotConfigured,
	#[error("Payment provider error: {0}")]
	Upstream(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<OrderStoreError> for PaymentHandlerError {
	fn from(err: OrderStoreError) -> Self {
		match err {
			OrderStoreError::NotFound(id) => PaymentHandlerError::NotFound(id),
			other => PaymentHandlerError::Storage(other.to_string()),
		}
	}
}

/// Connects the payment provider with the order store.
pub struct PaymentHandler {
	store: Arc<OrderStore>,
	payment: Option<Arc<PaymentService>>,
}

impl PaymentHandler {
	pub fn new(store: Arc<OrderStore>, payment: Option<Arc<PaymentService>>) -> Self {
		Self { store, payment }
	}

	pub fn is_enabled(&self) -> bool {
		self.payment.is_some()
	}

	/// Opens a checkout for an unpaid order and returns the redirect URL.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn start_session(&self, order_id: &str) -> Result<String, PaymentHandlerError> {
		if order_id.trim().is_empty() {
			return Err(PaymentHandlerError::MissingOrderId);
		}
		let order = self.store.get(order_id).await?;
		if order.payment_status == PaymentStatus::Paid {
			return Err(PaymentHandlerError::AlreadyPaid(order.id));
		}
		let payment = self
			.payment
			.as_ref()
			.ok_or(PaymentHandlerError::NotConfigured)?;

		let session = payment
			.start_session(&order.id, order.total_cents, &order.currency)
			.await
			.map_err(|e| {
				tracing::warn!(error = %e, "Checkout session failed");
				PaymentHandlerError::Upstream(e.to_string())
			})?;

		self.store
			.set_payment_ref(&order.id, payment.provider_name(), &session.gateway_id)
			.await?;
		tracing::info!(gateway_id = %session.gateway_id, "Checkout session opened");
		Ok(session.redirect_url)
	}

	/// Applies a webhook payload.
	///
	/// Returns the updated order, or `None` when the payload carries nothing
	/// to act on.
	pub async fn handle_webhook(
		&self,
		payload: &serde_json::Value,
	) -> Result<Option<Order>, PaymentHandlerError> {
		let payment = self
			.payment
			.as_ref()
			.ok_or(PaymentHandlerError::NotConfigured)?;
		let event = payment.interpret_webhook(payload);

		let Some(order_id) = event.reference_id.as_deref() else {
			tracing::debug!("Webhook without order reference");
			return Ok(None);
		};

		let order = match event.outcome {
			PaymentOutcome::Succeeded => {
				let reference = event
					.transaction_id
					.as_deref()
					.unwrap_or(payment.provider_name());
				self.store.mark_paid(order_id, reference).await?
			},
			PaymentOutcome::Failed => {
				tracing::info!(order_id = %truncate_id(order_id), "Payment failed");
				self.store
					.mark_failed(order_id, event.transaction_id.as_deref())
					.await?
			},
			PaymentOutcome::Other => {
				tracing::debug!(order_id = %truncate_id(order_id), "Ignoring webhook event");
				return Ok(None);
			},
		};
		Ok(Some(order))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_utils::{memory_store, order_request};
	use serde_json::json;
	use takeaway_payment::implementations::mock::MockPayment;

	fn handler(store: Arc<OrderStore>, fail_sessions: bool) -> PaymentHandler {
		let service = PaymentService::new(
			Box::new(MockPayment::new("https://pay.example", fail_sessions)),
			"mock",
			"https://shop.example",
		);
		PaymentHandler::new(store, Some(Arc::new(service)))
	}

	#[tokio::test]
	async fn test_start_session_records_reference() {
		let store = Arc::new(memory_store());
		let handler = handler(store.clone(), false);
		let order = store.create(order_request(None)).await.unwrap();

		let url = handler.start_session(&order.id).await.unwrap();
		assert_eq!(url, format!("https://pay.example/pay/{}", order.id));

		let stored = store.get(&order.id).await.unwrap();
		assert_eq!(stored.payment_provider.as_deref(), Some("mock"));
		assert_eq!(stored.payment_ref, Some(format!("mock-{}", order.id)));
		assert_eq!(stored.payment_status, PaymentStatus::Unpaid);
	}

	#[tokio::test]
	async fn test_start_session_errors() {
		let store = Arc::new(memory_store());
		let order = store.create(order_request(None)).await.unwrap();

		let ok = handler(store.clone(), false);
		assert!(matches!(
			ok.start_session("").await,
			Err(PaymentHandlerError::MissingOrderId)
		));
		assert!(matches!(
			ok.start_session("missing").await,
			Err(PaymentHandlerError::NotFound(_))
		));

		let failing = handler(store.clone(), true);
		assert!(matches!(
			failing.start_session(&order.id).await,
			Err(PaymentHandlerError::Upstream(_))
		));
		assert_eq!(store.get(&order.id).await.unwrap().payment_ref, None);

		let disabled = PaymentHandler::new(store.clone(), None);
		assert!(matches!(
			disabled.start_session(&order.id).await,
			Err(PaymentHandlerError::NotConfigured)
		));

		store.mark_paid(&order.id, "tx").await.unwrap();
		assert!(matches!(
			ok.start_session(&order.id).await,
			Err(PaymentHandlerError::AlreadyPaid(_))
		));
	}

	#[tokio::test]
	async fn test_webhook_redelivery_stays_paid() {
		let store = Arc::new(memory_store());
		let handler = handler(store.clone(), false);
		let order = store.create(order_request(None)).await.unwrap();
		let payload = json!({"referenceId": order.id, "transactionId": "tx-9", "status": "paid"});

		let first = handler.handle_webhook(&payload).await.unwrap().unwrap();
		let second = handler.handle_webhook(&payload).await.unwrap().unwrap();
		assert_eq!(first.payment_status, PaymentStatus::Paid);
		assert_eq!(second.payment_status, PaymentStatus::Paid);
		assert_eq!(second.payment_ref.as_deref(), Some("tx-9"));

		let stale = json!({"referenceId": order.id, "status": "failed"});
		let after = handler.handle_webhook(&stale).await.unwrap().unwrap();
		assert_eq!(after.payment_status, PaymentStatus::Paid);
	}

	#[tokio::test]
	async fn test_payrexx_confirmed_redelivery_stays_paid() {
		let store = Arc::new(memory_store());
		let config: toml::Value = toml::from_str("instance = \"doner\"\napi_key = \"secret\"").unwrap();
		let provider = takeaway_payment::implementations::payrexx::create_payment(&config).unwrap();
		let service = PaymentService::new(provider, "payrexx", "https://shop.example");
		let handler = PaymentHandler::new(store.clone(), Some(Arc::new(service)));
		let order = store.create(order_request(None)).await.unwrap();

		let payload = json!({"transaction": {"id": 1, "referenceId": order.id, "status": "confirmed"}});
		for _ in 0..2 {
			let paid = handler.handle_webhook(&payload).await.unwrap().unwrap();
			assert_eq!(paid.payment_status, PaymentStatus::Paid);
			assert_eq!(paid.payment_ref.as_deref(), Some("1"));
		}

		let stored = store.get(&order.id).await.unwrap();
		assert_eq!(stored.payment_status, PaymentStatus::Paid);
		assert_eq!(stored.payment_ref.as_deref(), Some("1"));
		assert_eq!(stored.status, order.status);
	}

	#[tokio::test]
	async fn test_webhook_paid_without_transaction_uses_provider_name() {
		let store = Arc::new(memory_store());
		let handler = handler(store.clone(), false);
		let order = store.create(order_request(None)).await.unwrap();

		let paid = handler
			.handle_webhook(&json!({"referenceId": order.id, "status": "paid"}))
			.await
			.unwrap()
			.unwrap();
		assert_eq!(paid.payment_ref.as_deref(), Some("mock"));
	}

	#[tokio::test]
	async fn test_webhook_ignored_payloads() {
		let store = Arc::new(memory_store());
		let handler = handler(store.clone(), false);
		let order = store.create(order_request(None)).await.unwrap();

		assert!(handler
			.handle_webhook(&json!({"status": "paid"}))
			.await
			.unwrap()
			.is_none());
		assert!(handler
			.handle_webhook(&json!({"referenceId": order.id, "status": "pending"}))
			.await
			.unwrap()
			.is_none());
		assert!(matches!(
			handler
				.handle_webhook(&json!({"referenceId": "missing", "status": "paid"}))
				.await,
			Err(PaymentHandlerError::NotFound(_))
		));
		assert_eq!(
			store.get(&order.id).await.unwrap().payment_status,
			PaymentStatus::Unpaid
		);
	}
}
