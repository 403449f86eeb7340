//! Order lifecycle engine of the takeaway shop.
//!
//! Ties the order store to its side effects: a status change to `ready`
//! triggers the ready SMS, and payment webhooks update the payment fields.
//! The HTTP service talks to the shop exclusively through [`ShopEngine`].

use chrono::{DateTime, Utc};
use std::sync::Arc;
use takeaway_config::Config;
use takeaway_notify::NotificationService;
use takeaway_payment::PaymentService;
use takeaway_storage::StorageService;
use takeaway_types::{truncate_id, CreateOrderRequest, Order, OrderStatus};
use tracing::instrument;

pub mod builder;
pub mod handlers;
pub mod state;

#[cfg(test)]
pub(crate) mod test_utils;

pub use builder::{BuilderError, ShopBuilder, ShopFactories};
pub use handlers::{
	DispatchOutcome, NotificationDispatcher, PaymentHandler, PaymentHandlerError, SkipReason,
};
pub use state::{OrderStore, OrderStoreError, OrderStoreSettings};

/// Which orders a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderView {
	/// Every order.
	All,
	/// Orders the kitchen still works with.
	Active,
	/// Orders picked up longer than the archive grace period ago.
	Archive,
}

/// Main engine coordinating orders, notifications and payments.
pub struct ShopEngine {
	config: Config,
	storage: Arc<StorageService>,
	store: Arc<OrderStore>,
	dispatcher: Arc<NotificationDispatcher>,
	payments: PaymentHandler,
}

impl ShopEngine {
	/// Creates a new shop engine with the given services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		store: Arc<OrderStore>,
		notifier: Option<Arc<NotificationService>>,
		payment: Option<Arc<PaymentService>>,
		claim_lease: chrono::Duration,
	) -> Self {
		Self {
			config,
			dispatcher: Arc::new(NotificationDispatcher::new(store.clone(), notifier, claim_lease)),
			payments: PaymentHandler::new(store.clone(), payment),
			storage,
			store,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn orders(&self) -> &Arc<OrderStore> {
		&self.store
	}

	pub fn notifications_enabled(&self) -> bool {
		self.dispatcher.is_enabled()
	}

	pub fn payments_enabled(&self) -> bool {
		self.payments.is_enabled()
	}

	pub async fn create_order(&self, request: CreateOrderRequest) -> Result<Order, OrderStoreError> {
		self.store.create(request).await
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStoreError> {
		self.store.get(order_id).await
	}

	/// Lists orders of one view at `now`, newest first, at most `limit`.
	pub async fn list_orders(
		&self,
		view: OrderView,
		now: DateTime<Utc>,
		limit: usize,
	) -> Result<Vec<Order>, OrderStoreError> {
		match view {
			OrderView::All => self.store.list(limit).await,
			OrderView::Active => self.store.list_active(now, limit).await,
			OrderView::Archive => self.store.list_archive(now, limit).await,
		}
	}

	/// Changes the kitchen status and runs the ready side effect.
	///
	/// The returned order is re-read after the side effect, so it reflects
	/// `sms_notified` as stored. A failed SMS never fails the status change.
	/// The dispatch runs on its own task: dropping this future (request
	/// timeout, client disconnect) does not abandon a claimed send.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn set_status(&self, order_id: &str, status: &str) -> Result<Order, OrderStoreError> {
		let order = self.store.set_status(order_id, status).await?;
		if order.status != OrderStatus::Ready {
			return Ok(order);
		}

		let dispatcher = self.dispatcher.clone();
		let id = order_id.to_string();
		match tokio::spawn(async move { dispatcher.on_ready(&id).await }).await {
			Ok(outcome) => tracing::debug!(outcome = ?outcome, "Ready side effect finished"),
			Err(e) => tracing::error!(error = %e, "Ready side effect task failed"),
		}
		match self.store.get(order_id).await {
			Ok(current) => Ok(current),
			Err(e) => {
				tracing::warn!(error = %e, "Re-read after status change failed");
				Ok(order)
			},
		}
	}

	/// Opens a checkout session and returns the redirect URL.
	pub async fn start_payment(&self, order_id: &str) -> Result<String, PaymentHandlerError> {
		self.payments.start_session(order_id).await
	}

	/// Applies a payment webhook; see [`PaymentHandler::handle_webhook`].
	pub async fn handle_payment_webhook(
		&self,
		payload: &serde_json::Value,
	) -> Result<Option<Order>, PaymentHandlerError> {
		self.payments.handle_webhook(payload).await
	}

	/// Checks that the storage backend answers.
	pub async fn health(&self) -> Result<(), OrderStoreError> {
		self.storage
			.ping()
			.await
			.map_err(|e| OrderStoreError::Storage(e.to_string()))
	}
}
