//! Order store.
//!
//! Owns the canonical order documents. Every mutation is a read-modify-write
//! guarded by the storage backend's compare-and-swap, retried a bounded
//! number of times when another writer touched the same order in between.
//!
//! Listings never read the whole history. Two indexes keyed by creation
//! time point at the documents: one holds every order, the other only
//! orders that are not archived yet. Open entries are added on creation and
//! after every status change; a listing that meets an archived order drops
//! its entry, then re-reads the order and restores the entry if a status
//! change reopened it in between.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use takeaway_config::TransitionPolicy;
use takeaway_storage::{IndexEntry, StorageError, StorageService};
use takeaway_types::{
	normalize_e164, truncate_id, CreateOrderRequest, Order, OrderStatus, PaymentStatus, StorageKey,
};
use thiserror::Error;
use tracing::instrument;

/// Attempts made by [`OrderStore::update_with`] before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 8;

/// Most index entries read per storage round trip while listing.
const LIST_PAGE: usize = 32;

/// Errors that can occur during order store operations.
#[derive(Debug, Error)]
pub enum OrderStoreError {
	#[error("Invalid input: {0}")]
	InvalidInput(String),
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Invalid status: {0}")]
	InvalidStatus(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Too many concurrent updates of order {0}")]
	Contention(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl OrderStoreError {
	fn from_storage(order_id: &str, err: StorageError) -> Self {
		match err {
			StorageError::NotFound => OrderStoreError::NotFound(order_id.to_string()),
			other => OrderStoreError::Storage(other.to_string()),
		}
	}
}

fn storage_err(err: StorageError) -> OrderStoreError {
	OrderStoreError::Storage(err.to_string())
}

/// Index sort key of an order: its creation time, fixed width.
fn creation_key(order: &Order) -> String {
	order.created_at.format("%Y%m%dT%H%M%S%.9fZ").to_string()
}

fn page_size(limit: usize) -> usize {
	limit.clamp(1, LIST_PAGE)
}

/// Result of trying to claim the ready SMS of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsClaim {
	/// The caller owns the send and must finish it with [`OrderStore::finish_sms`].
	Claimed { phone: String },
	NoPhone,
	AlreadyNotified,
	/// Another send holds an unexpired claim.
	InFlight,
	/// The order left `ready` before the claim.
	NotReady,
}

/// Settings the store applies to new orders and status changes.
#[derive(Debug, Clone)]
pub struct OrderStoreSettings {
	pub currency: String,
	pub default_country_code: String,
	pub archive_grace: Duration,
	pub transition_policy: TransitionPolicy,
}

impl Default for OrderStoreSettings {
	fn default() -> Self {
		Self {
			currency: "CHF".to_string(),
			default_country_code: "+41".to_string(),
			archive_grace: Duration::minutes(3),
			transition_policy: TransitionPolicy::Permissive,
		}
	}
}

/// Persists orders and enforces their lifecycle rules.
pub struct OrderStore {
	storage: Arc<StorageService>,
	settings: OrderStoreSettings,
}

impl OrderStore {
	pub fn new(storage: Arc<StorageService>, settings: OrderStoreSettings) -> Self {
		Self { storage, settings }
	}

	pub fn settings(&self) -> &OrderStoreSettings {
		&self.settings
	}

	/// Validates and stores a new order in `in_queue`.
	pub async fn create(&self, request: CreateOrderRequest) -> Result<Order, OrderStoreError> {
		if request.lines.is_empty() {
			return Err(OrderStoreError::InvalidInput(
				"order must contain at least one line".into(),
			));
		}
		if let Some(pos) = request.lines.iter().position(|line| line.qty == 0) {
			return Err(OrderStoreError::InvalidInput(format!(
				"line {} has quantity 0",
				pos
			)));
		}
		if request.total_cents <= 0 {
			return Err(OrderStoreError::InvalidInput(
				"total_cents must be positive".into(),
			));
		}

		let customer_phone = match request.customer_phone.as_deref().map(str::trim) {
			None | Some("") => None,
			Some(raw) => Some(
				normalize_e164(raw, &self.settings.default_country_code).ok_or_else(|| {
					OrderStoreError::InvalidInput(format!("invalid phone number '{}'", raw))
				})?,
			),
		};
		let customer_email = match request.customer_email.as_deref().map(str::trim) {
			None | Some("") => None,
			Some(email) if email.contains('@') => Some(email.to_string()),
			Some(email) => {
				return Err(OrderStoreError::InvalidInput(format!(
					"invalid email address '{}'",
					email
				)))
			},
		};

		let now = Utc::now();
		let order = Order {
			id: uuid::Uuid::new_v4().to_string(),
			lines: request.lines,
			total_cents: request.total_cents,
			status: OrderStatus::InQueue,
			customer_email,
			customer_phone,
			sms_notified: false,
			sms_claimed_at: None,
			payment_status: PaymentStatus::Unpaid,
			payment_provider: None,
			payment_ref: None,
			currency: self.settings.currency.clone(),
			created_at: now,
			updated_at: now,
		};

		let sort_key = creation_key(&order);
		for index in [StorageKey::OrdersByCreation, StorageKey::OpenOrders] {
			self.storage
				.add_to_index(index.as_str(), &sort_key, &order.id)
				.await
				.map_err(storage_err)?;
		}
		self.storage
			.insert_new(StorageKey::Orders.as_str(), &order.id, &order)
			.await
			.map_err(storage_err)?;

		tracing::info!(
			order_id = %truncate_id(&order.id),
			lines = order.lines.len(),
			total_cents = order.total_cents,
			"Order created"
		);
		Ok(order)
	}

	pub async fn get(&self, order_id: &str) -> Result<Order, OrderStoreError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| OrderStoreError::from_storage(order_id, e))
	}

	/// Up to `limit` orders, newest created first.
	pub async fn list(&self, limit: usize) -> Result<Vec<Order>, OrderStoreError> {
		self.collect_created(limit, |_| true).await
	}

	/// Up to `limit` orders the kitchen still works with at `now`.
	pub async fn list_active(
		&self,
		now: DateTime<Utc>,
		limit: usize,
	) -> Result<Vec<Order>, OrderStoreError> {
		let grace = self.settings.archive_grace;
		// Entries are only dropped for orders archived in real time too.
		let retire_at = now.min(Utc::now());
		let mut orders = Vec::new();
		let mut cursor: Option<IndexEntry> = None;
		while orders.len() < limit {
			let page = self
				.storage
				.index_page(StorageKey::OpenOrders.as_str(), cursor.as_ref(), page_size(limit))
				.await
				.map_err(storage_err)?;
			if page.is_empty() {
				break;
			}
			for entry in &page {
				let Some(order) = self.load_entry(entry).await? else {
					continue;
				};
				if !order.is_archived(now, grace) {
					orders.push(order);
				} else if order.is_archived(retire_at, grace) {
					if let Some(reopened) = self.retire_open_entry(entry, now).await? {
						orders.push(reopened);
					}
				}
				if orders.len() == limit {
					break;
				}
			}
			cursor = page.into_iter().last();
		}
		Ok(orders)
	}

	/// Up to `limit` orders picked up at least the archive grace period
	/// before `now`, newest created first.
	pub async fn list_archive(
		&self,
		now: DateTime<Utc>,
		limit: usize,
	) -> Result<Vec<Order>, OrderStoreError> {
		let grace = self.settings.archive_grace;
		self.collect_created(limit, |order| order.is_archived(now, grace))
			.await
	}

	/// Walks the creation index newest first until `limit` orders pass `keep`.
	async fn collect_created<F>(&self, limit: usize, keep: F) -> Result<Vec<Order>, OrderStoreError>
	where
		F: Fn(&Order) -> bool,
	{
		let mut orders = Vec::new();
		let mut cursor: Option<IndexEntry> = None;
		while orders.len() < limit {
			let page = self
				.storage
				.index_page(
					StorageKey::OrdersByCreation.as_str(),
					cursor.as_ref(),
					page_size(limit),
				)
				.await
				.map_err(storage_err)?;
			if page.is_empty() {
				break;
			}
			for entry in &page {
				match self.load_entry(entry).await? {
					Some(order) if keep(&order) => orders.push(order),
					_ => {},
				}
				if orders.len() == limit {
					break;
				}
			}
			cursor = page.into_iter().last();
		}
		Ok(orders)
	}

	/// Reads the order an index entry points at.
	///
	/// Entries without a document (a creation that failed half way) and
	/// documents that no longer decode are skipped.
	async fn load_entry(&self, entry: &IndexEntry) -> Result<Option<Order>, OrderStoreError> {
		match self
			.storage
			.retrieve::<Order>(StorageKey::Orders.as_str(), &entry.id)
			.await
		{
			Ok(order) => Ok(Some(order)),
			Err(StorageError::NotFound) => Ok(None),
			Err(StorageError::Serialization(e)) => {
				tracing::warn!(key = %entry.key(), error = %e, "Skipping undecodable order");
				Ok(None)
			},
			Err(e) => Err(storage_err(e)),
		}
	}

	/// Drops the open entry of an archived order.
	///
	/// Returns the order when a concurrent status change reopened it, in
	/// which case the entry is written back.
	async fn retire_open_entry(
		&self,
		entry: &IndexEntry,
		now: DateTime<Utc>,
	) -> Result<Option<Order>, OrderStoreError> {
		self.storage
			.remove_from_index(entry)
			.await
			.map_err(storage_err)?;
		match self.load_entry(entry).await? {
			Some(order) if !order.is_archived(now, self.settings.archive_grace) => {
				self.index_open(&order).await?;
				Ok(Some(order))
			},
			_ => Ok(None),
		}
	}

	async fn index_open(&self, order: &Order) -> Result<(), OrderStoreError> {
		self.storage
			.add_to_index(
				StorageKey::OpenOrders.as_str(),
				&creation_key(order),
				&order.id,
			)
			.await
			.map_err(storage_err)
	}

	/// Applies `apply` to the stored order and writes the result back atomically.
	///
	/// `apply` returns `Ok(false)` to leave the order untouched; the current
	/// document is returned in that case. On a lost race the order is re-read
	/// and `apply` runs again.
	pub async fn update_with<F>(&self, order_id: &str, mut apply: F) -> Result<Order, OrderStoreError>
	where
		F: FnMut(&mut Order) -> Result<bool, OrderStoreError>,
	{
		let namespace = StorageKey::Orders.as_str();
		for attempt in 1..=MAX_UPDATE_ATTEMPTS {
			let current = self
				.storage
				.retrieve_versioned::<Order>(namespace, order_id)
				.await
				.map_err(|e| OrderStoreError::from_storage(order_id, e))?;

			let mut order = current.value.clone();
			if !apply(&mut order)? {
				return Ok(current.value);
			}

			let written = self
				.storage
				.replace(namespace, order_id, &current, &order)
				.await
				.map_err(|e| OrderStoreError::from_storage(order_id, e))?;
			if written {
				return Ok(order);
			}
			tracing::debug!(
				order_id = %truncate_id(order_id),
				attempt,
				"Concurrent order update, retrying"
			);
		}
		Err(OrderStoreError::Contention(order_id.to_string()))
	}

	/// Sets the kitchen status, refreshes `updated_at` and puts the order
	/// back on the open index.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), status = %status))]
	pub async fn set_status(&self, order_id: &str, status: &str) -> Result<Order, OrderStoreError> {
		let next: OrderStatus = status
			.parse()
			.map_err(|_| OrderStoreError::InvalidStatus(status.to_string()))?;
		let policy = self.settings.transition_policy;

		let order = self
			.update_with(order_id, |order| {
				if policy == TransitionPolicy::ForwardOnly && next.rank() < order.status.rank() {
					return Err(OrderStoreError::InvalidTransition {
						from: order.status,
						to: next,
					});
				}
				order.status = next;
				order.updated_at = Utc::now();
				Ok(true)
			})
			.await?;
		self.index_open(&order).await?;

		tracing::info!(status = %order.status, "Order status changed");
		Ok(order)
	}

	/// Records the provider and its session id once a checkout has been opened.
	pub async fn set_payment_ref(
		&self,
		order_id: &str,
		provider: &str,
		reference: &str,
	) -> Result<Order, OrderStoreError> {
		self.update_with(order_id, |order| {
			order.payment_provider = Some(provider.to_string());
			order.payment_ref = Some(reference.to_string());
			Ok(true)
		})
		.await
	}

	/// Marks the order paid. Re-delivery of the same event is harmless.
	pub async fn mark_paid(&self, order_id: &str, reference: &str) -> Result<Order, OrderStoreError> {
		let order = self
			.update_with(order_id, |order| {
				order.payment_status = PaymentStatus::Paid;
				order.payment_ref = Some(reference.to_string());
				Ok(true)
			})
			.await?;
		tracing::info!(order_id = %truncate_id(order_id), "Order paid");
		Ok(order)
	}

	/// Marks the order failed unless it is already paid.
	pub async fn mark_failed(
		&self,
		order_id: &str,
		reference: Option<&str>,
	) -> Result<Order, OrderStoreError> {
		let order = self
			.update_with(order_id, |order| {
				if order.payment_status == PaymentStatus::Paid {
					return Ok(false);
				}
				order.payment_status = PaymentStatus::Failed;
				order.payment_ref = reference.map(str::to_string);
				Ok(true)
			})
			.await?;
		if order.payment_status == PaymentStatus::Paid {
			tracing::warn!(
				order_id = %truncate_id(order_id),
				"Ignoring payment failure for paid order"
			);
		}
		Ok(order)
	}

	/// Claims the ready SMS for the caller if nobody sent or is sending it.
	///
	/// A claim older than `lease` counts as abandoned.
	pub async fn claim_sms(
		&self,
		order_id: &str,
		now: DateTime<Utc>,
		lease: Duration,
	) -> Result<SmsClaim, OrderStoreError> {
		let mut claim = SmsClaim::NotReady;
		self.update_with(order_id, |order| {
			claim = match (&order.customer_phone, order.sms_claimed_at) {
				_ if order.status != OrderStatus::Ready => SmsClaim::NotReady,
				(None, _) => SmsClaim::NoPhone,
				_ if order.sms_notified => SmsClaim::AlreadyNotified,
				(_, Some(claimed_at)) if now - claimed_at < lease => SmsClaim::InFlight,
				(Some(phone), _) => SmsClaim::Claimed {
					phone: phone.clone(),
				},
			};
			if !matches!(claim, SmsClaim::Claimed { .. }) {
				return Ok(false);
			}
			order.sms_claimed_at = Some(now);
			Ok(true)
		})
		.await?;
		Ok(claim)
	}

	/// Releases an SMS claim, recording whether the message went out.
	pub async fn finish_sms(&self, order_id: &str, delivered: bool) -> Result<Order, OrderStoreError> {
		self.update_with(order_id, |order| {
			order.sms_claimed_at = None;
			if delivered {
				order.sms_notified = true;
			}
			Ok(true)
		})
		.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use serde_json::json;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use takeaway_storage::implementations::memory::MemoryStorage;
	use takeaway_storage::StorageInterface;
	use takeaway_types::{ConfigSchema, OrderLine};

	fn store_with(policy: TransitionPolicy) -> OrderStore {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let settings = OrderStoreSettings {
			transition_policy: policy,
			..OrderStoreSettings::default()
		};
		OrderStore::new(storage, settings)
	}

	fn store() -> OrderStore {
		store_with(TransitionPolicy::Permissive)
	}

	fn doner_line() -> OrderLine {
		serde_json::from_value(json!({
			"id": "l1",
			"item": {"id": "doner", "name": "Döner", "price_cents": 1900},
			"qty": 2,
			"specs": {"sauce": ["knoblauch"]}
		}))
		.unwrap()
	}

	fn request(phone: Option<&str>) -> CreateOrderRequest {
		CreateOrderRequest {
			lines: vec![doner_line()],
			total_cents: 3800,
			customer_email: None,
			customer_phone: phone.map(str::to_string),
		}
	}

	#[tokio::test]
	async fn test_create_and_get_round_trip() {
		let store = store();
		let created = store.create(request(Some("079 123 45 67"))).await.unwrap();

		let fetched = store.get(&created.id).await.unwrap();
		assert_eq!(fetched, created);
		assert_eq!(fetched.status, OrderStatus::InQueue);
		assert_eq!(fetched.total_cents, 3800);
		assert_eq!(fetched.lines[0].qty, 2);
		assert_eq!(fetched.customer_phone.as_deref(), Some("+41791234567"));
		assert_eq!(fetched.payment_status, PaymentStatus::Unpaid);
		assert_eq!(fetched.currency, "CHF");
		assert!(!fetched.sms_notified);
	}

	#[tokio::test]
	async fn test_create_rejects_invalid_input() {
		let store = store();

		let mut empty = request(None);
		empty.lines.clear();
		assert!(matches!(
			store.create(empty).await,
			Err(OrderStoreError::InvalidInput(_))
		));

		let mut zero_total = request(None);
		zero_total.total_cents = 0;
		assert!(matches!(
			store.create(zero_total).await,
			Err(OrderStoreError::InvalidInput(_))
		));

		let mut zero_qty = request(None);
		zero_qty.lines[0].qty = 0;
		assert!(matches!(
			store.create(zero_qty).await,
			Err(OrderStoreError::InvalidInput(_))
		));

		assert!(matches!(
			store.create(request(Some("12"))).await,
			Err(OrderStoreError::InvalidInput(_))
		));

		let mut bad_email = request(None);
		bad_email.customer_email = Some("not-an-email".into());
		assert!(matches!(
			store.create(bad_email).await,
			Err(OrderStoreError::InvalidInput(_))
		));

		assert!(store.list(10).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_blank_contact_fields_are_absent() {
		let store = store();
		let mut req = request(Some("   "));
		req.customer_email = Some(" ".into());
		let order = store.create(req).await.unwrap();
		assert_eq!(order.customer_phone, None);
		assert_eq!(order.customer_email, None);
	}

	#[tokio::test]
	async fn test_get_unknown_order() {
		assert!(matches!(
			store().get("missing").await,
			Err(OrderStoreError::NotFound(id)) if id == "missing"
		));
	}

	#[tokio::test]
	async fn test_invalid_status_leaves_order_unchanged() {
		let store = store();
		let order = store.create(request(None)).await.unwrap();

		let err = store.set_status(&order.id, "bogus").await.unwrap_err();
		assert!(matches!(err, OrderStoreError::InvalidStatus(s) if s == "bogus"));
		assert_eq!(store.get(&order.id).await.unwrap(), order);
	}

	#[tokio::test]
	async fn test_set_status_refreshes_updated_at() {
		let store = store();
		let order = store.create(request(None)).await.unwrap();
		let updated = store.set_status(&order.id, "preparing").await.unwrap();
		assert_eq!(updated.status, OrderStatus::Preparing);
		assert!(updated.updated_at >= order.updated_at);
		assert_eq!(updated.created_at, order.created_at);
	}

	#[tokio::test]
	async fn test_set_status_unknown_order() {
		assert!(matches!(
			store().set_status("missing", "ready").await,
			Err(OrderStoreError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn test_transition_policies() {
		let permissive = store_with(TransitionPolicy::Permissive);
		let order = permissive.create(request(None)).await.unwrap();
		permissive.set_status(&order.id, "ready").await.unwrap();
		let back = permissive.set_status(&order.id, "in_queue").await.unwrap();
		assert_eq!(back.status, OrderStatus::InQueue);

		let strict = store_with(TransitionPolicy::ForwardOnly);
		let order = strict.create(request(None)).await.unwrap();
		strict.set_status(&order.id, "ready").await.unwrap();
		strict.set_status(&order.id, "ready").await.unwrap();
		let err = strict.set_status(&order.id, "preparing").await.unwrap_err();
		assert!(matches!(
			err,
			OrderStoreError::InvalidTransition {
				from: OrderStatus::Ready,
				to: OrderStatus::Preparing
			}
		));
		assert_eq!(strict.get(&order.id).await.unwrap().status, OrderStatus::Ready);
	}

	fn ids(orders: Vec<Order>) -> Vec<String> {
		orders.into_iter().map(|o| o.id).collect()
	}

	#[tokio::test]
	async fn test_archive_boundary() {
		let store = store();
		let order = store.create(request(None)).await.unwrap();
		let picked = store.set_status(&order.id, "picked_up").await.unwrap();
		let at = picked.updated_at;

		let just_before = at + Duration::minutes(3) - Duration::milliseconds(1);
		assert_eq!(ids(store.list_active(just_before, 50).await.unwrap()), vec![order.id.clone()]);
		assert!(store.list_archive(just_before, 50).await.unwrap().is_empty());

		let boundary = at + Duration::minutes(3);
		assert!(store.list_active(boundary, 50).await.unwrap().is_empty());
		assert_eq!(ids(store.list_archive(boundary, 50).await.unwrap()), vec![order.id.clone()]);
		assert_eq!(ids(store.list_active(at, 50).await.unwrap()), vec![order.id.clone()]);

		// A ready order never archives.
		store.set_status(&order.id, "ready").await.unwrap();
		let far = at + Duration::days(1);
		assert_eq!(store.list_active(far, 50).await.unwrap().len(), 1);
		assert!(store.list_archive(far, 50).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_list_newest_first_up_to_limit() {
		let store = store();
		let mut created = Vec::new();
		for _ in 0..5 {
			created.push(store.create(request(None)).await.unwrap());
		}
		created.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
		let expected = ids(created);

		assert_eq!(ids(store.list(50).await.unwrap()), expected);
		assert_eq!(ids(store.list(2).await.unwrap()), expected[..2]);
		assert_eq!(ids(store.list_active(Utc::now(), 3).await.unwrap()), expected[..3]);
		assert!(store.list(0).await.unwrap().is_empty());
	}

	async fn open_ids(storage: &StorageService) -> Vec<String> {
		storage
			.index_page(StorageKey::OpenOrders.as_str(), None, 50)
			.await
			.unwrap()
			.into_iter()
			.map(|e| e.id)
			.collect()
	}

	#[tokio::test]
	async fn test_archived_orders_leave_the_open_index() {
		let storage = Arc::new(StorageService::new(Box::new(MemoryStorage::new())));
		let settings = OrderStoreSettings {
			archive_grace: Duration::zero(),
			..OrderStoreSettings::default()
		};
		let store = OrderStore::new(storage.clone(), settings);

		let done = store.create(request(None)).await.unwrap();
		let waiting = store.create(request(None)).await.unwrap();
		store.set_status(&done.id, "picked_up").await.unwrap();
		assert_eq!(open_ids(&storage).await.len(), 2);

		let active = store.list_active(Utc::now(), 50).await.unwrap();
		assert_eq!(ids(active), vec![waiting.id.clone()]);
		assert_eq!(open_ids(&storage).await, vec![waiting.id.clone()]);

		// Archive and full listings still see it.
		assert_eq!(ids(store.list_archive(Utc::now(), 50).await.unwrap()), vec![done.id.clone()]);
		assert_eq!(store.list(50).await.unwrap().len(), 2);

		store.set_status(&done.id, "ready").await.unwrap();
		let active = store.list_active(Utc::now(), 50).await.unwrap();
		assert_eq!(active.len(), 2);
		assert!(active.iter().any(|o| o.id == done.id));
	}

	#[tokio::test]
	async fn test_listing_reads_only_what_it_returns() {
		let backend = CountingStorage::default();
		let reads = backend.reads.clone();
		let storage = Arc::new(StorageService::new(Box::new(backend.clone())));
		let store = OrderStore::new(storage, OrderStoreSettings::default());
		let mut created = Vec::new();
		for _ in 0..40 {
			created.push(store.create(request(None)).await.unwrap());
		}
		// A broken document deep in the history does not matter to the board.
		backend
			.inner
			.set_bytes(&format!("orders:{}", created[0].id), b"{not json".to_vec())
			.await
			.unwrap();

		reads.store(0, Ordering::SeqCst);
		assert_eq!(store.list(5).await.unwrap().len(), 5);
		assert_eq!(reads.load(Ordering::SeqCst), 5);

		reads.store(0, Ordering::SeqCst);
		assert_eq!(store.list_active(Utc::now(), 3).await.unwrap().len(), 3);
		assert_eq!(reads.load(Ordering::SeqCst), 3);

		assert_eq!(store.list(50).await.unwrap().len(), 39);
	}

	/// Memory backend that counts document reads.
	#[derive(Clone, Default)]
	struct CountingStorage {
		inner: MemoryStorage,
		reads: Arc<AtomicUsize>,
	}

	#[async_trait]
	impl StorageInterface for CountingStorage {
		async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
			self.reads.fetch_add(1, Ordering::SeqCst);
			self.inner.get_bytes(key).await
		}

		async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
			self.inner.set_bytes(key, value).await
		}

		async fn exists(&self, key: &str) -> Result<bool, StorageError> {
			self.inner.exists(key).await
		}

		async fn compare_and_swap(
			&self,
			key: &str,
			expected: Option<&[u8]>,
			value: Vec<u8>,
		) -> Result<bool, StorageError> {
			self.inner.compare_and_swap(key, expected, value).await
		}

		async fn delete(&self, key: &str) -> Result<(), StorageError> {
			self.inner.delete(key).await
		}

		async fn scan_keys(
			&self,
			prefix: &str,
			before: Option<&str>,
			limit: usize,
		) -> Result<Vec<String>, StorageError> {
			self.inner.scan_keys(prefix, before, limit).await
		}

		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			self.inner.config_schema()
		}
	}

	#[tokio::test]
	async fn test_payment_fields() {
		let store = store();
		let order = store.create(request(None)).await.unwrap();

		let with_ref = store.set_payment_ref(&order.id, "payrexx", "gw-7").await.unwrap();
		assert_eq!(with_ref.payment_provider.as_deref(), Some("payrexx"));
		assert_eq!(with_ref.payment_ref.as_deref(), Some("gw-7"));
		assert_eq!(with_ref.payment_status, PaymentStatus::Unpaid);
		assert_eq!(with_ref.updated_at, order.updated_at);

		let paid = store.mark_paid(&order.id, "tx-1").await.unwrap();
		let again = store.mark_paid(&order.id, "tx-1").await.unwrap();
		assert_eq!(paid.payment_status, PaymentStatus::Paid);
		assert_eq!(again, paid);

		let stale = store.mark_failed(&order.id, None).await.unwrap();
		assert_eq!(stale.payment_status, PaymentStatus::Paid);
		assert_eq!(stale.payment_ref.as_deref(), Some("tx-1"));
	}

	#[tokio::test]
	async fn test_mark_failed_clears_reference() {
		let store = store();
		let order = store.create(request(None)).await.unwrap();
		store.set_payment_ref(&order.id, "payrexx", "gw-1").await.unwrap();
		let failed = store.mark_failed(&order.id, None).await.unwrap();
		assert_eq!(failed.payment_status, PaymentStatus::Failed);
		assert_eq!(failed.payment_ref, None);
	}

	#[tokio::test]
	async fn test_sms_claim_lifecycle() {
		let store = store();
		let order = store.create(request(Some("+41791234567"))).await.unwrap();
		let lease = Duration::seconds(60);
		let now = Utc::now();

		assert_eq!(store.claim_sms(&order.id, now, lease).await.unwrap(), SmsClaim::NotReady);

		store.set_status(&order.id, "ready").await.unwrap();
		assert_eq!(
			store.claim_sms(&order.id, now, lease).await.unwrap(),
			SmsClaim::Claimed {
				phone: "+41791234567".into()
			}
		);
		assert_eq!(store.claim_sms(&order.id, now, lease).await.unwrap(), SmsClaim::InFlight);

		// An abandoned claim can be taken over.
		let later = now + lease;
		assert!(matches!(
			store.claim_sms(&order.id, later, lease).await.unwrap(),
			SmsClaim::Claimed { .. }
		));

		let done = store.finish_sms(&order.id, true).await.unwrap();
		assert!(done.sms_notified);
		assert_eq!(done.sms_claimed_at, None);
		assert_eq!(
			store.claim_sms(&order.id, later, lease).await.unwrap(),
			SmsClaim::AlreadyNotified
		);
	}

	#[tokio::test]
	async fn test_sms_claim_without_phone() {
		let store = store();
		let order = store.create(request(None)).await.unwrap();
		store.set_status(&order.id, "ready").await.unwrap();
		assert_eq!(
			store
				.claim_sms(&order.id, Utc::now(), Duration::seconds(60))
				.await
				.unwrap(),
			SmsClaim::NoPhone
		);
	}

	#[tokio::test]
	async fn test_concurrent_updates_all_apply() {
		let store = Arc::new(store());
		let order = store.create(request(None)).await.unwrap();

		let tasks: Vec<_> = (0..4)
			.map(|i| {
				let store = store.clone();
				let id = order.id.clone();
				tokio::spawn(async move {
					store
						.update_with(&id, |o| {
							o.total_cents += 1;
							o.payment_ref = Some(format!("w{}", i));
							Ok(true)
						})
						.await
				})
			})
			.collect();
		for task in tasks {
			task.await.unwrap().unwrap();
		}
		assert_eq!(store.get(&order.id).await.unwrap().total_cents, 3804);
	}
}
