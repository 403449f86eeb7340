//! Ready SMS dispatch.
//!
//! Runs after every status change that lands on `ready`. At most one SMS is
//! ever delivered per order: the send is claimed on the order document first,
//! and only the claim holder talks to the provider. Nothing here can fail the
//! status change that triggered it.

use crate::state::{OrderStore, SmsClaim};
use chrono::{Duration, Utc};
use std::sync::Arc;
use takeaway_notify::NotificationService;
use takeaway_types::truncate_id;
use tracing::instrument;

/// Why no SMS was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
	NoPhone,
	AlreadyNotified,
	InFlight,
	NotReady,
}

/// What happened when an order became ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
	Sent { message_id: Option<String> },
	Skipped(SkipReason),
	/// The send or its bookkeeping failed; the order stays unnotified.
	Failed(String),
	/// No SMS provider is configured.
	Disabled,
}

/// Sends the ready SMS at most once per order.
pub struct NotificationDispatcher {
	store: Arc<OrderStore>,
	notifier: Option<Arc<NotificationService>>,
	claim_lease: Duration,
}

impl NotificationDispatcher {
	/// Creates a dispatcher. Without `notifier` every dispatch is a no-op.
	pub fn new(
		store: Arc<OrderStore>,
		notifier: Option<Arc<NotificationService>>,
		claim_lease: Duration,
	) -> Self {
		Self {
			store,
			notifier,
			claim_lease,
		}
	}

	pub fn is_enabled(&self) -> bool {
		self.notifier.is_some()
	}

	/// Sends the ready SMS for `order_id` if it is still owed.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn on_ready(&self, order_id: &str) -> DispatchOutcome {
		let Some(notifier) = &self.notifier else {
			return DispatchOutcome::Disabled;
		};

		let phone = match self.store.claim_sms(order_id, Utc::now(), self.claim_lease).await {
			Ok(SmsClaim::Claimed { phone }) => phone,
			Ok(SmsClaim::NoPhone) => return DispatchOutcome::Skipped(SkipReason::NoPhone),
			Ok(SmsClaim::AlreadyNotified) => {
				return DispatchOutcome::Skipped(SkipReason::AlreadyNotified)
			},
			Ok(SmsClaim::InFlight) => {
				tracing::debug!("Ready SMS already in flight");
				return DispatchOutcome::Skipped(SkipReason::InFlight);
			},
			Ok(SmsClaim::NotReady) => return DispatchOutcome::Skipped(SkipReason::NotReady),
			Err(e) => {
				tracing::warn!(error = %e, "Failed to claim ready SMS");
				return DispatchOutcome::Failed(e.to_string());
			},
		};

		match notifier.send_ready(&phone).await {
			Ok(receipt) => {
				if let Err(e) = self.store.finish_sms(order_id, true).await {
					// The claim expires on its own; a retry after the lease may resend.
					tracing::error!(error = %e, "SMS sent but not recorded");
					return DispatchOutcome::Failed(e.to_string());
				}
				tracing::info!(message_id = ?receipt.message_id, "Ready SMS sent");
				DispatchOutcome::Sent {
					message_id: receipt.message_id,
				}
			},
			Err(e) => {
				tracing::warn!(error = %e, "Ready SMS failed");
				if let Err(release) = self.store.finish_sms(order_id, false).await {
					tracing::warn!(error = %release, "Failed to release SMS claim");
				}
				DispatchOutcome::Failed(e.to_string())
			},
		}
	}
}
