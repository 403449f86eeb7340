//! Payment endpoints.
//!
//! `start` opens a hosted checkout for an order. `webhook` receives the
//! provider's callbacks and always acknowledges them, so the provider does
//! not keep redelivering; applying an event twice is harmless.

use super::{json_rejection, payment_error};
use crate::server::AppState;
use axum::{
	body::Bytes,
	extract::{rejection::JsonRejection, State},
	Json,
};
use takeaway_types::{APIError, StartPaymentRequest, StartPaymentResponse, WebhookAck};

/// Handles POST /api/payments/start.
pub async fn start_payment(
	State(state): State<AppState>,
	body: Result<Json<StartPaymentRequest>, JsonRejection>,
) -> Result<Json<StartPaymentResponse>, APIError> {
	let Json(request) = body.map_err(json_rejection)?;
	let order_id = request.order_id.unwrap_or_default();
	let redirect_url = state
		.shop
		.start_payment(&order_id)
		.await
		.map_err(payment_error)?;
	Ok(Json(StartPaymentResponse { redirect_url }))
}

/// Handles POST /api/payments/webhook.
pub async fn payment_webhook(State(state): State<AppState>, body: Bytes) -> Json<WebhookAck> {
	match serde_json::from_slice::<serde_json::Value>(&body) {
		Ok(payload) => {
			if let Err(e) = state.shop.handle_payment_webhook(&payload).await {
				tracing::warn!(error = %e, "Payment webhook not applied");
			}
		},
		Err(e) => tracing::warn!(error = %e, "Unreadable payment webhook"),
	}
	Json(WebhookAck { ok: true })
}
