//! HTTP handlers of the `/api` routes.
//!
//! Handlers translate between the wire types in `takeaway_types::api` and
//! the [`takeaway_core::ShopEngine`], and map domain errors to [`APIError`].

pub mod health;
pub mod order;
pub mod payment;

use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use takeaway_core::{OrderStoreError, PaymentHandlerError};
use takeaway_types::{APIError, SecretString};

/// Header carrying the kitchen PIN.
pub const KITCHEN_PIN_HEADER: &str = "x-kitchen-pin";

/// Whether the request carries a kitchen PIN.
///
/// `Ok(true)` for a matching PIN, `Ok(false)` when the header is absent and
/// `Err` for a wrong PIN.
pub(crate) fn kitchen_access(headers: &HeaderMap, pin: &SecretString) -> Result<bool, APIError> {
	match headers.get(KITCHEN_PIN_HEADER) {
		None => Ok(false),
		Some(value) => match value.to_str() {
			Ok(candidate) if pin.matches(candidate.trim()) => Ok(true),
			_ => Err(APIError::Forbidden {
				message: "Invalid kitchen PIN".to_string(),
			}),
		},
	}
}

/// Requires a matching kitchen PIN.
pub(crate) fn require_kitchen(headers: &HeaderMap, pin: &SecretString) -> Result<(), APIError> {
	if kitchen_access(headers, pin)? {
		Ok(())
	} else {
		Err(APIError::Forbidden {
			message: "Kitchen PIN required".to_string(),
		})
	}
}

pub(crate) fn json_rejection(rejection: JsonRejection) -> APIError {
	APIError::bad_request("INVALID_JSON", rejection.body_text())
}

pub(crate) fn store_error(err: OrderStoreError) -> APIError {
	match err {
		OrderStoreError::InvalidInput(message) => APIError::bad_request("INVALID_INPUT", message),
		OrderStoreError::InvalidStatus(status) => {
			APIError::bad_request("INVALID_STATUS", format!("Invalid status '{}'", status))
		},
		OrderStoreError::NotFound(id) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".to_string(),
			message: format!("Order {} not found", id),
		},
		err @ OrderStoreError::InvalidTransition { .. } => APIError::Conflict {
			error_type: "INVALID_TRANSITION".to_string(),
			message: err.to_string(),
		},
		err @ (OrderStoreError::Contention(_) | OrderStoreError::Storage(_)) => {
			tracing::error!(error = %err, "Order store failure");
			APIError::internal(err.to_string())
		},
	}
}

pub(crate) fn payment_error(err: PaymentHandlerError) -> APIError {
	match err {
		PaymentHandlerError::MissingOrderId => APIError::bad_request("MISSING_ORDER_ID", "orderId required"),
		PaymentHandlerError::NotFound(id) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".to_string(),
			message: format!("Order {} not found", id),
		},
		err @ PaymentHandlerError::AlreadyPaid(_) => APIError::Conflict {
			error_type: "ALREADY_PAID".to_string(),
			message: err.to_string(),
		},
		err @ PaymentHandlerError::NotConfigured => APIError::ServiceUnavailable {
			error_type: "PAYMENTS_NOT_CONFIGURED".to_string(),
			message: err.to_string(),
		},
		err @ PaymentHandlerError::Upstream(_) => APIError::BadGateway {
			error_type: "GATEWAY_FAILED".to_string(),
			message: err.to_string(),
		},
		err @ PaymentHandlerError::Storage(_) => {
			tracing::error!(error = %err, "Payment storage failure");
			APIError::internal(err.to_string())
		},
	}
}
