//! API types for the takeaway HTTP API.
//!
//! Request and response bodies of the `/api` routes plus the [`APIError`]
//! type every handler returns on failure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::order::{Order, OrderLine, OrderStatus, PaymentStatus};

/// Default number of orders returned by the list endpoint.
pub const DEFAULT_LIST_LIMIT: usize = 50;
/// Upper bound for the `limit` query parameter.
pub const MAX_LIST_LIMIT: usize = 200;

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
	pub lines: Vec<OrderLine>,
	pub total_cents: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub customer_phone: Option<String>,
}

/// Response of `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderResponse {
	pub id: String,
	pub status: OrderStatus,
}

/// Body of `PATCH /api/orders/{id}`.
///
/// The status is kept as a raw string so unknown values surface as an
/// `InvalidStatus` error instead of a generic body rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
	pub status: String,
}

/// Query string of `GET /api/orders`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListOrdersQuery {
	#[serde(default)]
	pub archived: Option<String>,
	#[serde(default)]
	pub limit: Option<String>,
}

impl ListOrdersQuery {
	/// True when the archive view was requested (`archived=1` or `archived=true`).
	pub fn wants_archive(&self) -> bool {
		matches!(self.archived.as_deref(), Some("1") | Some("true"))
	}

	/// The requested limit, defaulting to 50 and clamped to `1..=200`.
	///
	/// Unparseable values fall back to the default.
	pub fn effective_limit(&self) -> usize {
		match self.limit.as_deref().map(str::trim).map(str::parse::<i64>) {
			Some(Ok(n)) => n.clamp(1, MAX_LIST_LIMIT as i64) as usize,
			_ => DEFAULT_LIST_LIMIT,
		}
	}
}

/// Public view of an order.
///
/// Contact details and internal bookkeeping never leave the server through
/// this type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderResponse {
	pub id: String,
	pub lines: Vec<OrderLine>,
	pub total_cents: i64,
	pub status: OrderStatus,
	pub sms_notified: bool,
	pub payment_status: PaymentStatus,
	pub currency: String,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
	fn from(order: &Order) -> Self {
		Self {
			id: order.id.clone(),
			lines: order.lines.clone(),
			total_cents: order.total_cents,
			status: order.status,
			sms_notified: order.sms_notified,
			payment_status: order.payment_status,
			currency: order.currency.clone(),
			created_at: order.created_at,
			updated_at: order.updated_at,
		}
	}
}

impl From<Order> for OrderResponse {
	fn from(order: Order) -> Self {
		Self::from(&order)
	}
}

/// Body of `POST /api/payments/start`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartPaymentRequest {
	#[serde(rename = "orderId", default)]
	pub order_id: Option<String>,
}

/// Response of `POST /api/payments/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPaymentResponse {
	#[serde(rename = "redirectUrl")]
	pub redirect_url: String,
}

/// Acknowledgement returned by the payment webhook.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookAck {
	pub ok: bool,
}

/// Response of `GET /api/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
	pub ok: bool,
	pub time: DateTime<Utc>,
}

/// Error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Machine-readable error code.
	pub error: String,
	/// Human-readable message.
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<serde_json::Value>,
}

/// Errors returned by the HTTP handlers.
#[derive(Debug)]
pub enum APIError {
	/// Invalid input (400).
	BadRequest {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Missing or wrong kitchen PIN (403).
	Forbidden { message: String },
	/// Unknown order (404).
	NotFound { error_type: String, message: String },
	/// Request conflicts with the order's current state (409).
	Conflict { error_type: String, message: String },
	/// An upstream provider failed (502).
	BadGateway { error_type: String, message: String },
	/// A required provider is not configured (503).
	ServiceUnavailable { error_type: String, message: String },
	/// Internal server error (500).
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Shorthand for a 400 without details.
	pub fn bad_request(error_type: &str, message: impl Into<String>) -> Self {
		APIError::BadRequest {
			error_type: error_type.to_string(),
			message: message.into(),
			details: None,
		}
	}

	/// Shorthand for a 500.
	pub fn internal(message: impl Into<String>) -> Self {
		APIError::InternalServerError {
			error_type: "INTERNAL_ERROR".to_string(),
			message: message.into(),
		}
	}

	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::BadGateway { .. } => 502,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message, details) = match self {
			APIError::BadRequest {
				error_type,
				message,
				details,
			} => (error_type.as_str(), message, details.clone()),
			APIError::Forbidden { message } => ("FORBIDDEN", message, None),
			APIError::NotFound {
				error_type,
				message,
			}
			| APIError::Conflict {
				error_type,
				message,
			}
			| APIError::BadGateway {
				error_type,
				message,
			}
			| APIError::ServiceUnavailable {
				error_type,
				message,
			}
			| APIError::InternalServerError {
				error_type,
				message,
			} => (error_type.as_str(), message, None),
		};
		ErrorResponse {
			error: error.to_string(),
			message: message.clone(),
			details,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::Forbidden { message } => write!(f, "Forbidden: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			APIError::BadGateway { message, .. } => write!(f, "Bad Gateway: {}", message),
			APIError::ServiceUnavailable { message, .. } => {
				write!(f, "Service Unavailable: {}", message)
			},
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_limit_defaults_and_clamps() {
		let query = |limit: Option<&str>| ListOrdersQuery {
			archived: None,
			limit: limit.map(str::to_string),
		};
		assert_eq!(query(None).effective_limit(), 50);
		assert_eq!(query(Some("10")).effective_limit(), 10);
		assert_eq!(query(Some("0")).effective_limit(), 1);
		assert_eq!(query(Some("-5")).effective_limit(), 1);
		assert_eq!(query(Some("5000")).effective_limit(), 200);
		assert_eq!(query(Some("abc")).effective_limit(), 50);
	}

	#[test]
	fn test_wants_archive() {
		let mut query = ListOrdersQuery::default();
		assert!(!query.wants_archive());
		query.archived = Some("1".to_string());
		assert!(query.wants_archive());
		query.archived = Some("0".to_string());
		assert!(!query.wants_archive());
	}

	#[test]
	fn test_start_payment_request_uses_camel_case() {
		let req: StartPaymentRequest = serde_json::from_value(json!({"orderId": "abc"})).unwrap();
		assert_eq!(req.order_id.as_deref(), Some("abc"));
		let req: StartPaymentRequest = serde_json::from_value(json!({})).unwrap();
		assert!(req.order_id.is_none());
		assert_eq!(
			serde_json::to_value(StartPaymentResponse {
				redirect_url: "https://pay".to_string()
			})
			.unwrap(),
			json!({"redirectUrl": "https://pay"})
		);
	}

	#[test]
	fn test_error_response_shape() {
		let err = APIError::Conflict {
			error_type: "ALREADY_PAID".to_string(),
			message: "Order already paid".to_string(),
		};
		assert_eq!(err.status_code(), 409);
		let body = serde_json::to_value(err.to_error_response()).unwrap();
		assert_eq!(
			body,
			json!({"error": "ALREADY_PAID", "message": "Order already paid"})
		);
		assert_eq!(APIError::Forbidden { message: "x".into() }.status_code(), 403);
	}
}
