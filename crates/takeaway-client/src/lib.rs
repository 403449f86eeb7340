//! HTTP client for the takeaway order API.
//!
//! Used by customer-facing frontends and tools that talk to the service:
//! placing orders, following their status and starting a checkout. The
//! [`session`] module keeps the ids of the orders placed in one session.

use std::time::Duration;
use takeaway_types::{
	CreateOrderRequest, CreateOrderResponse, ErrorResponse, OrderResponse, StartPaymentRequest,
	StartPaymentResponse, UpdateStatusRequest,
};
use thiserror::Error;

pub mod session;

pub use session::{OrderSnapshot, SessionStore, StatusBoard, StatusRefresh};

/// Header carrying the kitchen PIN.
pub const KITCHEN_PIN_HEADER: &str = "x-kitchen-pin";

/// Errors returned by the order client.
#[derive(Debug, Error)]
pub enum ClientError {
	/// The request never produced a response.
	#[error("Network error: {0}")]
	Network(String),
	/// The service answered with an error body.
	#[error("API error {status} {code}: {message}")]
	Api {
		status: u16,
		code: String,
		message: String,
	},
	/// The response body did not have the expected shape.
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	/// Local session file could not be read or written.
	#[error("Session storage error: {0}")]
	Session(String),
}

impl ClientError {
	/// HTTP status of an API error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			ClientError::Api { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Client for the `/api` routes of one shop.
#[derive(Clone)]
pub struct OrderClient {
	client: reqwest::Client,
	base_url: String,
	kitchen_pin: Option<String>,
}

impl OrderClient {
	/// Creates a client for the service at `base_url` (without the `/api` suffix).
	pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
		let client = reqwest::Client::builder()
			.timeout(Duration::from_secs(15))
			.build()
			.map_err(|e| ClientError::Network(e.to_string()))?;
		Ok(Self {
			client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			kitchen_pin: None,
		})
	}

	/// Sends the kitchen PIN with every request.
	pub fn with_kitchen_pin(mut self, pin: impl Into<String>) -> Self {
		self.kitchen_pin = Some(pin.into());
		self
	}

	fn url(&self, path: &str) -> String {
		format!("{}/api{}", self.base_url, path)
	}

	fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		match &self.kitchen_pin {
			Some(pin) => request.header(KITCHEN_PIN_HEADER, pin),
			None => request,
		}
	}

	async fn send<T: serde::de::DeserializeOwned>(
		&self,
		request: reqwest::RequestBuilder,
	) -> Result<T, ClientError> {
		let response = self
			.authorize(request)
			.send()
			.await
			.map_err(|e| ClientError::Network(e.to_string()))?;

		let status = response.status();
		let body = response
			.text()
			.await
			.map_err(|e| ClientError::Network(e.to_string()))?;

		if !status.is_success() {
			return Err(match serde_json::from_str::<ErrorResponse>(&body) {
				Ok(error) => ClientError::Api {
					status: status.as_u16(),
					code: error.error,
					message: error.message,
				},
				Err(_) => ClientError::Api {
					status: status.as_u16(),
					code: "UNKNOWN".to_string(),
					message: body,
				},
			});
		}

		serde_json::from_str(&body).map_err(|e| ClientError::InvalidResponse(e.to_string()))
	}

	/// Places an order.
	pub async fn create_order(
		&self,
		request: &CreateOrderRequest,
	) -> Result<CreateOrderResponse, ClientError> {
		let response: CreateOrderResponse =
			self.send(self.client.post(self.url("/orders")).json(request)).await?;
		tracing::debug!(order_id = %response.id, "Placed order");
		Ok(response)
	}

	/// Fetches one order.
	pub async fn get_order(&self, order_id: &str) -> Result<OrderResponse, ClientError> {
		self.send(self.client.get(self.url(&format!("/orders/{}", order_id))))
			.await
	}

	/// Lists orders.
	///
	/// With a kitchen PIN this is the active board, or the archive when
	/// `archived` is set.
	pub async fn list_orders(
		&self,
		archived: bool,
		limit: Option<usize>,
	) -> Result<Vec<OrderResponse>, ClientError> {
		let mut query: Vec<(&str, String)> = Vec::new();
		if archived {
			query.push(("archived", "1".to_string()));
		}
		if let Some(limit) = limit {
			query.push(("limit", limit.to_string()));
		}
		self.send(self.client.get(self.url("/orders")).query(&query))
			.await
	}

	/// Changes the kitchen status of an order. Requires the kitchen PIN.
	pub async fn set_status(
		&self,
		order_id: &str,
		status: &str,
	) -> Result<OrderResponse, ClientError> {
		let body = UpdateStatusRequest {
			status: status.to_string(),
		};
		self.send(
			self.client
				.patch(self.url(&format!("/orders/{}", order_id)))
				.json(&body),
		)
		.await
	}

	/// Opens a checkout session and returns the URL to redirect the customer to.
	pub async fn start_payment(&self, order_id: &str) -> Result<String, ClientError> {
		let body = StartPaymentRequest {
			order_id: Some(order_id.to_string()),
		};
		let response: StartPaymentResponse = self
			.send(self.client.post(self.url("/payments/start")).json(&body))
			.await?;
		Ok(response.redirect_url)
	}
}

#[cfg(test)]
pub(crate) mod test_server {
	use axum::extract::Path;
	use axum::http::{HeaderMap, StatusCode};
	use axum::routing::{get, post};
	use axum::{Json, Router};
	use serde_json::{json, Value};

	pub(crate) fn order_json(id: &str, status: &str) -> Value {
		json!({
			"id": id,
			"lines": [{"item": "Döner", "qty": 1}],
			"total_cents": 1200,
			"status": status,
			"sms_notified": false,
			"payment_status": "unpaid",
			"currency": "CHF",
			"created_at": "2026-10-16T12:00:00Z",
			"updated_at": "2026-10-16T12:00:00Z"
		})
	}

	fn status_of(id: &str) -> Option<&'static str> {
		match id {
			"queued" => Some("in_queue"),
			"ready" => Some("ready"),
			"done" => Some("picked_up"),
			_ => None,
		}
	}

	async fn get_order(Path(id): Path<String>) -> (StatusCode, Json<Value>) {
		match status_of(&id) {
			Some(status) => (StatusCode::OK, Json(order_json(&id, status))),
			None => (
				StatusCode::NOT_FOUND,
				Json(json!({"error": "ORDER_NOT_FOUND", "message": format!("Order {} not found", id)})),
			),
		}
	}

	async fn patch_order(
		headers: HeaderMap,
		Path(id): Path<String>,
		Json(body): Json<Value>,
	) -> (StatusCode, Json<Value>) {
		if headers.get("x-kitchen-pin").and_then(|v| v.to_str().ok()) != Some("4711") {
			return (
				StatusCode::FORBIDDEN,
				Json(json!({"error": "FORBIDDEN", "message": "Kitchen PIN required"})),
			);
		}
		let status = body["status"].as_str().unwrap_or_default().to_string();
		(StatusCode::OK, Json(order_json(&id, &status)))
	}

	/// Starts a canned order API on an ephemeral port and returns its base URL.
	pub(crate) async fn spawn() -> String {
		let app = Router::new()
			.route(
				"/api/orders",
				post(|| async {
					(
						StatusCode::CREATED,
						Json(json!({"id": "queued", "status": "in_queue"})),
					)
				})
				.get(|| async { Json(json!([order_json("queued", "in_queue")])) }),
			)
			.route("/api/orders/{id}", get(get_order).patch(patch_order))
			.route(
				"/api/payments/start",
				post(|| async { Json(json!({"redirectUrl": "https://pay.example/queued"})) }),
			);
		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		format!("http://{}", addr)
	}
}
