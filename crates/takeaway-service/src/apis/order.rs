//! Order endpoints.
//!
//! Customers create orders and poll them by id; the kitchen lists the active
//! and archived views and changes statuses with the shared PIN.

use super::{json_rejection, kitchen_access, require_kitchen, store_error};
use crate::server::AppState;
use axum::{
	extract::{rejection::JsonRejection, Path, Query, State},
	http::{HeaderMap, StatusCode},
	Json,
};
use takeaway_core::OrderView;
use takeaway_types::{
	truncate_id, APIError, CreateOrderRequest, CreateOrderResponse, ListOrdersQuery, OrderResponse,
	UpdateStatusRequest,
};

/// Handles POST /api/orders.
pub async fn create_order(
	State(state): State<AppState>,
	body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), APIError> {
	let Json(request) = body.map_err(json_rejection)?;
	let order = state.shop.create_order(request).await.map_err(store_error)?;
	Ok((
		StatusCode::CREATED,
		Json(CreateOrderResponse {
			id: order.id,
			status: order.status,
		}),
	))
}

/// Handles GET /api/orders.
///
/// With a valid PIN the kitchen views apply; without one only the plain
/// newest-first list is available.
pub async fn list_orders(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderResponse>>, APIError> {
	let kitchen = kitchen_access(&headers, &state.shop.config().kitchen.pin)?;
	let view = match (kitchen, query.wants_archive()) {
		(true, true) => OrderView::Archive,
		(true, false) => OrderView::Active,
		(false, true) => {
			return Err(APIError::Forbidden {
				message: "Kitchen PIN required for the archive".to_string(),
			})
		},
		(false, false) => OrderView::All,
	};

	let orders = state
		.shop
		.list_orders(view, chrono::Utc::now(), query.effective_limit())
		.await
		.map_err(store_error)?;
	Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// Handles GET /api/orders/{id}.
pub async fn get_order(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<OrderResponse>, APIError> {
	let order = state.shop.get_order(&id).await.map_err(store_error)?;
	Ok(Json(order.into()))
}

/// Handles PATCH /api/orders/{id}.
///
/// Responds with the order as stored after the ready side effect ran.
pub async fn update_order_status(
	State(state): State<AppState>,
	headers: HeaderMap,
	Path(id): Path<String>,
	body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, APIError> {
	require_kitchen(&headers, &state.shop.config().kitchen.pin)?;
	let Json(request) = body.map_err(|rejection| {
		tracing::debug!(order_id = %truncate_id(&id), error = %rejection, "Unreadable status update");
		APIError::bad_request("INVALID_STATUS", "Invalid status")
	})?;

	let order = state
		.shop
		.set_status(&id, &request.status)
		.await
		.map_err(store_error)?;
	Ok(Json(order.into()))
}
