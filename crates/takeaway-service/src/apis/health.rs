//! Liveness endpoint.

use crate::server::AppState;
use axum::{extract::State, Json};
use takeaway_types::{APIError, HealthResponse};

/// Handles GET /api/health.
///
/// Healthy when the storage backend answers.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, APIError> {
	state.shop.health().await.map_err(|e| {
		tracing::warn!(error = %e, "Health check failed");
		APIError::internal(e.to_string())
	})?;
	Ok(Json(HealthResponse {
		ok: true,
		time: chrono::Utc::now(),
	}))
}
