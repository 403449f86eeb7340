//! HTTP server for the takeaway API.
//!
//! All routes live under `/api`. Every response carries
//! `Cache-Control: no-store` because order status is polled.

use crate::apis;
use axum::{
	extract::DefaultBodyLimit,
	http::{header, HeaderName, HeaderValue, Method},
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use std::time::Duration;
use takeaway_config::{ApiConfig, CorsConfig};
use takeaway_core::ShopEngine;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::{AllowOrigin, CorsLayer},
	set_header::SetResponseHeaderLayer,
	timeout::TimeoutLayer,
	trace::TraceLayer,
};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// The shop engine handling every request.
	pub shop: Arc<ShopEngine>,
}

fn cors_layer(cors: Option<&CorsConfig>) -> CorsLayer {
	let Some(cors) = cors else {
		return CorsLayer::permissive();
	};

	let origin = if cors.allowed_origins.iter().any(|o| o == "*") {
		AllowOrigin::any()
	} else {
		AllowOrigin::list(
			cors.allowed_origins
				.iter()
				.filter_map(|o| HeaderValue::from_str(o).ok()),
		)
	};
	let mut methods: Vec<Method> = cors
		.allowed_methods
		.iter()
		.filter_map(|m| m.parse().ok())
		.collect();
	if methods.is_empty() {
		methods = vec![Method::GET, Method::POST, Method::PATCH, Method::OPTIONS];
	}
	let mut headers: Vec<HeaderName> = cors
		.allowed_headers
		.iter()
		.filter_map(|h| h.parse().ok())
		.collect();
	if headers.is_empty() {
		headers = vec![
			header::CONTENT_TYPE,
			HeaderName::from_static(apis::KITCHEN_PIN_HEADER),
		];
	}

	CorsLayer::new()
		.allow_origin(origin)
		.allow_methods(methods)
		.allow_headers(headers)
}

/// Builds the application router.
pub fn router(shop: Arc<ShopEngine>, api_config: &ApiConfig) -> Router {
	let state = AppState { shop };

	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/health", get(apis::health::health))
				.route(
					"/orders",
					post(apis::order::create_order).get(apis::order::list_orders),
				)
				.route(
					"/orders/{id}",
					get(apis::order::get_order).patch(apis::order::update_order_status),
				)
				.route("/payments/start", post(apis::payment::start_payment))
				.route("/payments/webhook", post(apis::payment::payment_webhook)),
		)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(SetResponseHeaderLayer::overriding(
					header::CACHE_CONTROL,
					HeaderValue::from_static("no-store"),
				))
				.layer(cors_layer(api_config.cors.as_ref()))
				.layer(TimeoutLayer::new(Duration::from_secs(api_config.timeout_seconds)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state)
}

/// Starts the HTTP server and runs it until ctrl-c.
pub async fn start_server(
	api_config: ApiConfig,
	shop: Arc<ShopEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(shop, &api_config);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Takeaway API server starting on {}", bind_address);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await?;

	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "Failed to listen for shutdown signal");
		std::future::pending::<()>().await;
	}
	tracing::info!("Shutdown signal received");
}
