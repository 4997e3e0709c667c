//! Route tables for the API and realtime listeners.

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::app::App;
use crate::handlers;

async fn health() -> (StatusCode, &'static str) {
	(StatusCode::OK, "OK")
}

fn cors_layer() -> CorsLayer {
	CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
}

/// The `/v1` API surface. Static routes win over the document wildcard.
pub fn api_router(app: App) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/query", post(handlers::query::execute_query))
		.route("/v1/replication/pull", get(handlers::replication::pull))
		.route("/v1/replication/push", post(handlers::replication::push))
		.route("/v1/trigger/get", post(handlers::trigger_api::trigger_get))
		.route("/v1/trigger/write", post(handlers::trigger_api::trigger_write))
		.route("/v1/trigger/query", post(handlers::trigger_api::trigger_query))
		.route("/v1/admin/users", get(handlers::admin::list_users))
		.route("/v1/admin/triggers", post(handlers::admin::push_rules))
		.route(
			"/v1/{*path}",
			get(handlers::document::get_document)
				.post(handlers::document::create_document)
				.put(handlers::document::replace_document)
				.patch(handlers::document::patch_document)
				.delete(handlers::document::delete_document),
		)
		.layer(middleware::from_fn_with_state(app.clone(), handlers::optional_auth))
		.layer(cors_layer())
		.with_state(app)
}

/// The realtime listener: WebSocket/SSE sessions only.
pub fn realtime_router(app: App) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/realtime", get(handlers::realtime::realtime))
		.layer(cors_layer())
		.with_state(app)
}

// vim: ts=4
