//! HTTP handlers and shared request helpers.

pub mod admin;
pub mod document;
pub mod query;
pub mod realtime;
pub mod replication;
pub mod trigger_api;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use pathdb_types::auth_adapter::Claims;

use crate::app::App;
use crate::prelude::*;

/// Tenant selector header; absent or empty means the default tenant.
pub const TENANT_HEADER: &str = "x-tenant";

pub fn tenant(headers: &HeaderMap) -> String {
	headers
		.get(TENANT_HEADER)
		.and_then(|value| value.to_str().ok())
		.unwrap_or_default()
		.to_string()
}

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
	headers
		.get(axum::http::header::AUTHORIZATION)
		.and_then(|value| value.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "))
		.map(str::to_string)
}

/// Claims of the request's bearer token, when one was presented and valid.
#[derive(Clone, Debug, Default)]
pub struct MaybeClaims(pub Option<Claims>);

/// Middleware: verify the bearer token when present and stash the claims.
/// Endpoints decide themselves whether authentication is required.
pub async fn optional_auth(State(app): State<App>, mut req: Request, next: Next) -> Response {
	let claims = match bearer_token(req.headers()) {
		Some(token) => match app.auth.verify_token(&token).await {
			Ok(claims) => Some(claims),
			Err(err) => {
				debug!("bearer token rejected: {}", err);
				None
			}
		},
		None => None,
	};
	req.extensions_mut().insert(MaybeClaims(claims));
	next.run(req).await
}

/// Admin routes require a verified token carrying the `admin` role; any
/// other request gets 403, token or not.
pub fn require_admin(claims: &MaybeClaims) -> DbResult<()> {
	match &claims.0 {
		Some(claims) if claims.has_role("admin") => Ok(()),
		_ => Err(Error::PermissionDenied),
	}
}

// vim: ts=4
