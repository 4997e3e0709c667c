//! Admin surface: user listing and trigger rule push. Requires a bearer
//! token with the `admin` role.

use axum::extract::{Extension, Query as QueryString, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use pathdb_trigger::TriggerRule;
use pathdb_types::auth_adapter::UserInfo;

use super::{require_admin, MaybeClaims};
use crate::app::App;
use crate::prelude::*;

#[derive(Debug, Deserialize)]
pub struct PageParams {
	#[serde(default = "default_limit")]
	pub limit: usize,

	#[serde(default)]
	pub offset: usize,
}

fn default_limit() -> usize {
	100
}

pub async fn list_users(
	State(app): State<App>,
	Extension(claims): Extension<MaybeClaims>,
	QueryString(params): QueryString<PageParams>,
) -> DbResult<Json<Vec<UserInfo>>> {
	require_admin(&claims)?;
	let users = app.auth.list_users(params.limit, params.offset).await?;
	Ok(Json(users))
}

/// Swap the trigger rule snapshot atomically.
pub async fn push_rules(
	State(app): State<App>,
	Extension(claims): Extension<MaybeClaims>,
	Json(rules): Json<Vec<TriggerRule>>,
) -> DbResult<Json<serde_json::Value>> {
	require_admin(&claims)?;
	let count = app.rules.replace(rules)?;
	info!("admin pushed {} trigger rules", count);
	Ok(Json(json!({ "active": count })))
}

// vim: ts=4
