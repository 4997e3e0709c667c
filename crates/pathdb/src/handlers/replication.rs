//! Replication endpoints: checkpointed pull and conflict-reporting push.

use axum::extract::{Query as QueryString, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use pathdb_types::store_adapter::{PullRequest, PullResponse, PushRequest, PushResponse};

use super::tenant;
use crate::app::App;
use crate::prelude::*;

#[derive(Debug, Deserialize)]
pub struct PullParams {
	pub collection: String,

	#[serde(default)]
	pub checkpoint: i64,

	#[serde(default)]
	pub limit: u32,
}

pub async fn pull(
	State(app): State<App>,
	headers: HeaderMap,
	QueryString(params): QueryString<PullParams>,
) -> DbResult<Json<PullResponse>> {
	let req = PullRequest {
		collection: params.collection,
		checkpoint: params.checkpoint,
		limit: params.limit,
	};
	let resp = app.engine.pull(&tenant(&headers), &req).await?;
	Ok(Json(resp))
}

pub async fn push(
	State(app): State<App>,
	headers: HeaderMap,
	Json(req): Json<PushRequest>,
) -> DbResult<Json<PushResponse>> {
	let resp = app.engine.push(&tenant(&headers), &req).await?;
	Ok(Json(resp))
}

// vim: ts=4
