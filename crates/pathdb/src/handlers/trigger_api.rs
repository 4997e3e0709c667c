//! Endpoints for trigger workers: batched reads, transactional writes and
//! queries issued back into the database from webhook handlers.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use pathdb_engine::WriteOp;
use pathdb_types::document::FlatDocument;
use pathdb_types::filter::Query;

use super::tenant;
use crate::app::App;
use crate::prelude::*;

#[derive(Debug, Deserialize)]
pub struct TriggerGetRequest {
	pub paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TriggerGetResponse {
	pub documents: Vec<FlatDocument>,
}

/// Batched point reads. Missing paths are skipped, not errors.
pub async fn trigger_get(
	State(app): State<App>,
	headers: HeaderMap,
	Json(req): Json<TriggerGetRequest>,
) -> DbResult<Json<TriggerGetResponse>> {
	if req.paths.is_empty() {
		return Err(Error::InvalidArgument("paths cannot be empty".into()));
	}
	let tenant = tenant(&headers);
	let mut documents = Vec::with_capacity(req.paths.len());
	for path in &req.paths {
		match app.engine.get_document(&tenant, path).await {
			Ok(doc) => documents.push(doc),
			Err(Error::NotFound) => continue,
			Err(err) => return Err(err),
		}
	}
	Ok(Json(TriggerGetResponse { documents }))
}

#[derive(Debug, Deserialize)]
pub struct TriggerWriteRequest {
	pub writes: Vec<WriteOp>,
}

/// Transactional write batch: 200 on full commit, 500 on rollback.
pub async fn trigger_write(
	State(app): State<App>,
	headers: HeaderMap,
	Json(req): Json<TriggerWriteRequest>,
) -> DbResult<Json<serde_json::Value>> {
	app.engine
		.run_transaction(&tenant(&headers), &req.writes)
		.await
		.map_err(|err| Error::Internal(format!("transaction rolled back: {}", err)))?;
	Ok(Json(serde_json::json!({ "committed": req.writes.len() })))
}

pub async fn trigger_query(
	State(app): State<App>,
	headers: HeaderMap,
	Json(query): Json<Query>,
) -> DbResult<Json<Vec<FlatDocument>>> {
	let docs = app.engine.execute_query(&tenant(&headers), &query).await?;
	Ok(Json(docs))
}

// vim: ts=4
