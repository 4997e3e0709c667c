//! Query endpoint.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use pathdb_types::document::FlatDocument;
use pathdb_types::filter::Query;

use super::tenant;
use crate::app::App;
use crate::prelude::*;

pub async fn execute_query(
	State(app): State<App>,
	headers: HeaderMap,
	Json(query): Json<Query>,
) -> DbResult<Json<Vec<FlatDocument>>> {
	let docs = app.engine.execute_query(&tenant(&headers), &query).await?;
	Ok(Json(docs))
}

// vim: ts=4
