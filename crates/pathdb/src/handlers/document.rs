//! Document CRUD endpoints on `/v1/{path...}`.
//!
//! The HTTP method decides the path shape: GET/PUT/PATCH/DELETE address a
//! document (even segment count), POST addresses a collection and creates a
//! document in it.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use pathdb_types::document::FlatDocument;
use pathdb_types::filter::Filters;

use super::tenant;
use crate::app::App;
use crate::prelude::*;

/// Body of PUT and PATCH: the document plus an optional CAS predicate.
#[derive(Debug, Deserialize)]
pub struct UpdateDocumentRequest {
	pub doc: FlatDocument,

	#[serde(default)]
	pub if_match: Option<Filters>,
}

pub async fn get_document(
	State(app): State<App>,
	Path(path): Path<String>,
	headers: HeaderMap,
) -> DbResult<Json<FlatDocument>> {
	let doc = app.engine.get_document(&tenant(&headers), &path).await?;
	Ok(Json(doc))
}

pub async fn create_document(
	State(app): State<App>,
	Path(collection): Path<String>,
	headers: HeaderMap,
	Json(body): Json<FlatDocument>,
) -> DbResult<(StatusCode, Json<FlatDocument>)> {
	let doc = app.engine.create_document(&tenant(&headers), &collection, body).await?;
	Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn replace_document(
	State(app): State<App>,
	Path(path): Path<String>,
	headers: HeaderMap,
	Json(body): Json<UpdateDocumentRequest>,
) -> DbResult<Json<FlatDocument>> {
	let pred = body.if_match.unwrap_or_default();
	let doc = app.engine.replace_document(&tenant(&headers), &path, body.doc, &pred).await?;
	Ok(Json(doc))
}

pub async fn patch_document(
	State(app): State<App>,
	Path(path): Path<String>,
	headers: HeaderMap,
	Json(body): Json<UpdateDocumentRequest>,
) -> DbResult<Json<FlatDocument>> {
	let pred = body.if_match.unwrap_or_default();
	let doc = app.engine.patch_document(&tenant(&headers), &path, body.doc, &pred).await?;
	Ok(Json(doc))
}

pub async fn delete_document(
	State(app): State<App>,
	Path(path): Path<String>,
	headers: HeaderMap,
) -> DbResult<StatusCode> {
	app.engine.delete_document(&tenant(&headers), &path, &Filters::new()).await?;
	Ok(StatusCode::NO_CONTENT)
}

// vim: ts=4
