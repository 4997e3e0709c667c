//! Document model and hierarchical path handling.
//!
//! Paths are slash-separated sequences of non-empty segments drawn from
//! `[A-Za-z0-9_.-]`. A collection path has an odd number of segments, a
//! document path an even number; the last segment of a document path is the
//! document id and the prefix is its parent collection.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::prelude::*;

/// Reserved wire keys, stripped from incoming bodies before storage.
pub const KEY_VERSION: &str = "_version";
pub const KEY_UPDATED_AT: &str = "_updated_at";
pub const KEY_CREATED_AT: &str = "_created_at";
pub const KEY_ID: &str = "id";
pub const KEY_DELETED: &str = "deleted";

/// User-facing flattened document: user data merged at top level plus the
/// system fields (`id`, `_version`, `_updated_at`, `_created_at`, `deleted`).
pub type FlatDocument = Map<String, Value>;

/// A stored document record.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
	/// Backend primary key: hex-encoded 128-bit blake3 hash of `fullpath`,
	/// so paths of arbitrary length remain indexable.
	pub id: Box<str>,

	/// Full pathname of the document (primary natural key)
	pub fullpath: Box<str>,

	/// Parent collection (derived from `fullpath`)
	pub collection: Box<str>,

	/// Parent of the collection (derived from `fullpath`)
	pub parent: Box<str>,

	/// Actual document content
	pub data: Map<String, Value>,

	/// Optimistic concurrency control version, starts at 1
	pub version: i64,

	/// Creation timestamp (Unix milliseconds)
	pub created_at: Timestamp,

	/// Last update timestamp (Unix milliseconds)
	pub updated_at: Timestamp,

	/// Soft-delete tombstone flag
	#[serde(default)]
	pub deleted: bool,
}

impl StoredDocument {
	/// Create a new record with initialized metadata (version 1, now).
	pub fn new(fullpath: &str, data: Map<String, Value>) -> DbResult<Self> {
		let (collection, _) = split_document_path(fullpath)?;
		let now = Timestamp::now();
		Ok(Self {
			id: calculate_id(fullpath).into(),
			fullpath: fullpath.into(),
			collection: collection.into(),
			parent: parent_of(collection).into(),
			data,
			version: 1,
			created_at: now,
			updated_at: now,
			deleted: false,
		})
	}

	/// Document id: the last segment of `fullpath`.
	pub fn doc_id(&self) -> &str {
		self.fullpath.rsplit('/').next().unwrap_or(&self.fullpath)
	}

	/// Flatten into the wire shape: user data at top level plus `id`,
	/// `_version`, `_updated_at`, `_created_at` and `deleted` for tombstones.
	pub fn flatten(&self) -> FlatDocument {
		let mut out = self.data.clone();
		out.insert(KEY_ID.into(), Value::String(self.doc_id().to_string()));
		out.insert(KEY_VERSION.into(), Value::Number(self.version.into()));
		out.insert(KEY_UPDATED_AT.into(), Value::Number(self.updated_at.0.into()));
		out.insert(KEY_CREATED_AT.into(), Value::Number(self.created_at.0.into()));
		if self.deleted {
			out.insert(KEY_DELETED.into(), Value::Bool(true));
		}
		out
	}

	/// View used to evaluate filters and CAS predicates: the flattened wire
	/// shape plus bare aliases (`version`, `updatedAt`, `createdAt`) so both
	/// spellings select the same field.
	pub fn filter_view(&self) -> Value {
		let mut view = self.flatten();
		view.insert("version".into(), Value::Number(self.version.into()));
		view.insert("updatedAt".into(), Value::Number(self.updated_at.0.into()));
		view.insert("createdAt".into(), Value::Number(self.created_at.0.into()));
		Value::Object(view)
	}
}

/// Calculate the document id: hex of the 128-bit truncated blake3 of fullpath.
pub fn calculate_id(fullpath: &str) -> String {
	let hash = blake3::hash(fullpath.as_bytes());
	hash.to_hex()[..32].to_string()
}

fn valid_segment(segment: &str) -> bool {
	!segment.is_empty()
		&& segment.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Validate path shape: non-empty segments of `[A-Za-z0-9_.-]`, no leading or
/// trailing slash.
pub fn validate_path(path: &str) -> DbResult<()> {
	if path.is_empty() {
		return Err(Error::InvalidArgument("empty path".into()));
	}
	for segment in path.split('/') {
		if !valid_segment(segment) {
			return Err(Error::InvalidArgument(format!("invalid path segment in {:?}", path)));
		}
	}
	Ok(())
}

pub fn segment_count(path: &str) -> usize {
	if path.is_empty() {
		0
	} else {
		path.split('/').count()
	}
}

/// A document path has an even number of segments.
pub fn is_document_path(path: &str) -> bool {
	segment_count(path) % 2 == 0 && segment_count(path) > 0
}

/// A collection path has an odd number of segments.
pub fn is_collection_path(path: &str) -> bool {
	segment_count(path) % 2 == 1
}

pub fn validate_document_path(path: &str) -> DbResult<()> {
	validate_path(path)?;
	if !is_document_path(path) {
		return Err(Error::InvalidArgument(format!("not a document path: {:?}", path)));
	}
	Ok(())
}

pub fn validate_collection_path(path: &str) -> DbResult<()> {
	validate_path(path)?;
	if !is_collection_path(path) {
		return Err(Error::InvalidArgument(format!("not a collection path: {:?}", path)));
	}
	Ok(())
}

/// Split a document path into (parent collection, document id).
pub fn split_document_path(path: &str) -> DbResult<(&str, &str)> {
	validate_document_path(path)?;
	match path.rsplit_once('/') {
		Some((collection, doc_id)) => Ok((collection, doc_id)),
		None => Err(Error::InvalidArgument(format!("invalid document path: {:?}", path))),
	}
}

/// Parent of a collection path (empty for a top-level collection).
pub fn parent_of(collection: &str) -> &str {
	collection.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// Strip the reserved system keys from an incoming body.
pub fn strip_reserved(mut data: Map<String, Value>) -> Map<String, Value> {
	data.remove(KEY_VERSION);
	data.remove(KEY_UPDATED_AT);
	data.remove(KEY_CREATED_AT);
	data
}

/// Coerce a user-provided `id` value to a string; numbers are stringified,
/// anything else is rejected.
pub fn coerce_id(value: &Value) -> DbResult<String> {
	match value {
		Value::String(s) => Ok(s.clone()),
		Value::Number(n) => Ok(n.to_string()),
		other => Err(Error::InvalidArgument(format!("id must be a string, got {}", other))),
	}
}

/// Check if an event path belongs to a collection subtree (boundary-aware
/// prefix match). An empty filter matches everything.
pub fn collection_matches(event_collection: &str, filter: &str) -> bool {
	if filter.is_empty() || event_collection == filter {
		return true;
	}
	event_collection.starts_with(filter)
		&& event_collection.as_bytes().get(filter.len()) == Some(&b'/')
}

// vim: ts=4
