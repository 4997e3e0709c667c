//! Document Store Adapter
//!
//! Trait and types for pluggable document store backends that keep JSON
//! documents under hierarchical paths (e.g. `users/alice/posts/42`).
//!
//! Read operations (get, query, watch) work directly on the adapter. Write
//! operations support CAS predicates; multi-operation writes go through a
//! transaction for atomicity.
//!
//! Each adapter implementation provides its own constructor handling
//! backend-specific initialization (storage path, retention settings, etc.).

use async_trait::async_trait;
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::pin::Pin;

use crate::document::{FlatDocument, StoredDocument};
use crate::filter::{Filters, Query};
use crate::prelude::*;

/// Opaque token for resuming a watch stream, monotonic per backend.
pub type ResumeToken = u64;

/// The type of a change.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
	Create,
	Update,
	Delete,
}

impl EventKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			EventKind::Create => "create",
			EventKind::Update => "update",
			EventKind::Delete => "delete",
		}
	}
}

/// A database change event.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
	pub tenant: Box<str>,

	#[serde(rename = "type")]
	pub kind: EventKind,

	/// Full path of the affected document
	pub path: Box<str>,

	/// Parent collection of the affected document
	pub collection: Box<str>,

	/// The document after the change; absent for delete
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub document: Option<StoredDocument>,

	/// Previous state, populated only when the watch was opened with
	/// `include_before`
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub before: Option<StoredDocument>,

	pub timestamp: Timestamp,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub resume_token: Option<ResumeToken>,
}

/// Options for watching changes.
#[derive(Clone, Copy, Debug, Default)]
pub struct WatchOptions {
	pub include_before: bool,
}

pub type EventStream = Pin<Box<dyn Stream<Item = ChangeEvent> + Send>>;

/// Operation kind used by the storage router to pick a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
	Read,
	Write,
	Migrate,
}

/// Document store backend contract.
#[async_trait]
pub trait StoreAdapter: Debug + Send + Sync {
	/// Get the latest non-purged record at a path, tombstones included.
	async fn get(&self, tenant: &str, path: &str) -> DbResult<StoredDocument>;

	/// Insert a new document with `version = 1`. Fails with `Exists` if a
	/// live document occupies the path; a tombstone is resurrected and the
	/// new record carries `version = tombstone.version + 1`.
	async fn create(&self, tenant: &str, fullpath: &str, data: Map<String, Value>)
		-> DbResult<StoredDocument>;

	/// Replace `data` wholesale. A non-empty `pred` is applied as a CAS
	/// condition and fails with `PreconditionFailed` on mismatch.
	async fn update(
		&self,
		tenant: &str,
		path: &str,
		data: Map<String, Value>,
		pred: &Filters,
	) -> DbResult<StoredDocument>;

	/// Shallow merge: top-level keys present in `data` replace their stored
	/// values, absent keys are preserved. Same CAS semantics as `update`.
	async fn patch(
		&self,
		tenant: &str,
		path: &str,
		data: Map<String, Value>,
		pred: &Filters,
	) -> DbResult<StoredDocument>;

	/// Soft-delete: set the tombstone flag and bump the version. Returns
	/// `NotFound` if no live document exists.
	async fn delete(&self, tenant: &str, path: &str, pred: &Filters) -> DbResult<()>;

	/// Execute a query.
	async fn query(&self, tenant: &str, q: &Query) -> DbResult<Vec<StoredDocument>>;

	/// Watch changes in a collection subtree (all collections if empty; all
	/// tenants if `tenant` is empty). The stream is ordered per `fullpath`
	/// and starts strictly after `resume` (None = now).
	async fn watch(
		&self,
		tenant: &str,
		collection: &str,
		resume: Option<ResumeToken>,
		opts: WatchOptions,
	) -> DbResult<EventStream>;

	/// Begin a transaction for multi-operation writes.
	async fn transaction(&self, tenant: &str) -> DbResult<Box<dyn StoreTransaction>>;

	/// Close the backend, stopping background tasks.
	async fn close(&self) -> DbResult<()>;
}

/// Transaction for atomic multi-document writes.
///
/// Reads observe the transaction's own staged writes. Nothing is visible to
/// other readers until `commit`.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
	/// Read a document from the transaction's view (staged writes included).
	async fn get(&self, path: &str) -> DbResult<Option<StoredDocument>>;

	async fn create(&mut self, fullpath: &str, data: Map<String, Value>) -> DbResult<()>;

	async fn update(&mut self, path: &str, data: Map<String, Value>) -> DbResult<()>;

	/// Shallow merge against the transaction's view of the document.
	async fn patch(&mut self, path: &str, data: Map<String, Value>) -> DbResult<()>;

	async fn delete(&mut self, path: &str) -> DbResult<()>;

	/// Apply all staged changes atomically.
	async fn commit(&mut self) -> DbResult<()>;

	/// Discard all staged changes.
	async fn rollback(&mut self) -> DbResult<()>;
}

/// Router choosing a backend per operation. The assignment is immutable
/// after construction, so selection needs no locking.
pub trait DocumentRouter: Debug + Send + Sync {
	fn select(&self, op: OpKind) -> &std::sync::Arc<dyn StoreAdapter>;
}

// Replication types //
//*******************//

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PullRequest {
	pub collection: String,

	/// Monotonic scalar: the `updated_at` high-water mark
	#[serde(default)]
	pub checkpoint: i64,

	#[serde(default)]
	pub limit: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PullResponse {
	pub documents: Vec<FlatDocument>,
	pub checkpoint: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PushChange {
	pub doc: FlatDocument,

	/// Version known to the client; None means "create or overwrite blindly"
	#[serde(default, rename = "base_version", skip_serializing_if = "Option::is_none")]
	pub base_version: Option<i64>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PushRequest {
	pub collection: String,
	pub changes: Vec<PushChange>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PushResponse {
	pub conflicts: Vec<FlatDocument>,
}

// vim: ts=4
