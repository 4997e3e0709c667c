//! Trigger rule configuration and delivery task payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use pathdb_types::document::FlatDocument;
use pathdb_types::filter::Filters;

/// Queue subject for a delivery task. The subject encodes the partitioning
/// so a consumer group preserves per-document order.
pub fn task_subject(tenant: &str, collection: &str, doc_key: &str) -> String {
	format!("triggers.{}.{}.{}", tenant, collection, doc_key)
}

/// Dead-letter subject per trigger.
pub fn dlq_subject(trigger_id: &str) -> String {
	format!("triggers.dlq.{}", trigger_id)
}

/// Prefix every delivery task subject lives under.
pub const SUBJECT_PREFIX: &str = "triggers.";

/// Prefix of the dead-letter subjects, excluded from worker consumption.
pub const DLQ_PREFIX: &str = "triggers.dlq.";

/// How to handle delivery failures.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
	pub max_attempts: u32,

	/// Backoff before the second delivery, in milliseconds
	pub initial_backoff_ms: u64,

	pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: 5, initial_backoff_ms: 1000, max_backoff_ms: 60_000 }
	}
}

impl RetryPolicy {
	/// Exponential backoff before delivery `attempt + 1`:
	/// `initial * 2^(attempt - 1)`, capped at the maximum.
	pub fn backoff(&self, attempt: u32) -> Duration {
		let shift = attempt.saturating_sub(1).min(32);
		let ms = self.initial_backoff_ms.saturating_mul(1u64 << shift);
		Duration::from_millis(ms.min(self.max_backoff_ms))
	}
}

/// Immutable configuration for one server-side trigger.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRule {
	#[serde(rename = "triggerId")]
	pub id: String,

	#[serde(default)]
	pub version: String,

	#[serde(default)]
	pub tenant: String,

	/// Collection glob: exact name or a trailing-`*` prefix
	pub collection: String,

	/// Subset of {create, update, delete}
	pub events: Vec<String>,

	/// Optional condition over the event scope (`doc.*`, `before.*`,
	/// `event`), same expression language as queries
	#[serde(default)]
	pub condition: Filters,

	pub url: String,

	#[serde(default)]
	pub headers: HashMap<String, String>,

	#[serde(default)]
	pub secrets_ref: String,

	#[serde(default)]
	pub concurrency: u32,

	#[serde(default)]
	pub rate_limit: u32,

	#[serde(default)]
	pub include_before: bool,

	#[serde(default)]
	pub retry_policy: RetryPolicy,

	/// Per-delivery HTTP timeout, in milliseconds (0 = worker default)
	#[serde(default)]
	pub timeout_ms: u64,
}

/// The payload published per (event, matching rule) and delivered to the
/// destination webhook.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryTask {
	pub trigger_id: String,
	pub tenant: String,
	pub event: String,
	pub collection: String,

	/// Full document path
	pub doc_key: String,

	/// Opaque log position, monotonic per collection
	pub lsn: String,

	pub seq: i64,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub before: Option<FlatDocument>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub after: Option<FlatDocument>,

	#[serde(rename = "ts")]
	pub timestamp: i64,

	pub url: String,

	#[serde(default)]
	pub headers: HashMap<String, String>,

	#[serde(default)]
	pub secrets_ref: String,

	#[serde(default)]
	pub retry_policy: RetryPolicy,

	#[serde(default)]
	pub timeout_ms: u64,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pre_issued_token: Option<String>,
}

impl DeliveryTask {
	pub fn subject(&self) -> String {
		task_subject(&self.tenant, &self.collection, &self.doc_key)
	}

	pub fn to_bytes(&self) -> Vec<u8> {
		serde_json::to_vec(self).unwrap_or_else(|err| {
			tracing::error!("delivery task serialization failed: {}", err);
			b"{}".to_vec()
		})
	}
}

/// Scope object a trigger condition is evaluated against.
pub fn condition_scope(
	doc: Option<FlatDocument>,
	before: Option<FlatDocument>,
	event: &str,
) -> Value {
	let mut scope = serde_json::Map::new();
	scope.insert("doc".into(), doc.map(Value::Object).unwrap_or(Value::Null));
	scope.insert("before".into(), before.map(Value::Object).unwrap_or(Value::Null));
	scope.insert("event".into(), Value::String(event.to_string()));
	Value::Object(scope)
}

// vim: ts=4
