//! Realtime wire protocol: text JSON envelopes `{id?, type, payload}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use pathdb_types::document::FlatDocument;
use pathdb_types::filter::Query;
use pathdb_types::store_adapter::EventKind;

use crate::prelude::*;

pub const TYPE_AUTH: &str = "auth";
pub const TYPE_AUTH_ACK: &str = "auth_ack";
pub const TYPE_SUBSCRIBE: &str = "subscribe";
pub const TYPE_UNSUBSCRIBE: &str = "unsubscribe";
pub const TYPE_UNSUBSCRIBE_ACK: &str = "unsubscribe_ack";
pub const TYPE_STREAM: &str = "stream";
pub const TYPE_EVENT: &str = "event";
pub const TYPE_STREAM_EVENT: &str = "stream-event";
pub const TYPE_SNAPSHOT: &str = "snapshot";
pub const TYPE_ERROR: &str = "error";

/// Envelope for every message in both directions.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Envelope {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,

	#[serde(rename = "type")]
	pub msg_type: String,

	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub payload: Value,
}

impl Envelope {
	pub fn new(msg_type: impl Into<String>, payload: Value) -> Self {
		Self { id: None, msg_type: msg_type.into(), payload }
	}

	pub fn reply(id: Option<String>, msg_type: impl Into<String>, payload: Value) -> Self {
		Self { id, msg_type: msg_type.into(), payload }
	}

	pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
		Self {
			id,
			msg_type: TYPE_ERROR.into(),
			payload: json!({ "code": code, "message": message.into() }),
		}
	}

	pub fn from_error(id: Option<String>, err: &Error) -> Self {
		Self::error(id, err.code(), err.to_string())
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuthPayload {
	pub token: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SubscribePayload {
	pub query: Query,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct UnsubscribePayload {
	pub id: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StreamPayload {
	pub collection: String,

	#[serde(default)]
	pub checkpoint: i64,
}

/// A change surfaced to a subscriber.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PublicEvent {
	#[serde(rename = "type")]
	pub kind: EventKind,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub document: Option<FlatDocument>,

	pub path: String,

	pub timestamp: Timestamp,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
	pub sub_id: String,
	pub delta: PublicEvent,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
	pub sub_id: String,
	pub documents: Vec<FlatDocument>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEventPayload {
	pub stream_id: String,
	pub documents: Vec<FlatDocument>,
	pub checkpoint: i64,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorPayload {
	pub code: String,
	pub message: String,
}

// vim: ts=4
