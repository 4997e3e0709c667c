//! WebSocket session endpoint.
//!
//! Text JSON envelopes per `protocol`. The handshake is auth-first: until
//! `auth_ack` every other message is rejected with `UNAUTHENTICATED`. After
//! that the session accepts `subscribe`, `unsubscribe` and `stream`
//! commands. The server pings on the heartbeat interval and closes idle
//! sessions missing a pong within twice the interval.

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures::sink::SinkExt;
use futures::stream::{SplitSink, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

use pathdb_types::filter::CompiledFilter;
use pathdb_types::store_adapter::{EventKind, PullRequest};
use pathdb_types::utils::random_id;

use crate::fanout::SubEvent;
use crate::hub::{Hub, Session};
use crate::prelude::*;
use crate::protocol::{
	AuthPayload, Envelope, SnapshotPayload, StreamEventPayload, StreamPayload, SubscribePayload,
	UnsubscribePayload, TYPE_AUTH, TYPE_AUTH_ACK, TYPE_SNAPSHOT, TYPE_STREAM, TYPE_STREAM_EVENT,
	TYPE_SUBSCRIBE, TYPE_UNSUBSCRIBE, TYPE_UNSUBSCRIBE_ACK,
};

type WsSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

async fn send_direct(sink: &WsSink, envelope: &Envelope) -> bool {
	match serde_json::to_string(envelope) {
		Ok(text) => {
			let mut tx = sink.lock().await;
			tx.send(Message::Text(text.into())).await.is_ok()
		}
		Err(err) => {
			warn!("envelope serialization failed: {}", err);
			true
		}
	}
}

/// Handle one WebSocket connection for its whole lifetime.
pub async fn handle_connection(ws: WebSocket, hub: Arc<Hub>) {
	let (ws_tx, mut ws_rx) = ws.split();
	let ws_tx: WsSink = Arc::new(Mutex::new(ws_tx));

	// Auth phase: nothing but `auth` is accepted, and the client gets twice
	// the heartbeat interval to complete it.
	let auth_deadline = 2 * hub.config.heartbeat;
	let tenant = loop {
		let msg = match tokio::time::timeout(auth_deadline, ws_rx.next()).await {
			Ok(Some(Ok(msg))) => msg,
			Ok(Some(Err(err))) => {
				debug!("websocket error before auth: {}", err);
				return;
			}
			Ok(None) => return,
			Err(_) => {
				let mut tx = ws_tx.lock().await;
				let _ = tx
					.send(Message::Close(Some(CloseFrame {
						code: close_code::POLICY,
						reason: "IDLE".into(),
					})))
					.await;
				return;
			}
		};
		let text = match msg {
			Message::Text(text) => text,
			Message::Close(_) => return,
			_ => continue,
		};
		let envelope: Envelope = match serde_json::from_str(&text) {
			Ok(envelope) => envelope,
			Err(err) => {
				send_direct(&ws_tx, &Envelope::error(None, "INVALID_ARGUMENT", err.to_string()))
					.await;
				continue;
			}
		};
		if envelope.msg_type != TYPE_AUTH {
			send_direct(
				&ws_tx,
				&Envelope::error(envelope.id, "UNAUTHENTICATED", "authenticate first"),
			)
			.await;
			continue;
		}
		let payload: AuthPayload = match serde_json::from_value(envelope.payload) {
			Ok(payload) => payload,
			Err(err) => {
				send_direct(
					&ws_tx,
					&Envelope::error(envelope.id, "INVALID_ARGUMENT", err.to_string()),
				)
				.await;
				continue;
			}
		};
		match hub.authenticate(&payload.token).await {
			Ok(tenant) => {
				send_direct(
					&ws_tx,
					&Envelope::reply(envelope.id, TYPE_AUTH_ACK, json!({})),
				)
				.await;
				break tenant;
			}
			Err(err) => {
				send_direct(&ws_tx, &Envelope::from_error(envelope.id, &err)).await;
			}
		}
	};

	let (session, mut out_rx) = hub.open_session(&tenant);
	let last_activity = Arc::new(std::sync::Mutex::new(Instant::now()));

	// Outbound task: drains the session queue onto the socket
	let out_sink = ws_tx.clone();
	let out_session = session.clone();
	let outbound_task = tokio::spawn(async move {
		while let Some(envelope) = out_rx.recv().await {
			if !send_direct(&out_sink, &envelope).await {
				out_session.close("");
				return;
			}
		}
	});

	// Heartbeat task: ping on the interval, close on missing pong
	let heartbeat = hub.config.heartbeat;
	let hb_sink = ws_tx.clone();
	let hb_session = session.clone();
	let hb_activity = last_activity.clone();
	let heartbeat_task = tokio::spawn(async move {
		let mut interval = tokio::time::interval(heartbeat);
		interval.tick().await;
		loop {
			interval.tick().await;
			let idle = hb_activity
				.lock()
				.unwrap_or_else(|poisoned| poisoned.into_inner())
				.elapsed();
			if idle > 2 * heartbeat {
				debug!("session {} idle for {:?}, closing", hb_session.id, idle);
				hb_session.close("IDLE");
				return;
			}
			let mut tx = hb_sink.lock().await;
			if tx.send(Message::Ping(vec![].into())).await.is_err() {
				hb_session.close("");
				return;
			}
		}
	});

	// Main receive loop
	loop {
		tokio::select! {
			() = session.cancel_token().cancelled() => break,
			msg = ws_rx.next() => {
				let msg = match msg {
					Some(Ok(msg)) => msg,
					Some(Err(err)) => {
						debug!("websocket error: {}", err);
						break;
					}
					None => break,
				};
				*last_activity.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
					Instant::now();
				match msg {
					Message::Text(text) => {
						handle_message(&hub, &session, &text).await;
					}
					Message::Close(_) => break,
					Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
				}
			}
		}
	}

	// Surface the close code (BACKPRESSURE, IDLE) before tearing down
	if let Some(reason) = session.close_reason() {
		if !reason.is_empty() {
			let mut tx = ws_tx.lock().await;
			let _ = tx
				.send(Message::Close(Some(CloseFrame {
					code: close_code::POLICY,
					reason: reason.to_string().into(),
				})))
				.await;
		}
	}

	heartbeat_task.abort();
	outbound_task.abort();
	hub.close_session(&session);
}

async fn handle_message(hub: &Arc<Hub>, session: &Arc<Session>, text: &str) {
	let envelope: Envelope = match serde_json::from_str(text) {
		Ok(envelope) => envelope,
		Err(err) => {
			session.send(Envelope::error(None, "INVALID_ARGUMENT", err.to_string()));
			return;
		}
	};
	let id = envelope.id.clone();

	match envelope.msg_type.as_str() {
		TYPE_SUBSCRIBE => {
			let payload: SubscribePayload = match serde_json::from_value(envelope.payload) {
				Ok(payload) => payload,
				Err(err) => {
					session.send(Envelope::error(id, "INVALID_ARGUMENT", err.to_string()));
					return;
				}
			};
			match hub.subscribe(session, &payload.query).await {
				Ok((sub_id, documents)) => {
					let snapshot = SnapshotPayload { sub_id, documents };
					match serde_json::to_value(&snapshot) {
						Ok(payload) => session.send(Envelope::reply(id, TYPE_SNAPSHOT, payload)),
						Err(err) => warn!("snapshot serialization failed: {}", err),
					}
				}
				Err(err) => session.send(Envelope::from_error(id, &err)),
			}
		}

		TYPE_UNSUBSCRIBE => {
			let payload: UnsubscribePayload = match serde_json::from_value(envelope.payload) {
				Ok(payload) => payload,
				Err(err) => {
					session.send(Envelope::error(id, "INVALID_ARGUMENT", err.to_string()));
					return;
				}
			};
			if hub.unsubscribe(session, &payload.id) {
				session.send(Envelope::reply(id, TYPE_UNSUBSCRIBE_ACK, json!({ "id": payload.id })));
			} else {
				session.send(Envelope::error(id, "NOT_FOUND", "unknown subscription"));
			}
		}

		TYPE_STREAM => {
			let payload: StreamPayload = match serde_json::from_value(envelope.payload) {
				Ok(payload) => payload,
				Err(err) => {
					session.send(Envelope::error(id, "INVALID_ARGUMENT", err.to_string()));
					return;
				}
			};
			open_stream(hub, session, payload).await;
		}

		TYPE_AUTH => {
			session.send(Envelope::error(id, "INVALID_ARGUMENT", "already authenticated"));
		}

		other => {
			session.send(Envelope::error(
				id,
				"INVALID_ARGUMENT",
				format!("unknown message type: {:?}", other),
			));
		}
	}
}

/// Replication-style feed over the session: page the backlog via pull, then
/// forward live changes with advancing checkpoints.
async fn open_stream(hub: &Arc<Hub>, session: &Arc<Session>, payload: StreamPayload) {
	const PAGE: u32 = 100;

	let stream_id = format!("stream-{}", random_id());
	let (fanout_id, mut rx) = hub.fanout().subscribe(&payload.collection, CompiledFilter::default());
	let reply_collection = payload.collection.clone();

	let engine = hub.engine().clone();
	let task_session = session.clone();
	let task_stream_id = stream_id.clone();
	let task = tokio::spawn(async move {
		let mut checkpoint = payload.checkpoint;

		// Backlog
		loop {
			let req = PullRequest {
				collection: payload.collection.clone(),
				checkpoint,
				limit: PAGE,
			};
			let resp = match engine.pull(&task_session.tenant, &req).await {
				Ok(resp) => resp,
				Err(err) => {
					task_session.send(Envelope::from_error(None, &err));
					return;
				}
			};
			if resp.documents.is_empty() {
				break;
			}
			checkpoint = resp.checkpoint;
			let done = resp.documents.len() < PAGE as usize;
			send_stream_event(&task_session, &task_stream_id, resp.documents, checkpoint);
			if done {
				break;
			}
		}

		// Live tail
		while let Some(event) = rx.recv().await {
			match event {
				SubEvent::Change(change) => {
					let mut doc = match (&change.document, &change.before) {
						(Some(doc), _) => doc.flatten(),
						(None, Some(before)) => before.flatten(),
						(None, None) => Default::default(),
					};
					if change.kind == EventKind::Delete {
						doc.insert("deleted".into(), serde_json::Value::Bool(true));
					}
					let next = change
						.document
						.as_ref()
						.map(|d| d.updated_at.0)
						.unwrap_or(change.timestamp.0);
					checkpoint = checkpoint.max(next);
					send_stream_event(&task_session, &task_stream_id, vec![doc], checkpoint);
				}
				SubEvent::Reset => {
					task_session.send(Envelope::new(
						crate::protocol::TYPE_ERROR,
						json!({ "code": "STREAM_RESET", "streamId": task_stream_id }),
					));
				}
			}
		}
	});

	session.track_stream(&stream_id, fanout_id, task);
	session.send(Envelope::reply(
		None,
		TYPE_STREAM,
		json!({ "streamId": stream_id, "collection": reply_collection }),
	));
}

fn send_stream_event(
	session: &Arc<Session>,
	stream_id: &str,
	documents: Vec<pathdb_types::document::FlatDocument>,
	checkpoint: i64,
) {
	let payload = StreamEventPayload { stream_id: stream_id.to_string(), documents, checkpoint };
	match serde_json::to_value(&payload) {
		Ok(payload) => session.send(Envelope::new(TYPE_STREAM_EVENT, payload)),
		Err(err) => warn!("stream event serialization failed: {}", err),
	}
}

// vim: ts=4
