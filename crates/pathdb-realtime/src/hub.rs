//! Realtime hub: session registry and subscription bookkeeping shared by
//! the WebSocket and SSE endpoints.
//!
//! Each client connection opens one session with a bounded outbound queue.
//! Subscriptions attach the session to the change-stream fan-out; a
//! forwarding task per subscription maps fan-out events onto protocol
//! envelopes. Slow sessions are never blocked on: outbound overflow closes
//! the whole session with `BACKPRESSURE`.

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pathdb_engine::Engine;
use pathdb_types::auth_adapter::AuthAdapter;
use pathdb_types::document::FlatDocument;
use pathdb_types::filter::{CompiledFilter, Query};
use pathdb_types::utils::random_id;

use crate::fanout::{FanOut, SubEvent, SubId};
use crate::prelude::*;
use crate::protocol::{
	Envelope, EventPayload, PublicEvent, TYPE_ERROR, TYPE_EVENT,
};

#[derive(Clone, Debug)]
pub struct RealtimeConfig {
	/// Server ping interval; sessions missing a pong within twice this are
	/// closed as idle
	pub heartbeat: Duration,

	/// Bounded outbound queue per session
	pub outbound_buffer: usize,

	/// Bounded fan-out buffer per subscription
	pub sub_buffer: usize,

	/// Per-session subscription cap
	pub max_subscriptions: usize,
}

impl Default for RealtimeConfig {
	fn default() -> Self {
		Self {
			heartbeat: Duration::from_secs(30),
			outbound_buffer: 64,
			sub_buffer: 64,
			max_subscriptions: 64,
		}
	}
}

struct SubHandle {
	fanout_id: SubId,
	task: tokio::task::JoinHandle<()>,
}

/// One client connection (WS frame stream or SSE long-response).
pub struct Session {
	pub id: u64,
	pub tenant: Box<str>,
	outbound: mpsc::Sender<Envelope>,
	cancel: CancellationToken,
	close_reason: Mutex<Option<Box<str>>>,
	subs: Mutex<HashMap<Box<str>, SubHandle>>,
}

impl Session {
	/// Queue an envelope without blocking. Overflow closes the session.
	pub fn send(&self, envelope: Envelope) {
		match self.outbound.try_send(envelope) {
			Ok(()) => {}
			Err(mpsc::error::TrySendError::Full(_)) => {
				warn!("session {} outbound queue overflowed", self.id);
				self.close("BACKPRESSURE");
			}
			Err(mpsc::error::TrySendError::Closed(_)) => {}
		}
	}

	/// Request session teardown with a close code.
	pub fn close(&self, reason: &str) {
		{
			let mut guard = self.close_reason.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			guard.get_or_insert_with(|| reason.into());
		}
		self.cancel.cancel();
	}

	pub fn cancel_token(&self) -> &CancellationToken {
		&self.cancel
	}

	pub fn close_reason(&self) -> Option<Box<str>> {
		self.close_reason.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
	}

	pub fn subscription_count(&self) -> usize {
		self.subs.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
	}

	/// Track a replication stream so session teardown reaps it like any
	/// other subscription.
	pub fn track_stream(
		&self,
		stream_id: &str,
		fanout_id: SubId,
		task: tokio::task::JoinHandle<()>,
	) {
		self.subs
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.insert(stream_id.into(), SubHandle { fanout_id, task });
	}
}

pub struct Hub {
	engine: Arc<Engine>,
	auth: Arc<dyn AuthAdapter>,
	fanout: Arc<FanOut>,
	pub config: RealtimeConfig,
	sessions: RwLock<HashMap<u64, Arc<Session>>>,
	next_session: AtomicU64,
}

impl Hub {
	pub fn new(
		engine: Arc<Engine>,
		auth: Arc<dyn AuthAdapter>,
		fanout: Arc<FanOut>,
		config: RealtimeConfig,
	) -> Arc<Self> {
		Arc::new(Self {
			engine,
			auth,
			fanout,
			config,
			sessions: RwLock::new(HashMap::new()),
			next_session: AtomicU64::new(0),
		})
	}

	pub fn engine(&self) -> &Arc<Engine> {
		&self.engine
	}

	pub fn auth(&self) -> &Arc<dyn AuthAdapter> {
		&self.auth
	}

	pub fn fanout(&self) -> &Arc<FanOut> {
		&self.fanout
	}

	pub fn session_count(&self) -> usize {
		self.sessions.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
	}

	/// Open a session for an authenticated client. Returns the session and
	/// the receiving end of its outbound queue.
	pub fn open_session(&self, tenant: &str) -> (Arc<Session>, mpsc::Receiver<Envelope>) {
		let id = self.next_session.fetch_add(1, Ordering::SeqCst) + 1;
		let (tx, rx) = mpsc::channel(self.config.outbound_buffer);
		let session = Arc::new(Session {
			id,
			tenant: tenant.into(),
			outbound: tx,
			cancel: CancellationToken::new(),
			close_reason: Mutex::new(None),
			subs: Mutex::new(HashMap::new()),
		});
		self.sessions
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.insert(id, session.clone());
		info!("realtime session {} opened (tenant {:?})", id, tenant);
		(session, rx)
	}

	/// Drop a session and everything it holds.
	pub fn close_session(&self, session: &Arc<Session>) {
		self.sessions
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.remove(&session.id);
		let subs = {
			let mut subs = session.subs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			std::mem::take(&mut *subs)
		};
		for handle in subs.values() {
			self.fanout.unsubscribe(handle.fanout_id);
			handle.task.abort();
		}
		session.cancel.cancel();
		info!("realtime session {} closed", session.id);
	}

	/// Verify an auth token. The claims' tenant becomes the session tenant.
	pub async fn authenticate(&self, token: &str) -> DbResult<Box<str>> {
		let claims = self.auth.verify_token(token).await?;
		Ok(claims.tenant)
	}

	/// Add a subscription: validate and compile the query, take the current
	/// snapshot, and attach the session to the fan-out for subsequent
	/// matching events.
	pub async fn subscribe(
		&self,
		session: &Arc<Session>,
		query: &Query,
	) -> DbResult<(String, Vec<FlatDocument>)> {
		if session.subscription_count() >= self.config.max_subscriptions {
			return Err(Error::TooManySubscriptions);
		}
		let predicate = CompiledFilter::compile(&query.filters)?;
		let snapshot = self.engine.execute_query(&session.tenant, query).await?;

		let (fanout_id, mut rx) = self.fanout.subscribe(&query.collection, predicate);
		let sub_id = format!("sub-{}", random_id());

		let forward_session = session.clone();
		let forward_sub = sub_id.clone();
		let task = tokio::spawn(async move {
			while let Some(event) = rx.recv().await {
				match event {
					SubEvent::Change(change) => {
						let delta = PublicEvent {
							kind: change.kind,
							document: change.document.as_ref().map(|doc| doc.flatten()),
							path: change.path.to_string(),
							timestamp: change.timestamp,
						};
						let payload = EventPayload { sub_id: forward_sub.clone(), delta };
						match serde_json::to_value(&payload) {
							Ok(payload) => {
								forward_session.send(Envelope::new(TYPE_EVENT, payload));
							}
							Err(err) => {
								warn!("event serialization failed: {}", err);
							}
						}
					}
					SubEvent::Reset => {
						forward_session.send(Envelope::new(
							TYPE_ERROR,
							json!({
								"code": "STREAM_RESET",
								"subId": forward_sub,
								"message": "change stream lost continuity, reissue catch-up pulls",
							}),
						));
					}
				}
			}
			// The fan-out dropped this subscription (overflow); tell the
			// client before the handle disappears
			forward_session.send(Envelope::new(
				TYPE_ERROR,
				json!({ "code": "BACKPRESSURE", "subId": forward_sub }),
			));
		});

		session
			.subs
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.insert(sub_id.clone().into_boxed_str(), SubHandle { fanout_id, task });

		Ok((sub_id, snapshot))
	}

	/// Remove a subscription. Returns false when the id is unknown.
	pub fn unsubscribe(&self, session: &Arc<Session>, sub_id: &str) -> bool {
		let handle = session
			.subs
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.remove(sub_id);
		match handle {
			Some(handle) => {
				self.fanout.unsubscribe(handle.fanout_id);
				handle.task.abort();
				true
			}
			None => false,
		}
	}
}

impl std::fmt::Debug for Hub {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Hub").field("sessions", &self.session_count()).finish()
	}
}

// vim: ts=4
