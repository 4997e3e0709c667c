//! Server-Sent Events session endpoint.
//!
//! One connection carries exactly one implicit subscription whose filter
//! comes from the query string. The first frame is a `: connected` comment,
//! events are `data: <json>` frames, and the server writes `:heartbeat`
//! comments on the heartbeat interval.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

use pathdb_types::filter::{Filters, Query};

use crate::hub::{Hub, Session};
use crate::prelude::*;
use crate::protocol::Envelope;

/// Query-string parameters of the SSE endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SseParams {
	/// Auth token; the Authorization header is the alternative carrier
	pub token: Option<String>,

	pub collection: Option<String>,

	/// JSON-encoded filter list
	pub filter: Option<String>,
}

/// Drops the session when the client goes away and the response stream is
/// reclaimed.
struct SessionGuard {
	hub: Arc<Hub>,
	session: Arc<Session>,
}

impl Drop for SessionGuard {
	fn drop(&mut self) {
		self.hub.close_session(&self.session);
	}
}

/// Open an SSE session. The caller supplies the bearer token when it came
/// from the Authorization header rather than the query string.
pub async fn handle_sse(
	hub: Arc<Hub>,
	params: SseParams,
	bearer: Option<String>,
) -> DbResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
	let token = params.token.or(bearer).ok_or(Error::Unauthenticated)?;
	let tenant = hub.authenticate(&token).await?;

	let filters: Filters = match &params.filter {
		Some(raw) => serde_json::from_str(raw)
			.map_err(|err| Error::InvalidQuery(format!("bad filter parameter: {}", err)))?,
		None => Filters::new(),
	};
	let query = Query {
		collection: params.collection.unwrap_or_default(),
		filters,
		..Default::default()
	};

	let (session, out_rx) = hub.open_session(&tenant);
	let guard = SessionGuard { hub: hub.clone(), session: session.clone() };

	// The implicit subscription; its snapshot and events arrive through the
	// session outbound queue like on a websocket session
	if let Err(err) = hub.subscribe(&session, &query).await {
		return Err(err);
	}

	let heartbeat = hub.config.heartbeat;
	let stream = sse_stream(session, out_rx, guard);
	Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("heartbeat")))
}

fn sse_stream(
	session: Arc<Session>,
	out_rx: mpsc::Receiver<Envelope>,
	guard: SessionGuard,
) -> impl Stream<Item = Result<Event, Infallible>> {
	struct State {
		session: Arc<Session>,
		out_rx: mpsc::Receiver<Envelope>,
		_guard: SessionGuard,
		connected_sent: bool,
	}

	futures::stream::unfold(
		State { session, out_rx, _guard: guard, connected_sent: false },
		|mut state| async move {
			if !state.connected_sent {
				state.connected_sent = true;
				return Some((Ok(Event::default().comment("connected")), state));
			}
			loop {
				tokio::select! {
					() = state.session.cancel_token().cancelled() => return None,
					envelope = state.out_rx.recv() => {
						let envelope = envelope?;
						match serde_json::to_string(&envelope) {
							Ok(text) => return Some((Ok(Event::default().data(text)), state)),
							Err(err) => {
								warn!("sse serialization failed: {}", err);
								continue;
							}
						}
					}
				}
			}
		},
	)
}

// vim: ts=4
