//! Realtime endpoint: WebSocket upgrade, or SSE for clients sending
//! `Accept: text/event-stream`.

use axum::extract::{FromRequestParts, Query as QueryString, Request, State, WebSocketUpgrade};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};

use pathdb_realtime::sse::{handle_sse, SseParams};
use pathdb_realtime::websocket::handle_connection;

use super::bearer_token;
use crate::app::App;
use crate::prelude::*;

fn accepts_event_stream(headers: &HeaderMap) -> bool {
	headers
		.get(header::ACCEPT)
		.and_then(|value| value.to_str().ok())
		.is_some_and(|accept| accept.contains("text/event-stream"))
}

pub async fn realtime(State(app): State<App>, request: Request) -> Response {
	let (mut parts, _body) = request.into_parts();
	let headers = parts.headers.clone();

	if headers.get(header::UPGRADE).is_some() {
		return match WebSocketUpgrade::from_request_parts(&mut parts, &app).await {
			Ok(ws) => {
				let hub = app.hub.clone();
				ws.on_upgrade(move |socket| handle_connection(socket, hub)).into_response()
			}
			Err(err) => err.into_response(),
		};
	}

	if accepts_event_stream(&headers) {
		let params = match QueryString::<SseParams>::from_request_parts(&mut parts, &app).await {
			Ok(QueryString(params)) => params,
			Err(err) => return err.into_response(),
		};
		let bearer = bearer_token(&headers);
		return match handle_sse(app.hub.clone(), params, bearer).await {
			Ok(sse) => sse.into_response(),
			Err(err) => err.into_response(),
		};
	}

	Error::InvalidArgument("expected websocket upgrade or Accept: text/event-stream".into())
		.into_response()
}

// vim: ts=4
