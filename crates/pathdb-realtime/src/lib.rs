//! Realtime subsystem: a single backend change stream fanned out to many
//! filtered subscriptions, served over WebSocket and SSE sessions.

pub mod fanout;
pub mod hub;
pub mod protocol;
pub mod sse;
pub mod websocket;

mod prelude;

pub use fanout::{FanOut, SubEvent, SubId};
pub use hub::{Hub, RealtimeConfig, Session};

// vim: ts=4
