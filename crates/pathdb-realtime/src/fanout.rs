//! Change-stream fan-out.
//!
//! One task drains the backend watch stream and multiplexes it to N
//! subscriber channels, each with a collection prefix filter and a compiled
//! predicate. Delivery never blocks: each subscription has a bounded buffer
//! and overflow closes that subscription.
//!
//! Subscription table discipline: dispatch takes the read lock only to
//! collect matching senders; no lock is held across a send.

use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pathdb_engine::Engine;
use pathdb_types::document::collection_matches;
use pathdb_types::filter::CompiledFilter;
use pathdb_types::store_adapter::{ChangeEvent, EventKind, ResumeToken, WatchOptions};

use crate::prelude::*;

pub type SubId = u64;

/// What a subscriber receives.
#[derive(Clone, Debug)]
pub enum SubEvent {
	Change(ChangeEvent),
	/// The source stream was reopened without a resume token; subscribers
	/// must reissue any catch-up pulls.
	Reset,
}

struct SubEntry {
	collection: Box<str>,
	predicate: CompiledFilter,
	tx: mpsc::Sender<SubEvent>,
}

#[derive(Debug, Default)]
pub struct FanOutStats {
	/// Events that matched no subscription's collection filter
	pub filtered: AtomicU64,
	pub delivered: AtomicU64,
	/// Subscriptions closed for overflowing their buffer
	pub dropped: AtomicU64,
}

pub struct FanOut {
	engine: Arc<Engine>,
	subs: RwLock<HashMap<SubId, SubEntry>>,
	next_id: AtomicU64,
	buffer: usize,
	pub stats: FanOutStats,
}

impl FanOut {
	pub fn new(engine: Arc<Engine>, buffer: usize) -> Arc<Self> {
		Arc::new(Self {
			engine,
			subs: RwLock::new(HashMap::new()),
			next_id: AtomicU64::new(0),
			buffer,
			stats: FanOutStats::default(),
		})
	}

	/// Register a subscription. Events from the source stream whose
	/// collection lies inside `collection` (prefix match, "" = all) and
	/// whose document satisfies `predicate` are delivered in source order.
	pub fn subscribe(
		&self,
		collection: &str,
		predicate: CompiledFilter,
	) -> (SubId, mpsc::Receiver<SubEvent>) {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
		let (tx, rx) = mpsc::channel(self.buffer);
		let entry = SubEntry { collection: collection.into(), predicate, tx };
		self.subs.write().unwrap_or_else(|poisoned| poisoned.into_inner()).insert(id, entry);
		debug!("fanout subscription {} opened on {:?}", id, collection);
		(id, rx)
	}

	pub fn unsubscribe(&self, id: SubId) {
		if self
			.subs
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.remove(&id)
			.is_some()
		{
			debug!("fanout subscription {} closed", id);
		}
	}

	pub fn subscription_count(&self) -> usize {
		self.subs.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
	}

	/// Dispatch one source event to all matching subscriptions.
	pub fn dispatch(&self, event: &ChangeEvent) {
		let mut targets: Vec<(SubId, mpsc::Sender<SubEvent>)> = Vec::new();
		{
			let subs = self.subs.read().unwrap_or_else(|poisoned| poisoned.into_inner());
			for (id, entry) in subs.iter() {
				if !collection_matches(&event.collection, &entry.collection) {
					continue;
				}
				if !event_matches_predicate(event, &entry.predicate) {
					continue;
				}
				targets.push((*id, entry.tx.clone()));
			}
		}
		if targets.is_empty() {
			self.stats.filtered.fetch_add(1, Ordering::Relaxed);
			return;
		}

		let mut overflowed = Vec::new();
		for (id, tx) in targets {
			match tx.try_send(SubEvent::Change(event.clone())) {
				Ok(()) => {
					self.stats.delivered.fetch_add(1, Ordering::Relaxed);
				}
				Err(mpsc::error::TrySendError::Full(_)) => {
					warn!("fanout subscription {} overflowed, closing", id);
					overflowed.push(id);
				}
				Err(mpsc::error::TrySendError::Closed(_)) => {
					overflowed.push(id);
				}
			}
		}
		if !overflowed.is_empty() {
			let mut subs = self.subs.write().unwrap_or_else(|poisoned| poisoned.into_inner());
			for id in overflowed {
				subs.remove(&id);
				self.stats.dropped.fetch_add(1, Ordering::Relaxed);
			}
		}
	}

	/// Tell every subscriber the stream lost continuity.
	fn reset_all(&self) {
		let subs = self.subs.read().unwrap_or_else(|poisoned| poisoned.into_inner());
		for entry in subs.values() {
			let _ = entry.tx.try_send(SubEvent::Reset);
		}
	}

	/// Drain the backend watch stream until cancelled, reopening it on
	/// close. A reopen without a resume token emits a reset to all
	/// subscribers.
	pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
		let mut resume: Option<ResumeToken> = None;
		let mut first = true;
		loop {
			if cancel.is_cancelled() {
				return;
			}
			let stream = self
				.engine
				.store()
				.watch("", "", resume, WatchOptions { include_before: true })
				.await;
			let mut stream = match stream {
				Ok(stream) => stream,
				Err(err) => {
					warn!("fanout watch open failed: {}", err);
					tokio::select! {
						() = cancel.cancelled() => return,
						() = tokio::time::sleep(Duration::from_secs(1)) => continue,
					}
				}
			};
			if !first && resume.is_none() {
				self.reset_all();
			}
			first = false;

			loop {
				tokio::select! {
					() = cancel.cancelled() => return,
					event = stream.next() => match event {
						Some(event) => {
							if event.resume_token.is_some() {
								resume = event.resume_token;
							}
							self.dispatch(&event);
						}
						None => {
							info!("fanout source stream closed, reopening");
							break;
						}
					}
				}
			}
		}
	}
}

/// Predicate evaluation per event kind. Deletes carry no document, so they
/// pass on the collection filter alone (evaluating against the prior state
/// when the watch provides it).
fn event_matches_predicate(event: &ChangeEvent, predicate: &CompiledFilter) -> bool {
	if predicate.is_empty() {
		return true;
	}
	match event.kind {
		EventKind::Delete => match &event.before {
			Some(before) => predicate.matches(&before.filter_view()),
			None => true,
		},
		_ => match &event.document {
			Some(doc) => predicate.matches(&doc.filter_view()),
			None => false,
		},
	}
}

impl std::fmt::Debug for FanOut {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FanOut")
			.field("subscriptions", &self.subscription_count())
			.field("buffer", &self.buffer)
			.finish()
	}
}

// vim: ts=4
