#![forbid(unsafe_code)]

//! In-memory implementation of the pathdb store adapter.
//!
//! Keeps per-tenant document maps, serves watch streams from a bounded
//! replay log with monotonic resume tokens, and runs a background sweeper
//! that purges tombstones past the retention window. Doubles as the test
//! backend and as an embedded store for development deployments.

mod storage;
mod transaction;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock};

use pathdb_types::document::{collection_matches, StoredDocument};
use pathdb_types::filter::{Filters, Query};
use pathdb_types::prelude::*;
use pathdb_types::store_adapter::{
	ChangeEvent, EventKind, EventStream, ResumeToken, StoreAdapter, StoreTransaction, WatchOptions,
};

pub use transaction::MemoryTransaction;

use storage::{do_create, do_delete, do_patch, do_update, run_query};

/// Adapter configuration options.
#[derive(Clone, Debug)]
pub struct AdapterConfig {
	/// Tombstones older than this are eligible for purging
	pub retention: Duration,

	/// Interval of the background purge sweeper
	pub sweep_interval: Duration,

	/// Broadcast channel capacity for change events
	pub broadcast_capacity: usize,

	/// Number of recent events kept for watch resumption
	pub replay_capacity: usize,
}

impl Default for AdapterConfig {
	fn default() -> Self {
		Self {
			retention: Duration::from_secs(24 * 3600),
			sweep_interval: Duration::from_secs(300),
			broadcast_capacity: 1024,
			replay_capacity: 4096,
		}
	}
}

pub(crate) type TenantMap = BTreeMap<Box<str>, StoredDocument>;

#[derive(Debug)]
pub(crate) struct Inner {
	pub tenants: RwLock<HashMap<Box<str>, TenantMap>>,
	pub tx: broadcast::Sender<ChangeEvent>,
	pub seq: AtomicU64,
	/// Recent events, bounded by `replay_capacity`, for resume replay
	pub log: std::sync::Mutex<VecDeque<ChangeEvent>>,
	pub config: AdapterConfig,
}

impl Inner {
	/// Assign a sequence number and publish an event. Must be called while
	/// the tenants write lock is held so the log stays in commit order.
	pub fn emit(
		&self,
		tenant: &str,
		kind: EventKind,
		path: &str,
		collection: &str,
		document: Option<StoredDocument>,
		before: Option<StoredDocument>,
	) {
		let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
		let event = ChangeEvent {
			tenant: tenant.into(),
			kind,
			path: path.into(),
			collection: collection.into(),
			document,
			before,
			timestamp: Timestamp::now(),
			resume_token: Some(seq),
		};
		{
			let mut log = self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			if log.len() >= self.config.replay_capacity {
				log.pop_front();
			}
			log.push_back(event.clone());
		}
		// No receivers is fine; the log still records the event
		let _ = self.tx.send(event);
	}
}

/// In-memory store adapter.
#[derive(Debug)]
pub struct StoreAdapterMemory {
	inner: Arc<Inner>,
	sweeper: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl StoreAdapterMemory {
	pub fn new(config: AdapterConfig) -> Arc<Self> {
		let (tx, _rx) = broadcast::channel(config.broadcast_capacity);
		let inner = Arc::new(Inner {
			tenants: RwLock::new(HashMap::new()),
			tx,
			seq: AtomicU64::new(0),
			log: std::sync::Mutex::new(VecDeque::new()),
			config,
		});

		let adapter = Arc::new(Self { inner: inner.clone(), sweeper: std::sync::Mutex::new(None) });

		let sweep_interval = inner.config.sweep_interval;
		let retention = inner.config.retention;
		let sweep_inner = inner;
		let handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(sweep_interval);
			interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
			loop {
				interval.tick().await;
				let horizon = Timestamp(Timestamp::now().0 - retention.as_millis() as i64);
				let mut tenants = sweep_inner.tenants.write().await;
				let mut purged = 0usize;
				for map in tenants.values_mut() {
					let before = map.len();
					map.retain(|_, doc| !(doc.deleted && doc.updated_at < horizon));
					purged += before - map.len();
				}
				if purged > 0 {
					debug!("purge sweeper removed {} tombstones", purged);
				}
			}
		});
		*adapter.sweeper.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);

		adapter
	}

	/// Replay events after `resume` from the bounded log.
	fn replay_after(&self, resume: ResumeToken) -> Vec<ChangeEvent> {
		let log = self.inner.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		log.iter().filter(|e| e.resume_token.unwrap_or(0) > resume).cloned().collect()
	}
}

fn scope_event(
	event: ChangeEvent,
	tenant: &str,
	collection: &str,
	opts: WatchOptions,
) -> Option<ChangeEvent> {
	if !tenant.is_empty() && event.tenant.as_ref() != tenant {
		return None;
	}
	if !collection_matches(&event.collection, collection) {
		return None;
	}
	let mut event = event;
	if !opts.include_before {
		event.before = None;
	}
	Some(event)
}

#[async_trait]
impl StoreAdapter for StoreAdapterMemory {
	async fn get(&self, tenant: &str, path: &str) -> DbResult<StoredDocument> {
		pathdb_types::document::validate_document_path(path)?;
		let tenants = self.inner.tenants.read().await;
		tenants
			.get(tenant)
			.and_then(|map| map.get(path))
			.cloned()
			.ok_or(Error::NotFound)
	}

	async fn create(
		&self,
		tenant: &str,
		fullpath: &str,
		data: Map<String, Value>,
	) -> DbResult<StoredDocument> {
		let mut tenants = self.inner.tenants.write().await;
		let map = tenants.entry(tenant.into()).or_default();
		let doc = do_create(map, fullpath, data)?;
		self.inner.emit(
			tenant,
			EventKind::Create,
			&doc.fullpath,
			&doc.collection,
			Some(doc.clone()),
			None,
		);
		Ok(doc)
	}

	async fn update(
		&self,
		tenant: &str,
		path: &str,
		data: Map<String, Value>,
		pred: &Filters,
	) -> DbResult<StoredDocument> {
		let mut tenants = self.inner.tenants.write().await;
		let map = tenants.entry(tenant.into()).or_default();
		let (doc, before) = do_update(map, path, data, pred)?;
		self.inner.emit(
			tenant,
			EventKind::Update,
			&doc.fullpath,
			&doc.collection,
			Some(doc.clone()),
			Some(before),
		);
		Ok(doc)
	}

	async fn patch(
		&self,
		tenant: &str,
		path: &str,
		data: Map<String, Value>,
		pred: &Filters,
	) -> DbResult<StoredDocument> {
		let mut tenants = self.inner.tenants.write().await;
		let map = tenants.entry(tenant.into()).or_default();
		let (doc, before) = do_patch(map, path, data, pred)?;
		self.inner.emit(
			tenant,
			EventKind::Update,
			&doc.fullpath,
			&doc.collection,
			Some(doc.clone()),
			Some(before),
		);
		Ok(doc)
	}

	async fn delete(&self, tenant: &str, path: &str, pred: &Filters) -> DbResult<()> {
		let mut tenants = self.inner.tenants.write().await;
		let map = tenants.entry(tenant.into()).or_default();
		let (tombstone, before) = do_delete(map, path, pred)?;
		self.inner.emit(
			tenant,
			EventKind::Delete,
			&tombstone.fullpath,
			&tombstone.collection,
			None,
			Some(before),
		);
		Ok(())
	}

	async fn query(&self, tenant: &str, q: &Query) -> DbResult<Vec<StoredDocument>> {
		let tenants = self.inner.tenants.read().await;
		let Some(map) = tenants.get(tenant) else {
			return Ok(Vec::new());
		};
		run_query(map, q)
	}

	async fn watch(
		&self,
		tenant: &str,
		collection: &str,
		resume: Option<ResumeToken>,
		opts: WatchOptions,
	) -> DbResult<EventStream> {
		// Subscribe before replaying so no event falls between the two
		let mut rx = self.inner.tx.subscribe();
		let replay = match resume {
			Some(token) => self.replay_after(token),
			None => Vec::new(),
		};
		let mut last_seq = replay.last().and_then(|e| e.resume_token).or(resume).unwrap_or(0);

		let (out_tx, out_rx) = mpsc::channel::<ChangeEvent>(self.inner.config.broadcast_capacity);

		let tenant = tenant.to_string();
		let collection = collection.to_string();
		tokio::spawn(async move {
			for event in replay {
				if let Some(event) = scope_event(event, &tenant, &collection, opts) {
					if out_tx.send(event).await.is_err() {
						return;
					}
				}
			}
			loop {
				match rx.recv().await {
					Ok(event) => {
						let seq = event.resume_token.unwrap_or(0);
						if seq <= last_seq {
							continue;
						}
						last_seq = seq;
						if let Some(event) = scope_event(event, &tenant, &collection, opts) {
							if out_tx.send(event).await.is_err() {
								return;
							}
						}
					}
					// Lagged receivers close the stream; the watcher reopens
					// from its last resume token and replays from the log
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!("watch stream lagged, {} events skipped, closing", skipped);
						return;
					}
					Err(broadcast::error::RecvError::Closed) => return,
				}
			}
		});

		Ok(Box::pin(futures::stream::unfold(out_rx, |mut rx| async move {
			rx.recv().await.map(|event| (event, rx))
		})))
	}

	async fn transaction(&self, tenant: &str) -> DbResult<Box<dyn StoreTransaction>> {
		Ok(Box::new(MemoryTransaction::new(self.inner.clone(), tenant)))
	}

	async fn close(&self) -> DbResult<()> {
		if let Some(handle) =
			self.sweeper.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take()
		{
			handle.abort();
		}
		Ok(())
	}
}

// vim: ts=4
