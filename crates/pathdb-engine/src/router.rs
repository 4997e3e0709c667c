//! Storage routing: dispatch each store operation to one of two wrapped
//! backends based on its operation kind. The default deployment uses a
//! `SingleRouter`; a `SplitRouter` serves reads from a replica and
//! writes/migrations from the primary. Read-your-write is not guaranteed in
//! split mode.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use pathdb_types::document::StoredDocument;
use pathdb_types::filter::{Filters, Query};
use pathdb_types::prelude::*;
use pathdb_types::store_adapter::{
	DocumentRouter, EventStream, OpKind, ResumeToken, StoreAdapter, StoreTransaction, WatchOptions,
};

/// Both operation kinds resolve to the same backend.
#[derive(Debug)]
pub struct SingleRouter {
	backend: Arc<dyn StoreAdapter>,
}

impl SingleRouter {
	pub fn new(backend: Arc<dyn StoreAdapter>) -> Arc<Self> {
		Arc::new(Self { backend })
	}
}

impl DocumentRouter for SingleRouter {
	fn select(&self, _op: OpKind) -> &Arc<dyn StoreAdapter> {
		&self.backend
	}
}

/// Reads go to the replica; writes and migrations go to the primary.
#[derive(Debug)]
pub struct SplitRouter {
	primary: Arc<dyn StoreAdapter>,
	replica: Arc<dyn StoreAdapter>,
}

impl SplitRouter {
	pub fn new(primary: Arc<dyn StoreAdapter>, replica: Arc<dyn StoreAdapter>) -> Arc<Self> {
		Arc::new(Self { primary, replica })
	}
}

impl DocumentRouter for SplitRouter {
	fn select(&self, op: OpKind) -> &Arc<dyn StoreAdapter> {
		if op == OpKind::Read {
			&self.replica
		} else {
			&self.primary
		}
	}
}

/// Store implementation that routes every operation through a router.
#[derive(Debug)]
pub struct RoutedStore {
	router: Arc<dyn DocumentRouter>,
}

impl RoutedStore {
	pub fn new(router: Arc<dyn DocumentRouter>) -> Arc<Self> {
		Arc::new(Self { router })
	}
}

#[async_trait]
impl StoreAdapter for RoutedStore {
	async fn get(&self, tenant: &str, path: &str) -> DbResult<StoredDocument> {
		self.router.select(OpKind::Read).get(tenant, path).await
	}

	async fn create(
		&self,
		tenant: &str,
		fullpath: &str,
		data: Map<String, Value>,
	) -> DbResult<StoredDocument> {
		self.router.select(OpKind::Write).create(tenant, fullpath, data).await
	}

	async fn update(
		&self,
		tenant: &str,
		path: &str,
		data: Map<String, Value>,
		pred: &Filters,
	) -> DbResult<StoredDocument> {
		self.router.select(OpKind::Write).update(tenant, path, data, pred).await
	}

	async fn patch(
		&self,
		tenant: &str,
		path: &str,
		data: Map<String, Value>,
		pred: &Filters,
	) -> DbResult<StoredDocument> {
		self.router.select(OpKind::Write).patch(tenant, path, data, pred).await
	}

	async fn delete(&self, tenant: &str, path: &str, pred: &Filters) -> DbResult<()> {
		self.router.select(OpKind::Write).delete(tenant, path, pred).await
	}

	async fn query(&self, tenant: &str, q: &Query) -> DbResult<Vec<StoredDocument>> {
		self.router.select(OpKind::Read).query(tenant, q).await
	}

	async fn watch(
		&self,
		tenant: &str,
		collection: &str,
		resume: Option<ResumeToken>,
		opts: WatchOptions,
	) -> DbResult<EventStream> {
		self.router.select(OpKind::Read).watch(tenant, collection, resume, opts).await
	}

	async fn transaction(&self, tenant: &str) -> DbResult<Box<dyn StoreTransaction>> {
		self.router.select(OpKind::Write).transaction(tenant).await
	}

	async fn close(&self) -> DbResult<()> {
		// The underlying backends may be shared; their provider manages
		// lifecycle.
		Ok(())
	}
}

// vim: ts=4
