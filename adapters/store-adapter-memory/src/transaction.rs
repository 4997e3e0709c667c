//! Staged-write transaction for the in-memory adapter.
//!
//! Operations are validated against an overlay of the committed state plus
//! the transaction's own staged writes, so reads observe uncommitted
//! changes. Commit re-applies every operation against a scratch copy of the
//! tenant map under the write lock and swaps it in only when all of them
//! succeed, then publishes the change events in operation order.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

use pathdb_types::document::StoredDocument;
use pathdb_types::prelude::*;
use pathdb_types::store_adapter::{EventKind, StoreTransaction};

use crate::storage::{do_create, do_delete, do_patch, do_update};
use crate::{Inner, TenantMap};

#[derive(Debug)]
enum StagedOp {
	Create { fullpath: Box<str>, data: Map<String, Value> },
	Update { path: Box<str>, data: Map<String, Value> },
	Patch { path: Box<str>, data: Map<String, Value> },
	Delete { path: Box<str> },
}

pub struct MemoryTransaction {
	inner: Arc<Inner>,
	tenant: Box<str>,
	ops: Vec<StagedOp>,
	/// Overlay of this transaction's view: path -> staged record (None after
	/// a staged delete)
	overlay: std::collections::HashMap<Box<str>, Option<StoredDocument>>,
	done: bool,
}

impl MemoryTransaction {
	pub(crate) fn new(inner: Arc<Inner>, tenant: &str) -> Self {
		Self {
			inner,
			tenant: tenant.into(),
			ops: Vec::new(),
			overlay: std::collections::HashMap::new(),
			done: false,
		}
	}

	async fn view(&self, path: &str) -> DbResult<Option<StoredDocument>> {
		if let Some(staged) = self.overlay.get(path) {
			return Ok(staged.clone());
		}
		let tenants = self.inner.tenants.read().await;
		Ok(tenants.get(self.tenant.as_ref()).and_then(|map| map.get(path)).cloned())
	}

	fn ensure_open(&self) -> DbResult<()> {
		if self.done {
			return Err(Error::Internal("transaction already finished".into()));
		}
		Ok(())
	}
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
	async fn get(&self, path: &str) -> DbResult<Option<StoredDocument>> {
		Ok(self.view(path).await?.filter(|doc| !doc.deleted))
	}

	async fn create(&mut self, fullpath: &str, data: Map<String, Value>) -> DbResult<()> {
		self.ensure_open()?;
		pathdb_types::document::validate_document_path(fullpath)?;
		if self.view(fullpath).await?.is_some_and(|doc| !doc.deleted) {
			return Err(Error::Exists);
		}
		let staged = StoredDocument::new(fullpath, data.clone())?;
		self.overlay.insert(fullpath.into(), Some(staged));
		self.ops.push(StagedOp::Create { fullpath: fullpath.into(), data });
		Ok(())
	}

	async fn update(&mut self, path: &str, data: Map<String, Value>) -> DbResult<()> {
		self.ensure_open()?;
		let mut doc = self.view(path).await?.filter(|doc| !doc.deleted).ok_or(Error::NotFound)?;
		doc.data = data.clone();
		doc.version += 1;
		self.overlay.insert(path.into(), Some(doc));
		self.ops.push(StagedOp::Update { path: path.into(), data });
		Ok(())
	}

	async fn patch(&mut self, path: &str, data: Map<String, Value>) -> DbResult<()> {
		self.ensure_open()?;
		let mut doc = self.view(path).await?.filter(|doc| !doc.deleted).ok_or(Error::NotFound)?;
		for (key, value) in data.clone() {
			doc.data.insert(key, value);
		}
		doc.version += 1;
		self.overlay.insert(path.into(), Some(doc));
		self.ops.push(StagedOp::Patch { path: path.into(), data });
		Ok(())
	}

	async fn delete(&mut self, path: &str) -> DbResult<()> {
		self.ensure_open()?;
		self.view(path).await?.filter(|doc| !doc.deleted).ok_or(Error::NotFound)?;
		self.overlay.insert(path.into(), None);
		self.ops.push(StagedOp::Delete { path: path.into() });
		Ok(())
	}

	async fn commit(&mut self) -> DbResult<()> {
		self.ensure_open()?;
		self.done = true;

		let mut tenants = self.inner.tenants.write().await;
		let committed = tenants.entry(self.tenant.clone()).or_default();

		// Apply against a scratch copy first; nothing is visible on error
		let mut scratch: TenantMap = committed.clone();
		let empty = Vec::new();
		let mut events = Vec::with_capacity(self.ops.len());
		for op in &self.ops {
			match op {
				StagedOp::Create { fullpath, data } => {
					let doc = do_create(&mut scratch, fullpath, data.clone())?;
					events.push((EventKind::Create, doc, None));
				}
				StagedOp::Update { path, data } => {
					let (doc, before) = do_update(&mut scratch, path, data.clone(), &empty)?;
					events.push((EventKind::Update, doc, Some(before)));
				}
				StagedOp::Patch { path, data } => {
					let (doc, before) = do_patch(&mut scratch, path, data.clone(), &empty)?;
					events.push((EventKind::Update, doc, Some(before)));
				}
				StagedOp::Delete { path } => {
					let (tombstone, before) = do_delete(&mut scratch, path, &empty)?;
					events.push((EventKind::Delete, tombstone, Some(before)));
				}
			}
		}

		*committed = scratch;
		for (kind, doc, before) in events {
			let document = if kind == EventKind::Delete { None } else { Some(doc.clone()) };
			self.inner.emit(&self.tenant, kind, &doc.fullpath, &doc.collection, document, before);
		}
		Ok(())
	}

	async fn rollback(&mut self) -> DbResult<()> {
		self.ensure_open()?;
		self.done = true;
		self.ops.clear();
		self.overlay.clear();
		Ok(())
	}
}

impl std::fmt::Debug for MemoryTransaction {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MemoryTransaction")
			.field("tenant", &self.tenant)
			.field("ops", &self.ops.len())
			.field("done", &self.done)
			.finish()
	}
}

// vim: ts=4
