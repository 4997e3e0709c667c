//! The document engine: CRUD and query operations over the store backend,
//! presenting flattened documents to callers. All operations take a tenant
//! string; the empty string selects the default tenant.

use serde_json::{Map, Value};
use std::sync::Arc;

use pathdb_types::document::{
	coerce_id, split_document_path, strip_reserved, validate_collection_path,
	validate_document_path, FlatDocument, KEY_ID,
};
use pathdb_types::filter::{Filters, Query};
use pathdb_types::store_adapter::{EventStream, StoreAdapter, WatchOptions};
use pathdb_types::utils::random_id;

use crate::prelude::*;

#[derive(Clone, Debug)]
pub struct Engine {
	store: Arc<dyn StoreAdapter>,
}

impl Engine {
	pub fn new(store: Arc<dyn StoreAdapter>) -> Arc<Self> {
		Arc::new(Self { store })
	}

	pub fn store(&self) -> &Arc<dyn StoreAdapter> {
		&self.store
	}

	/// Get a document. Tombstones are stripped to `NotFound`.
	pub async fn get_document(&self, tenant: &str, path: &str) -> DbResult<FlatDocument> {
		let tenant = tenant_or_default(tenant);
		validate_document_path(path)?;
		let doc = self.store.get(tenant, path).await?;
		if doc.deleted {
			return Err(Error::NotFound);
		}
		Ok(doc.flatten())
	}

	/// Create a document in a collection. The id comes from the body's `id`
	/// key (coerced to a string) or is generated.
	pub async fn create_document(
		&self,
		tenant: &str,
		collection: &str,
		mut doc: FlatDocument,
	) -> DbResult<FlatDocument> {
		let tenant = tenant_or_default(tenant);
		validate_collection_path(collection)?;
		let id = match doc.remove(KEY_ID) {
			Some(value) => coerce_id(&value)?,
			None => random_id(),
		};
		let fullpath = format!("{}/{}", collection, id);
		let data = sanitize_body(doc);
		let created = self.store.create(tenant, &fullpath, data).await?;
		Ok(created.flatten())
	}

	/// Replace a document wholesale. If the target does not exist (or is a
	/// tombstone) the operation degrades to a create.
	pub async fn replace_document(
		&self,
		tenant: &str,
		path: &str,
		doc: FlatDocument,
		pred: &Filters,
	) -> DbResult<FlatDocument> {
		let tenant = tenant_or_default(tenant);
		let (_, doc_id) = split_document_path(path)?;
		if let Some(body_id) = doc.get(KEY_ID) {
			if coerce_id(body_id)? != doc_id {
				return Err(Error::InvalidArgument("document id cannot be changed".into()));
			}
		}
		let data = sanitize_body(doc);

		match self.store.get(tenant, path).await {
			Ok(current) if !current.deleted => {
				let updated = self.store.update(tenant, path, data, pred).await?;
				Ok(updated.flatten())
			}
			Ok(_) | Err(Error::NotFound) => {
				let created = self.store.create(tenant, path, data).await?;
				Ok(created.flatten())
			}
			Err(err) => Err(err),
		}
	}

	/// Shallow-merge the given top-level keys into a document.
	pub async fn patch_document(
		&self,
		tenant: &str,
		path: &str,
		doc: FlatDocument,
		pred: &Filters,
	) -> DbResult<FlatDocument> {
		let tenant = tenant_or_default(tenant);
		let (_, doc_id) = split_document_path(path)?;
		if let Some(body_id) = doc.get(KEY_ID) {
			if coerce_id(body_id)? != doc_id {
				return Err(Error::InvalidArgument("document id cannot be changed".into()));
			}
		}
		let data = sanitize_body(doc);
		if data.is_empty() {
			return Err(Error::InvalidArgument("no data to update".into()));
		}
		let updated = self.store.patch(tenant, path, data, pred).await?;
		Ok(updated.flatten())
	}

	/// Soft-delete a document.
	pub async fn delete_document(&self, tenant: &str, path: &str, pred: &Filters) -> DbResult<()> {
		let tenant = tenant_or_default(tenant);
		validate_document_path(path)?;
		self.store.delete(tenant, path, pred).await
	}

	/// Execute a query, returning flattened documents.
	pub async fn execute_query(&self, tenant: &str, q: &Query) -> DbResult<Vec<FlatDocument>> {
		let tenant = tenant_or_default(tenant);
		let docs = self.store.query(tenant, q).await?;
		Ok(docs.iter().map(|doc| doc.flatten()).collect())
	}

	/// Watch changes in a collection subtree. Empty collection means all
	/// collections; empty tenant means all tenants.
	pub async fn watch_collection(&self, tenant: &str, collection: &str) -> DbResult<EventStream> {
		self.store
			.watch(tenant, collection, None, WatchOptions { include_before: true })
			.await
	}
}

/// Strip the reserved system keys and the non-client-mutable derived fields
/// from an incoming body.
fn sanitize_body(doc: FlatDocument) -> Map<String, Value> {
	let mut data = strip_reserved(doc);
	data.remove(KEY_ID);
	data.remove("collection");
	data
}

// vim: ts=4
