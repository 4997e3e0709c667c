//! Replication pull and push.
//!
//! Pull pages documents (tombstones included) past a numeric checkpoint,
//! the `updated_at` high-water mark. Push applies client changes with
//! CAS-based conflict detection; conflicting changes are reported back and
//! never abort the batch. Push is not atomic across changes.

use serde_json::Value;

use pathdb_types::document::{coerce_id, strip_reserved, FlatDocument, KEY_DELETED, KEY_ID};
use pathdb_types::filter::{version_predicate, Filter, Order, Query, MAX_LIMIT};
use pathdb_types::store_adapter::{PullRequest, PullResponse, PushChange, PushRequest, PushResponse};

use crate::engine::Engine;
use crate::prelude::*;

impl Engine {
	/// Pull up to `limit` documents with `updated_at > checkpoint`, ordered
	/// by (updated_at asc, fullpath asc). The returned checkpoint is the
	/// `updated_at` of the last document, or the input checkpoint when the
	/// result is empty. Pulling twice with the same checkpoint returns the
	/// same documents.
	pub async fn pull(&self, tenant: &str, req: &PullRequest) -> DbResult<PullResponse> {
		let tenant = tenant_or_default(tenant);
		let q = Query {
			collection: req.collection.clone(),
			filters: vec![Filter {
				field: "updatedAt".into(),
				op: ">".into(),
				value: Value::Number(req.checkpoint.into()),
			}],
			order_by: vec![Order { field: "updatedAt".into(), direction: "asc".into() }],
			limit: req.limit.min(MAX_LIMIT),
			start_after: String::new(),
			show_deleted: true,
		};
		let docs = self.store().query(tenant, &q).await?;
		let checkpoint = docs.last().map(|doc| doc.updated_at.0).unwrap_or(req.checkpoint);
		Ok(PullResponse { documents: docs.iter().map(|doc| doc.flatten()).collect(), checkpoint })
	}

	/// Apply a batch of pushed changes. Version conflicts and create races
	/// append the current record to the conflict list; any other backend
	/// error aborts the whole push. Partial progress is possible.
	pub async fn push(&self, tenant: &str, req: &PushRequest) -> DbResult<PushResponse> {
		let tenant = tenant_or_default(tenant);
		let mut conflicts: Vec<FlatDocument> = Vec::new();

		for change in &req.changes {
			let (fullpath, data, is_delete) = explode_change(&req.collection, change)?;
			let pred = change.base_version.map(version_predicate).unwrap_or_default();

			let current = match self.store().get(tenant, &fullpath).await {
				Ok(doc) => Some(doc),
				Err(Error::NotFound) => None,
				Err(err) => return Err(err),
			};

			// Version gate before touching the backend
			if let (Some(doc), Some(base)) = (&current, change.base_version) {
				if doc.version != base {
					conflicts.push(doc.flatten());
					continue;
				}
			}

			match current {
				None if is_delete => {
					// Nothing to delete; the intent is already satisfied
				}
				None => {
					if let Some(conflict) =
						self.push_create(tenant, &fullpath, data.clone()).await?
					{
						conflicts.push(conflict);
					}
				}
				Some(doc) if is_delete => {
					match self.store().delete(tenant, &fullpath, &pred).await {
						Ok(()) | Err(Error::NotFound) => {}
						Err(Error::PreconditionFailed) => {
							conflicts.push(self.reread_conflict(tenant, &fullpath, &doc).await);
						}
						Err(err) => return Err(err),
					}
				}
				Some(doc) if doc.deleted => {
					// Write over a tombstone resurrects the path
					if let Some(conflict) =
						self.push_create(tenant, &fullpath, data.clone()).await?
					{
						conflicts.push(conflict);
					}
				}
				Some(doc) => {
					match self.store().update(tenant, &fullpath, data.clone(), &pred).await {
						Ok(_) => {}
						Err(Error::PreconditionFailed) => {
							conflicts.push(self.reread_conflict(tenant, &fullpath, &doc).await);
						}
						Err(err) => return Err(err),
					}
				}
			}
		}

		Ok(PushResponse { conflicts })
	}

	async fn push_create(
		&self,
		tenant: &str,
		fullpath: &str,
		data: serde_json::Map<String, Value>,
	) -> DbResult<Option<FlatDocument>> {
		match self.store().create(tenant, fullpath, data).await {
			Ok(_) => Ok(None),
			Err(Error::Exists) => {
				// Lost a create race; the winner is the conflict record
				match self.store().get(tenant, fullpath).await {
					Ok(doc) => Ok(Some(doc.flatten())),
					Err(_) => Ok(Some(FlatDocument::new())),
				}
			}
			Err(err) => Err(err),
		}
	}

	async fn reread_conflict(
		&self,
		tenant: &str,
		fullpath: &str,
		fallback: &pathdb_types::document::StoredDocument,
	) -> FlatDocument {
		match self.store().get(tenant, fullpath).await {
			Ok(doc) => doc.flatten(),
			Err(_) => fallback.flatten(),
		}
	}
}

/// Extract (fullpath, data, is_delete) from a pushed change. A change with
/// no path information is rejected; a change carrying only an `id` inside
/// its data is reconstructed as `collection/id`.
fn explode_change(
	collection: &str,
	change: &PushChange,
) -> DbResult<(String, serde_json::Map<String, Value>, bool)> {
	let is_delete = change.doc.get(KEY_DELETED).and_then(Value::as_bool).unwrap_or(false);
	let id = match change.doc.get(KEY_ID) {
		Some(value) => coerce_id(value)?,
		None => {
			return Err(Error::InvalidArgument("push change without document id".into()));
		}
	};
	let fullpath = format!("{}/{}", collection, id);
	let mut data = strip_reserved(change.doc.clone());
	data.remove(KEY_ID);
	data.remove(KEY_DELETED);
	data.remove("collection");
	Ok((fullpath, data, is_delete))
}

// vim: ts=4
