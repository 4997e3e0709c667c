//! Multi-operation write batches.
//!
//! A batch executes inside one backend transaction: either every operation
//! commits together, or none do. The operation vocabulary matches the
//! store contract: "update" (and its alias "replace") is a wholesale swap,
//! "patch" is a shallow merge.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use pathdb_types::document::strip_reserved;

use crate::engine::Engine;
use crate::prelude::*;

/// A single operation of a transactional write batch.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WriteOp {
	Create {
		path: String,
		#[serde(default)]
		data: Map<String, Value>,
	},
	Update {
		path: String,
		#[serde(default)]
		data: Map<String, Value>,
	},
	Patch {
		path: String,
		#[serde(default)]
		data: Map<String, Value>,
	},
	/// Accepted alias for `update`
	Replace {
		path: String,
		#[serde(default)]
		data: Map<String, Value>,
	},
	Delete {
		path: String,
	},
}

impl Engine {
	/// Run a write batch inside one backend transaction. The first failing
	/// operation rolls back everything staged before it.
	pub async fn run_transaction(&self, tenant: &str, writes: &[WriteOp]) -> DbResult<()> {
		let tenant = tenant_or_default(tenant);
		let mut txn = self.store().transaction(tenant).await?;

		for op in writes {
			let result = match op {
				WriteOp::Create { path, data } => {
					txn.create(path, strip_reserved(data.clone())).await
				}
				WriteOp::Update { path, data } | WriteOp::Replace { path, data } => {
					txn.update(path, strip_reserved(data.clone())).await
				}
				WriteOp::Patch { path, data } => txn.patch(path, strip_reserved(data.clone())).await,
				WriteOp::Delete { path } => txn.delete(path).await,
			};
			if let Err(err) = result {
				warn!("transaction aborted: {}", err);
				txn.rollback().await?;
				return Err(err);
			}
		}

		txn.commit().await
	}
}

// vim: ts=4
