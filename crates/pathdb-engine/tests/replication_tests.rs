//! Replication pull/push tests: checkpoint paging, idempotence, conflict
//! reporting and two-store convergence.

use serde_json::{json, Map, Value};
use std::sync::Arc;

use pathdb_engine::{Engine, RoutedStore, SingleRouter};
use pathdb_store_adapter_memory::{AdapterConfig, StoreAdapterMemory};
use pathdb_types::store_adapter::{PullRequest, PushChange, PushRequest, StoreAdapter};

fn engine() -> Arc<Engine> {
	let backend: Arc<dyn StoreAdapter> = StoreAdapterMemory::new(AdapterConfig::default());
	Engine::new(RoutedStore::new(SingleRouter::new(backend)))
}

fn doc(value: Value) -> Map<String, Value> {
	value.as_object().unwrap().clone()
}

fn pull_req(collection: &str, checkpoint: i64) -> PullRequest {
	PullRequest { collection: collection.into(), checkpoint, limit: 100 }
}

#[tokio::test]
async fn test_pull_empty_returns_input_checkpoint() {
	let engine = engine();
	let resp = engine.pull("", &pull_req("users", 123)).await.unwrap();
	assert!(resp.documents.is_empty());
	assert_eq!(resp.checkpoint, 123);
}

#[tokio::test]
async fn test_pull_pages_and_advances_checkpoint() {
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice" }))).await.unwrap();
	engine.create_document("", "users", doc(json!({ "id": "bob" }))).await.unwrap();

	let resp = engine.pull("", &pull_req("users", 0)).await.unwrap();
	assert_eq!(resp.documents.len(), 2);
	let last_updated =
		resp.documents.last().unwrap().get("_updated_at").and_then(Value::as_i64).unwrap();
	assert_eq!(resp.checkpoint, last_updated);

	// Nothing newer than the returned checkpoint
	let tail = engine.pull("", &pull_req("users", resp.checkpoint)).await.unwrap();
	assert!(tail.documents.is_empty());
}

#[tokio::test]
async fn test_pull_is_idempotent() {
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice" }))).await.unwrap();
	engine.create_document("", "users", doc(json!({ "id": "bob" }))).await.unwrap();

	let first = engine.pull("", &pull_req("users", 0)).await.unwrap();
	let second = engine.pull("", &pull_req("users", 0)).await.unwrap();
	assert_eq!(
		serde_json::to_value(&first.documents).unwrap(),
		serde_json::to_value(&second.documents).unwrap()
	);
	assert_eq!(first.checkpoint, second.checkpoint);
}

#[tokio::test]
async fn test_pull_includes_tombstones() {
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice" }))).await.unwrap();
	engine.delete_document("", "users/alice", &Vec::new()).await.unwrap();

	let resp = engine.pull("", &pull_req("users", 0)).await.unwrap();
	assert_eq!(resp.documents.len(), 1);
	assert_eq!(resp.documents[0].get("deleted"), Some(&json!(true)));
	assert_eq!(resp.documents[0].get("_version"), Some(&json!(2)));
}

#[tokio::test]
async fn test_push_creates_missing_documents() {
	let engine = engine();
	let req = PushRequest {
		collection: "users".into(),
		changes: vec![PushChange {
			doc: doc(json!({ "id": "alice", "name": "Alice" })),
			base_version: None,
		}],
	};
	let resp = engine.push("", &req).await.unwrap();
	assert!(resp.conflicts.is_empty());

	let read = engine.get_document("", "users/alice").await.unwrap();
	assert_eq!(read.get("name"), Some(&json!("Alice")));
	assert_eq!(read.get("_version"), Some(&json!(1)));
}

#[tokio::test]
async fn test_push_version_mismatch_reports_conflict() {
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice", "n": 1 }))).await.unwrap();
	engine
		.patch_document("", "users/alice", doc(json!({ "n": 2 })), &Vec::new())
		.await
		.unwrap();

	// Client thinks version is still 1
	let req = PushRequest {
		collection: "users".into(),
		changes: vec![PushChange {
			doc: doc(json!({ "id": "alice", "n": 99 })),
			base_version: Some(1),
		}],
	};
	let resp = engine.push("", &req).await.unwrap();
	assert_eq!(resp.conflicts.len(), 1);
	assert_eq!(resp.conflicts[0].get("_version"), Some(&json!(2)));

	// The document is untouched
	let read = engine.get_document("", "users/alice").await.unwrap();
	assert_eq!(read.get("n"), Some(&json!(2)));
}

#[tokio::test]
async fn test_push_matching_base_version_updates() {
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice", "n": 1 }))).await.unwrap();

	let req = PushRequest {
		collection: "users".into(),
		changes: vec![PushChange {
			doc: doc(json!({ "id": "alice", "n": 2 })),
			base_version: Some(1),
		}],
	};
	let resp = engine.push("", &req).await.unwrap();
	assert!(resp.conflicts.is_empty());
	let read = engine.get_document("", "users/alice").await.unwrap();
	assert_eq!(read.get("n"), Some(&json!(2)));
	assert_eq!(read.get("_version"), Some(&json!(2)));
}

#[tokio::test]
async fn test_push_delete() {
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice" }))).await.unwrap();

	let req = PushRequest {
		collection: "users".into(),
		changes: vec![PushChange {
			doc: doc(json!({ "id": "alice", "deleted": true })),
			base_version: Some(1),
		}],
	};
	let resp = engine.push("", &req).await.unwrap();
	assert!(resp.conflicts.is_empty());
	assert!(engine.get_document("", "users/alice").await.is_err());
}

#[tokio::test]
async fn test_push_delete_of_missing_document_succeeds() {
	let engine = engine();
	let req = PushRequest {
		collection: "users".into(),
		changes: vec![PushChange {
			doc: doc(json!({ "id": "ghost", "deleted": true })),
			base_version: None,
		}],
	};
	let resp = engine.push("", &req).await.unwrap();
	assert!(resp.conflicts.is_empty());
}

#[tokio::test]
async fn test_push_write_over_tombstone_resurrects() {
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice" }))).await.unwrap();
	engine.delete_document("", "users/alice", &Vec::new()).await.unwrap();

	let req = PushRequest {
		collection: "users".into(),
		changes: vec![PushChange {
			doc: doc(json!({ "id": "alice", "name": "back" })),
			base_version: None,
		}],
	};
	let resp = engine.push("", &req).await.unwrap();
	assert!(resp.conflicts.is_empty());

	let read = engine.get_document("", "users/alice").await.unwrap();
	assert_eq!(read.get("name"), Some(&json!("back")));
	assert_eq!(read.get("_version"), Some(&json!(3)));
}

#[tokio::test]
async fn test_push_partial_progress() {
	// A conflicting change does not stop later changes from applying
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice", "n": 1 }))).await.unwrap();
	engine
		.patch_document("", "users/alice", doc(json!({ "n": 2 })), &Vec::new())
		.await
		.unwrap();

	let req = PushRequest {
		collection: "users".into(),
		changes: vec![
			PushChange { doc: doc(json!({ "id": "alice", "n": 9 })), base_version: Some(1) },
			PushChange { doc: doc(json!({ "id": "bob", "n": 1 })), base_version: None },
		],
	};
	let resp = engine.push("", &req).await.unwrap();
	assert_eq!(resp.conflicts.len(), 1);
	engine.get_document("", "users/bob").await.unwrap();
}

#[tokio::test]
async fn test_push_pull_round_trip_converges() {
	// push(A→B); pull(B); push(B→A) leaves both stores with the same state
	let a = engine();
	let b = engine();

	a.create_document("", "users", doc(json!({ "id": "alice", "n": 1 }))).await.unwrap();
	a.create_document("", "users", doc(json!({ "id": "bob", "n": 2 }))).await.unwrap();
	a.delete_document("", "users/bob", &Vec::new()).await.unwrap();

	// A → B
	let snapshot = a.pull("", &pull_req("users", 0)).await.unwrap();
	let changes = snapshot
		.documents
		.iter()
		.map(|d| PushChange { doc: d.clone(), base_version: None })
		.collect();
	let resp = b.push("", &PushRequest { collection: "users".into(), changes }).await.unwrap();
	assert!(resp.conflicts.is_empty());

	// B → A
	let snapshot = b.pull("", &pull_req("users", 0)).await.unwrap();
	let changes = snapshot
		.documents
		.iter()
		.map(|d| PushChange { doc: d.clone(), base_version: None })
		.collect();
	let resp = a.push("", &PushRequest { collection: "users".into(), changes }).await.unwrap();
	assert!(resp.conflicts.is_empty());

	let alice_a = a.get_document("", "users/alice").await.unwrap();
	let alice_b = b.get_document("", "users/alice").await.unwrap();
	assert_eq!(alice_a.get("n"), alice_b.get("n"));
	assert!(a.get_document("", "users/bob").await.is_err());
	assert!(b.get_document("", "users/bob").await.is_err());
}

// vim: ts=4
