//! Engine-level tests: flattened wire shape, CAS, degrade-to-create,
//! transactional batches.

use serde_json::{json, Map, Value};
use std::sync::Arc;

use pathdb_engine::{Engine, RoutedStore, SingleRouter, WriteOp};
use pathdb_store_adapter_memory::{AdapterConfig, StoreAdapterMemory};
use pathdb_types::error::Error;
use pathdb_types::filter::{version_predicate, Query};
use pathdb_types::store_adapter::StoreAdapter;

fn engine() -> Arc<Engine> {
	let backend: Arc<dyn StoreAdapter> = StoreAdapterMemory::new(AdapterConfig::default());
	Engine::new(RoutedStore::new(SingleRouter::new(backend)))
}

fn doc(value: Value) -> Map<String, Value> {
	value.as_object().unwrap().clone()
}

#[tokio::test]
async fn test_create_and_get_flattened() {
	let engine = engine();
	let created = engine
		.create_document("", "users", doc(json!({ "id": "alice", "name": "Alice" })))
		.await
		.unwrap();
	assert_eq!(created.get("id"), Some(&json!("alice")));
	assert_eq!(created.get("name"), Some(&json!("Alice")));
	assert_eq!(created.get("_version"), Some(&json!(1)));
	assert!(created.contains_key("_updated_at"));

	let read = engine.get_document("", "users/alice").await.unwrap();
	assert_eq!(read.get("name"), Some(&json!("Alice")));
	assert_eq!(read.get("_version"), Some(&json!(1)));
}

#[tokio::test]
async fn test_create_generates_id() {
	let engine = engine();
	let created = engine.create_document("", "users", doc(json!({ "name": "X" }))).await.unwrap();
	let id = created.get("id").and_then(Value::as_str).unwrap();
	assert_eq!(id.len(), 24);
}

#[tokio::test]
async fn test_create_coerces_numeric_id() {
	let engine = engine();
	let created = engine.create_document("", "users", doc(json!({ "id": 42 }))).await.unwrap();
	assert_eq!(created.get("id"), Some(&json!("42")));
	engine.get_document("", "users/42").await.unwrap();

	let err =
		engine.create_document("", "users", doc(json!({ "id": true }))).await.unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_reserved_keys_stripped() {
	let engine = engine();
	let created = engine
		.create_document("", "users", doc(json!({ "id": "a", "_version": 99, "_updated_at": 1 })))
		.await
		.unwrap();
	assert_eq!(created.get("_version"), Some(&json!(1)));
}

#[tokio::test]
async fn test_replace_degrades_to_create() {
	let engine = engine();
	let replaced = engine
		.replace_document("", "users/alice", doc(json!({ "name": "Alice" })), &Vec::new())
		.await
		.unwrap();
	assert_eq!(replaced.get("_version"), Some(&json!(1)));

	let replaced = engine
		.replace_document("", "users/alice", doc(json!({ "name": "Alice2" })), &Vec::new())
		.await
		.unwrap();
	assert_eq!(replaced.get("_version"), Some(&json!(2)));
	assert_eq!(replaced.get("name"), Some(&json!("Alice2")));
}

#[tokio::test]
async fn test_patch_with_cas() {
	let engine = engine();
	engine
		.replace_document("", "users/alice", doc(json!({ "name": "Alice" })), &Vec::new())
		.await
		.unwrap();

	// Matching predicate: shallow merge, version bump
	let patched = engine
		.patch_document("", "users/alice", doc(json!({ "age": 30 })), &version_predicate(1))
		.await
		.unwrap();
	assert_eq!(patched.get("_version"), Some(&json!(2)));
	assert_eq!(patched.get("name"), Some(&json!("Alice")));
	assert_eq!(patched.get("age"), Some(&json!(30)));

	// Stale predicate: 412, state unchanged
	let err = engine
		.patch_document("", "users/alice", doc(json!({ "age": 99 })), &version_predicate(1))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::PreconditionFailed));
	let read = engine.get_document("", "users/alice").await.unwrap();
	assert_eq!(read.get("_version"), Some(&json!(2)));
	assert_eq!(read.get("age"), Some(&json!(30)));
}

#[tokio::test]
async fn test_wire_cas_predicate_spelling() {
	// Clients spell the CAS field `_version` on the wire
	let engine = engine();
	engine
		.replace_document("", "users/alice", doc(json!({ "name": "Alice" })), &Vec::new())
		.await
		.unwrap();
	let pred = serde_json::from_value(json!([{ "field": "_version", "op": "==", "value": 1 }]))
		.unwrap();
	let patched =
		engine.patch_document("", "users/alice", doc(json!({ "age": 1 })), &pred).await.unwrap();
	assert_eq!(patched.get("_version"), Some(&json!(2)));
}

#[tokio::test]
async fn test_patch_rejects_id_change() {
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice" }))).await.unwrap();
	let err = engine
		.patch_document("", "users/alice", doc(json!({ "id": "bob", "x": 1 })), &Vec::new())
		.await
		.unwrap_err();
	assert!(matches!(err, Error::InvalidArgument(_)));
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice" }))).await.unwrap();
	engine.delete_document("", "users/alice", &Vec::new()).await.unwrap();

	let err = engine.get_document("", "users/alice").await.unwrap_err();
	assert!(matches!(err, Error::NotFound));

	let err = engine.delete_document("", "users/alice", &Vec::new()).await.unwrap_err();
	assert!(matches!(err, Error::NotFound));
}

#[tokio::test]
async fn test_execute_query() {
	let engine = engine();
	engine
		.create_document("", "users", doc(json!({ "id": "alice", "age": 30 })))
		.await
		.unwrap();
	engine.create_document("", "users", doc(json!({ "id": "bob", "age": 10 }))).await.unwrap();

	let q: Query = serde_json::from_value(json!({
		"collection": "users",
		"filters": [{ "field": "age", "op": ">", "value": 18 }],
		"limit": 10,
	}))
	.unwrap();
	let docs = engine.execute_query("", &q).await.unwrap();
	assert_eq!(docs.len(), 1);
	assert_eq!(docs[0].get("id"), Some(&json!("alice")));
}

#[tokio::test]
async fn test_tenants_are_isolated() {
	let engine = engine();
	engine.create_document("acme", "users", doc(json!({ "id": "alice" }))).await.unwrap();

	assert!(engine.get_document("", "users/alice").await.is_err());
	engine.get_document("acme", "users/alice").await.unwrap();
}

#[tokio::test]
async fn test_run_transaction_commits_all() {
	let engine = engine();
	let writes: Vec<WriteOp> = serde_json::from_value(json!([
		{ "type": "create", "path": "users/alice", "data": { "n": 1 } },
		{ "type": "patch", "path": "users/alice", "data": { "m": 2 } },
		{ "type": "create", "path": "users/bob", "data": {} },
	]))
	.unwrap();
	engine.run_transaction("", &writes).await.unwrap();

	// patch merges: both keys survive
	let alice = engine.get_document("", "users/alice").await.unwrap();
	assert_eq!(alice.get("n"), Some(&json!(1)));
	assert_eq!(alice.get("m"), Some(&json!(2)));
	engine.get_document("", "users/bob").await.unwrap();
}

#[tokio::test]
async fn test_run_transaction_update_replaces_wholesale() {
	let engine = engine();
	engine
		.create_document("", "users", doc(json!({ "id": "alice", "n": 1, "m": 2 })))
		.await
		.unwrap();

	let writes: Vec<WriteOp> = serde_json::from_value(json!([
		{ "type": "update", "path": "users/alice", "data": { "k": 3 } },
	]))
	.unwrap();
	engine.run_transaction("", &writes).await.unwrap();

	// update swaps the whole document: earlier keys are gone
	let alice = engine.get_document("", "users/alice").await.unwrap();
	assert_eq!(alice.get("k"), Some(&json!(3)));
	assert!(alice.get("n").is_none());
	assert!(alice.get("m").is_none());

	// "replace" is accepted as an alias with the same semantics
	let writes: Vec<WriteOp> = serde_json::from_value(json!([
		{ "type": "replace", "path": "users/alice", "data": { "r": 4 } },
	]))
	.unwrap();
	engine.run_transaction("", &writes).await.unwrap();
	let alice = engine.get_document("", "users/alice").await.unwrap();
	assert_eq!(alice.get("r"), Some(&json!(4)));
	assert!(alice.get("k").is_none());
}

#[tokio::test]
async fn test_run_transaction_rolls_back_on_error() {
	let engine = engine();
	engine.create_document("", "users", doc(json!({ "id": "alice" }))).await.unwrap();

	let writes: Vec<WriteOp> = serde_json::from_value(json!([
		{ "type": "create", "path": "users/bob", "data": {} },
		{ "type": "create", "path": "users/alice", "data": {} },
	]))
	.unwrap();
	let err = engine.run_transaction("", &writes).await.unwrap_err();
	assert!(matches!(err, Error::Exists));

	// The first op must not have leaked
	assert!(engine.get_document("", "users/bob").await.is_err());
}

// vim: ts=4
