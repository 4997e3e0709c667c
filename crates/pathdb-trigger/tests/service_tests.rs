//! Trigger service tests: backend writes flow through the watch stream and
//! land in the work queue as delivery tasks.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use pathdb_engine::{Engine, RoutedStore, SingleRouter};
use pathdb_store_adapter_memory::{AdapterConfig, StoreAdapterMemory};
use pathdb_trigger::queue::{DeliveryQueue, QueueConfig, WorkQueue};
use pathdb_trigger::{DeliveryTask, RuleStore, TriggerService, TriggerRule};
use pathdb_types::store_adapter::StoreAdapter;

fn rule(value: serde_json::Value) -> TriggerRule {
	serde_json::from_value(value).unwrap()
}

struct Fixture {
	engine: Arc<Engine>,
	queue: Arc<WorkQueue>,
	cancel: CancellationToken,
}

fn fixture(rules: Vec<TriggerRule>) -> Fixture {
	let backend: Arc<dyn StoreAdapter> = StoreAdapterMemory::new(AdapterConfig::default());
	let engine = Engine::new(RoutedStore::new(SingleRouter::new(backend)));
	let store = RuleStore::new();
	store.replace(rules).unwrap();
	let queue = WorkQueue::new(QueueConfig::default()).unwrap();
	let service = TriggerService::new(engine.clone(), store, queue.clone());
	let cancel = CancellationToken::new();
	tokio::spawn(service.run(cancel.clone()));
	Fixture { engine, queue, cancel }
}

async fn pull_task(queue: &WorkQueue) -> DeliveryTask {
	let cancel = CancellationToken::new();
	let delivery = tokio::time::timeout(Duration::from_secs(2), queue.next(&cancel))
		.await
		.expect("no delivery task published")
		.unwrap()
		.unwrap();
	serde_json::from_slice(&delivery.payload).unwrap()
}

#[tokio::test]
async fn test_matching_write_publishes_task() {
	let fx = fixture(vec![rule(json!({
		"triggerId": "t1",
		"collection": "users",
		"events": ["create"],
		"url": "http://example.invalid/hook",
		"headers": { "X-Source": "test" },
	}))]);
	tokio::time::sleep(Duration::from_millis(50)).await;

	fx.engine
		.create_document("", "users", json!({ "id": "bob" }).as_object().unwrap().clone())
		.await
		.unwrap();

	let task = pull_task(&fx.queue).await;
	assert_eq!(task.trigger_id, "t1");
	assert_eq!(task.event, "create");
	assert_eq!(task.doc_key, "users/bob");
	assert_eq!(task.collection, "users");
	assert_eq!(task.url, "http://example.invalid/hook");
	assert_eq!(task.headers.get("X-Source").map(String::as_str), Some("test"));
	assert_eq!(task.after.as_ref().and_then(|d| d.get("id")), Some(&json!("bob")));

	fx.cancel.cancel();
}

#[tokio::test]
async fn test_non_matching_events_publish_nothing() {
	let fx = fixture(vec![rule(json!({
		"triggerId": "t1",
		"collection": "users",
		"events": ["delete"],
		"url": "http://example.invalid/hook",
	}))]);
	tokio::time::sleep(Duration::from_millis(50)).await;

	fx.engine
		.create_document("", "users", json!({ "id": "bob" }).as_object().unwrap().clone())
		.await
		.unwrap();
	fx.engine
		.create_document("", "posts", json!({ "id": "p1" }).as_object().unwrap().clone())
		.await
		.unwrap();

	tokio::time::sleep(Duration::from_millis(100)).await;
	assert_eq!(fx.queue.pending("triggers."), 0);

	fx.cancel.cancel();
}

#[tokio::test]
async fn test_condition_and_include_before() {
	let fx = fixture(vec![rule(json!({
		"triggerId": "t1",
		"collection": "users",
		"events": ["update"],
		"condition": [{ "field": "doc.age", "op": ">", "value": 18 }],
		"includeBefore": true,
		"url": "http://example.invalid/hook",
	}))]);
	tokio::time::sleep(Duration::from_millis(50)).await;

	fx.engine
		.create_document("", "users", json!({ "id": "bob", "age": 17 }).as_object().unwrap().clone())
		.await
		.unwrap();
	// Update below the threshold: no task
	fx.engine
		.patch_document("", "users/bob", json!({ "age": 18 }).as_object().unwrap().clone(), &Vec::new())
		.await
		.unwrap();
	// Crosses the threshold: one task, with the previous state attached
	fx.engine
		.patch_document("", "users/bob", json!({ "age": 19 }).as_object().unwrap().clone(), &Vec::new())
		.await
		.unwrap();

	let task = pull_task(&fx.queue).await;
	assert_eq!(task.event, "update");
	assert_eq!(task.after.as_ref().and_then(|d| d.get("age")), Some(&json!(19)));
	assert_eq!(task.before.as_ref().and_then(|d| d.get("age")), Some(&json!(18)));

	fx.cancel.cancel();
}

#[tokio::test]
async fn test_subject_partitions_by_document() {
	let fx = fixture(vec![rule(json!({
		"triggerId": "t1",
		"collection": "users",
		"events": ["create"],
		"url": "http://example.invalid/hook",
	}))]);
	tokio::time::sleep(Duration::from_millis(50)).await;

	fx.engine
		.create_document("", "users", json!({ "id": "a" }).as_object().unwrap().clone())
		.await
		.unwrap();

	let cancel = CancellationToken::new();
	let delivery = tokio::time::timeout(Duration::from_secs(2), fx.queue.next(&cancel))
		.await
		.unwrap()
		.unwrap()
		.unwrap();
	assert_eq!(delivery.subject.as_ref(), "triggers.default.users.users/a");

	fx.cancel.cancel();
}

// vim: ts=4
