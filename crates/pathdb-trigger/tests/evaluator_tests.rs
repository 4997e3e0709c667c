//! Trigger rule matching and retry policy tests.

use serde_json::json;
use std::time::Duration;

use pathdb_trigger::loader::{CompiledRule, RuleStore};
use pathdb_trigger::types::{dlq_subject, task_subject, RetryPolicy, TriggerRule};
use pathdb_trigger::evaluator::{collection_glob_matches, rule_matches};
use pathdb_types::document::StoredDocument;
use pathdb_types::store_adapter::{ChangeEvent, EventKind};
use pathdb_types::types::Timestamp;

fn rule(value: serde_json::Value) -> TriggerRule {
	serde_json::from_value(value).unwrap()
}

fn compiled(value: serde_json::Value) -> CompiledRule {
	let store = RuleStore::new();
	store.replace(vec![rule(value)]).unwrap();
	store.snapshot().rules[0].clone()
}

fn event(kind: EventKind, path: &str, data: serde_json::Value) -> ChangeEvent {
	let doc = StoredDocument::new(path, data.as_object().unwrap().clone()).unwrap();
	ChangeEvent {
		tenant: "default".into(),
		kind,
		path: path.into(),
		collection: doc.collection.clone(),
		document: if kind == EventKind::Delete { None } else { Some(doc) },
		before: None,
		timestamp: Timestamp::now(),
		resume_token: Some(1),
	}
}

#[test]
fn test_collection_glob() {
	assert!(collection_glob_matches("users", "users"));
	assert!(!collection_glob_matches("users", "users/alice/posts"));
	assert!(collection_glob_matches("users*", "users"));
	assert!(collection_glob_matches("users*", "users/alice/posts"));
	assert!(collection_glob_matches("*", "anything"));
	assert!(!collection_glob_matches("users", "posts"));
}

#[test]
fn test_event_kind_gating() {
	let compiled = compiled(json!({
		"triggerId": "t1",
		"collection": "users",
		"events": ["create"],
		"url": "http://example.invalid/hook",
	}));

	assert!(rule_matches(&compiled, &event(EventKind::Create, "users/alice", json!({}))));
	assert!(!rule_matches(&compiled, &event(EventKind::Update, "users/alice", json!({}))));
	assert!(!rule_matches(&compiled, &event(EventKind::Delete, "users/alice", json!({}))));
}

#[test]
fn test_tenant_gating() {
	let compiled = compiled(json!({
		"triggerId": "t1",
		"tenant": "acme",
		"collection": "users",
		"events": ["create"],
		"url": "http://example.invalid/hook",
	}));

	let mut evt = event(EventKind::Create, "users/alice", json!({}));
	assert!(!rule_matches(&compiled, &evt));
	evt.tenant = "acme".into();
	assert!(rule_matches(&compiled, &evt));
}

#[test]
fn test_condition_over_doc_and_event() {
	let compiled = compiled(json!({
		"triggerId": "t1",
		"collection": "users",
		"events": ["create", "update"],
		"condition": [
			{ "field": "doc.age", "op": ">", "value": 18 },
			{ "field": "event", "op": "==", "value": "create" },
		],
		"url": "http://example.invalid/hook",
	}));

	assert!(rule_matches(&compiled, &event(EventKind::Create, "users/a", json!({ "age": 30 }))));
	assert!(!rule_matches(&compiled, &event(EventKind::Create, "users/a", json!({ "age": 10 }))));
	assert!(!rule_matches(&compiled, &event(EventKind::Update, "users/a", json!({ "age": 30 }))));
}

#[test]
fn test_condition_matches_float_against_int_literal() {
	let compiled = compiled(json!({
		"triggerId": "t1",
		"collection": "users",
		"events": ["create"],
		"condition": [{ "field": "doc.age", "op": ">", "value": 20 }],
		"url": "http://example.invalid/hook",
	}));
	assert!(rule_matches(&compiled, &event(EventKind::Create, "users/a", json!({ "age": 25.0 }))));
}

#[test]
fn test_loader_rejects_bad_rules() {
	let store = RuleStore::new();
	assert!(store
		.replace(vec![rule(json!({
			"triggerId": "",
			"collection": "users",
			"events": ["create"],
			"url": "http://x",
		}))])
		.is_err());
	assert!(store
		.replace(vec![rule(json!({
			"triggerId": "t1",
			"collection": "users",
			"events": ["boom"],
			"url": "http://x",
		}))])
		.is_err());
	assert!(store
		.replace(vec![rule(json!({
			"triggerId": "t1",
			"collection": "users",
			"events": [],
			"url": "http://x",
		}))])
		.is_err());
}

#[test]
fn test_rule_store_swap_is_atomic_snapshot() {
	let store = RuleStore::new();
	let snapshot_before = store.snapshot();
	store
		.replace(vec![rule(json!({
			"triggerId": "t1",
			"collection": "users",
			"events": ["create"],
			"url": "http://x",
		}))])
		.unwrap();

	// The old snapshot is unchanged, the new one sees the rule
	assert!(snapshot_before.rules.is_empty());
	assert_eq!(store.snapshot().rules.len(), 1);
}

#[test]
fn test_backoff_formula() {
	let policy = RetryPolicy { max_attempts: 5, initial_backoff_ms: 100, max_backoff_ms: 1000 };
	assert_eq!(policy.backoff(1), Duration::from_millis(100));
	assert_eq!(policy.backoff(2), Duration::from_millis(200));
	assert_eq!(policy.backoff(3), Duration::from_millis(400));
	assert_eq!(policy.backoff(4), Duration::from_millis(800));
	// Capped
	assert_eq!(policy.backoff(5), Duration::from_millis(1000));
	assert_eq!(policy.backoff(20), Duration::from_millis(1000));
}

#[test]
fn test_subjects() {
	assert_eq!(task_subject("acme", "users", "users/alice"), "triggers.acme.users.users/alice");
	assert_eq!(dlq_subject("t1"), "triggers.dlq.t1");
}

#[test]
fn test_rules_yaml_round_trip() {
	let yaml = r#"
- triggerId: t1
  tenant: acme
  collection: "users*"
  events: [create, delete]
  condition:
    - field: doc.age
      op: ">"
      value: 18
  url: http://example.invalid/hook
  headers:
    X-Custom: yes-please
  retryPolicy:
    maxAttempts: 3
    initialBackoffMs: 500
    maxBackoffMs: 5000
  includeBefore: true
"#;
	let rules: Vec<TriggerRule> = serde_yaml::from_str(yaml).unwrap();
	assert_eq!(rules.len(), 1);
	let rule = &rules[0];
	assert_eq!(rule.id, "t1");
	assert_eq!(rule.events, vec!["create", "delete"]);
	assert_eq!(rule.condition.len(), 1);
	assert_eq!(rule.retry_policy.max_attempts, 3);
	assert!(rule.include_before);

	let store = RuleStore::new();
	assert_eq!(store.replace(rules).unwrap(), 1);
}

// vim: ts=4
