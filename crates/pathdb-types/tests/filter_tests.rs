//! Tests for the filter expression compiler.

use serde_json::json;
use std::cmp::Ordering;

use pathdb_types::filter::*;

fn compile(filters: serde_json::Value) -> CompiledFilter {
	let filters: Filters = serde_json::from_value(filters).unwrap();
	CompiledFilter::compile(&filters).unwrap()
}

#[test]
fn test_equality() {
	let predicate = compile(json!([{ "field": "name", "op": "==", "value": "Alice" }]));
	assert!(predicate.matches(&json!({ "name": "Alice" })));
	assert!(!predicate.matches(&json!({ "name": "Bob" })));
	assert!(!predicate.matches(&json!({})));
}

#[test]
fn test_numeric_comparisons() {
	let predicate = compile(json!([{ "field": "age", "op": ">", "value": 20 }]));
	assert!(predicate.matches(&json!({ "age": 25 })));
	assert!(!predicate.matches(&json!({ "age": 20 })));
	assert!(!predicate.matches(&json!({ "age": 15 })));

	let ge = compile(json!([{ "field": "age", "op": ">=", "value": 20 }]));
	assert!(ge.matches(&json!({ "age": 20 })));

	let lt = compile(json!([{ "field": "age", "op": "<", "value": 20 }]));
	assert!(lt.matches(&json!({ "age": 19 })));
	let le = compile(json!([{ "field": "age", "op": "<=", "value": 20 }]));
	assert!(le.matches(&json!({ "age": 20 })));
}

#[test]
fn test_mixed_int_float_comparison() {
	// An integer literal filter must match both integer and float
	// representations of the same value
	let predicate = compile(json!([{ "field": "age", "op": ">", "value": 20 }]));
	assert!(predicate.matches(&json!({ "age": 25 })));
	assert!(predicate.matches(&json!({ "age": 25.0 })));

	let eq = compile(json!([{ "field": "age", "op": "==", "value": 25 }]));
	assert!(eq.matches(&json!({ "age": 25.0 })));
	assert!(eq.matches(&json!({ "age": 25 })));
}

#[test]
fn test_string_comparison_is_lexicographic() {
	let predicate = compile(json!([{ "field": "name", "op": ">", "value": "b" }]));
	assert!(predicate.matches(&json!({ "name": "c" })));
	assert!(!predicate.matches(&json!({ "name": "a" })));
}

#[test]
fn test_type_mismatch_is_false() {
	// Ordering between a string and a number is undefined
	let predicate = compile(json!([{ "field": "age", "op": ">", "value": 20 }]));
	assert!(!predicate.matches(&json!({ "age": "25" })));
	assert!(!predicate.matches(&json!({ "age": null })));
}

#[test]
fn test_in_operator() {
	let predicate =
		compile(json!([{ "field": "role", "op": "in", "value": ["admin", "editor"] }]));
	assert!(predicate.matches(&json!({ "role": "admin" })));
	assert!(!predicate.matches(&json!({ "role": "viewer" })));

	// Numeric equality applies inside the list too
	let numbers = compile(json!([{ "field": "n", "op": "in", "value": [1, 2] }]));
	assert!(numbers.matches(&json!({ "n": 2.0 })));
}

#[test]
fn test_in_requires_list() {
	let filters: Filters =
		serde_json::from_value(json!([{ "field": "role", "op": "in", "value": "admin" }])).unwrap();
	assert!(matches!(CompiledFilter::compile(&filters), Err(pathdb_types::error::Error::InvalidQuery(_))));
}

#[test]
fn test_array_contains() {
	let predicate = compile(json!([{ "field": "tags", "op": "array-contains", "value": "rust" }]));
	assert!(predicate.matches(&json!({ "tags": ["go", "rust"] })));
	assert!(!predicate.matches(&json!({ "tags": ["go"] })));
	assert!(!predicate.matches(&json!({ "tags": "rust" })));
}

#[test]
fn test_conjunction() {
	let predicate = compile(json!([
		{ "field": "age", "op": ">", "value": 18 },
		{ "field": "name", "op": "==", "value": "Alice" },
	]));
	assert!(predicate.matches(&json!({ "age": 30, "name": "Alice" })));
	assert!(!predicate.matches(&json!({ "age": 30, "name": "Bob" })));
	assert!(!predicate.matches(&json!({ "age": 10, "name": "Alice" })));
}

#[test]
fn test_unknown_operator() {
	let filters: Filters =
		serde_json::from_value(json!([{ "field": "a", "op": "!=", "value": 1 }])).unwrap();
	assert!(matches!(CompiledFilter::compile(&filters), Err(pathdb_types::error::Error::InvalidQuery(_))));
}

#[test]
fn test_dotted_field_path() {
	let predicate =
		compile(json!([{ "field": "address.city", "op": "==", "value": "Berlin" }]));
	assert!(predicate.matches(&json!({ "address": { "city": "Berlin" } })));
	assert!(!predicate.matches(&json!({ "address": { "city": "Paris" } })));

	// A literal top-level key containing a dot wins over traversal
	let doc = json!({ "address.city": "Berlin" });
	assert!(predicate.matches(&doc));
}

#[test]
fn test_compare_values() {
	assert_eq!(compare_values(&json!(1), &json!(2)), Some(Ordering::Less));
	assert_eq!(compare_values(&json!(2.5), &json!(2)), Some(Ordering::Greater));
	assert_eq!(compare_values(&json!("a"), &json!("a")), Some(Ordering::Equal));
	assert_eq!(compare_values(&json!(1), &json!("1")), None);
}

#[test]
fn test_query_limits() {
	assert_eq!(Query::collection("users").effective_limit().unwrap(), DEFAULT_LIMIT as usize);
	assert_eq!(Query::collection("users").with_limit(10).effective_limit().unwrap(), 10);
	assert_eq!(
		Query::collection("users").with_limit(MAX_LIMIT).effective_limit().unwrap(),
		MAX_LIMIT as usize
	);
	assert!(Query::collection("users").with_limit(MAX_LIMIT + 1).effective_limit().is_err());
}

#[test]
fn test_query_wire_shape() {
	let query: Query = serde_json::from_value(json!({
		"collection": "users",
		"filters": [{ "field": "age", "op": ">", "value": 18 }],
		"orderBy": [{ "field": "age", "direction": "desc" }],
		"limit": 10,
		"startAfter": "users/alice",
		"showDeleted": true,
	}))
	.unwrap();
	assert_eq!(query.collection, "users");
	assert_eq!(query.filters.len(), 1);
	assert_eq!(query.order_by[0].direction, "desc");
	assert_eq!(query.limit, 10);
	assert_eq!(query.start_after, "users/alice");
	assert!(query.show_deleted);
}

// vim: ts=4
