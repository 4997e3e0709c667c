//! Tests for path handling and the document model.

use serde_json::{json, Value};

use pathdb_types::document::*;

#[test]
fn test_validate_path() {
	assert!(validate_path("users").is_ok());
	assert!(validate_path("users/alice").is_ok());
	assert!(validate_path("users/alice/posts/42").is_ok());
	assert!(validate_path("a_b-c.d/e").is_ok());

	assert!(validate_path("").is_err());
	assert!(validate_path("/users").is_err());
	assert!(validate_path("users/").is_err());
	assert!(validate_path("users//alice").is_err());
	assert!(validate_path("users/al ice").is_err());
	assert!(validate_path("users/al!ce").is_err());
}

#[test]
fn test_path_parity() {
	// Even segment count addresses a document, odd a collection
	assert!(is_document_path("users/alice"));
	assert!(is_document_path("users/alice/posts/42"));
	assert!(!is_document_path("users"));
	assert!(!is_document_path("users/alice/posts"));

	assert!(is_collection_path("users"));
	assert!(is_collection_path("users/alice/posts"));
	assert!(!is_collection_path("users/alice"));
}

#[test]
fn test_split_document_path() {
	let (collection, id) = split_document_path("users/alice").unwrap();
	assert_eq!(collection, "users");
	assert_eq!(id, "alice");

	let (collection, id) = split_document_path("users/alice/posts/42").unwrap();
	assert_eq!(collection, "users/alice/posts");
	assert_eq!(id, "42");

	assert!(split_document_path("users").is_err());
}

#[test]
fn test_parent_of() {
	assert_eq!(parent_of("users"), "");
	assert_eq!(parent_of("users/alice/posts"), "users/alice");
}

#[test]
fn test_calculate_id() {
	let id = calculate_id("users/alice");
	// 128-bit digest, hex encoded
	assert_eq!(id.len(), 32);
	assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

	// Stable and collision-free for distinct paths
	assert_eq!(id, calculate_id("users/alice"));
	assert_ne!(id, calculate_id("users/bob"));
}

#[test]
fn test_new_document_metadata() {
	let data = json!({ "name": "Alice" });
	let doc = StoredDocument::new("users/alice", data.as_object().unwrap().clone()).unwrap();

	assert_eq!(doc.fullpath.as_ref(), "users/alice");
	assert_eq!(doc.collection.as_ref(), "users");
	assert_eq!(doc.parent.as_ref(), "");
	assert_eq!(doc.id.as_ref(), calculate_id("users/alice"));
	assert_eq!(doc.version, 1);
	assert!(!doc.deleted);
	assert!(doc.updated_at >= doc.created_at);
	assert_eq!(doc.doc_id(), "alice");
}

#[test]
fn test_flatten() {
	let data = json!({ "name": "Alice", "age": 30 });
	let mut doc = StoredDocument::new("users/alice", data.as_object().unwrap().clone()).unwrap();
	doc.version = 3;

	let flat = doc.flatten();
	assert_eq!(flat.get("name"), Some(&json!("Alice")));
	assert_eq!(flat.get("age"), Some(&json!(30)));
	assert_eq!(flat.get("id"), Some(&json!("alice")));
	assert_eq!(flat.get("_version"), Some(&json!(3)));
	assert!(flat.contains_key("_updated_at"));
	assert!(flat.contains_key("_created_at"));
	assert!(!flat.contains_key("deleted"));

	doc.deleted = true;
	let flat = doc.flatten();
	assert_eq!(flat.get("deleted"), Some(&json!(true)));
}

#[test]
fn test_strip_reserved() {
	let body = json!({ "name": "Alice", "_version": 9, "_updated_at": 1, "_created_at": 2 });
	let stripped = strip_reserved(body.as_object().unwrap().clone());
	assert_eq!(stripped.len(), 1);
	assert_eq!(stripped.get("name"), Some(&json!("Alice")));
}

#[test]
fn test_coerce_id() {
	assert_eq!(coerce_id(&json!("alice")).unwrap(), "alice");
	assert_eq!(coerce_id(&json!(42)).unwrap(), "42");
	assert!(coerce_id(&Value::Bool(true)).is_err());
	assert!(coerce_id(&json!({ "x": 1 })).is_err());
}

#[test]
fn test_collection_matches() {
	assert!(collection_matches("users", ""));
	assert!(collection_matches("users", "users"));
	assert!(collection_matches("users/alice/posts", "users"));
	assert!(collection_matches("users/alice/posts", "users/alice/posts"));

	// Boundary-aware: "users2" is not inside "users"
	assert!(!collection_matches("users2", "users"));
	assert!(!collection_matches("users", "users/alice/posts"));
}

// vim: ts=4
