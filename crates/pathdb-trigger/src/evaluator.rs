//! Trigger rule matching against change events.

use pathdb_types::store_adapter::ChangeEvent;
use pathdb_types::types::tenant_or_default;

use crate::loader::CompiledRule;
use crate::types::condition_scope;

/// Collection glob: exact name or a trailing-`*` prefix match.
pub fn collection_glob_matches(pattern: &str, collection: &str) -> bool {
	match pattern.strip_suffix('*') {
		Some(prefix) => collection.starts_with(prefix),
		None => pattern == collection,
	}
}

/// Does this rule fire for this event?
///
/// The event kind must be enabled, the tenant must match (an unset rule
/// tenant matches the default tenant), the collection must satisfy the glob
/// and the compiled condition must hold over `{doc, before, event}`.
pub fn rule_matches(compiled: &CompiledRule, event: &ChangeEvent) -> bool {
	let rule = &compiled.rule;

	if !rule.events.iter().any(|kind| kind == event.kind.as_str()) {
		return false;
	}
	if tenant_or_default(&rule.tenant) != tenant_or_default(&event.tenant) {
		return false;
	}
	if !collection_glob_matches(&rule.collection, &event.collection) {
		return false;
	}
	if compiled.condition.is_empty() {
		return true;
	}

	let scope = condition_scope(
		event.document.as_ref().map(|doc| doc.flatten()),
		event.before.as_ref().map(|doc| doc.flatten()),
		event.kind.as_str(),
	);
	compiled.condition.matches(&scope)
}

// vim: ts=4
