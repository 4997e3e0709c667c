//! Single-document operations and query evaluation over a tenant map.
//!
//! These run under the adapter's write lock (or against a transaction's
//! scratch copy), so every function is synchronous and side-effect free
//! apart from the map it is handed.

use serde_json::{Map, Value};
use std::cmp::Ordering;

use pathdb_types::document::{validate_document_path, StoredDocument};
use pathdb_types::filter::{compare_values, lookup_path, CompiledFilter, Filters, Query};
use pathdb_types::prelude::*;

use crate::TenantMap;

/// Check a CAS predicate against the current record. An empty predicate
/// always passes.
fn check_predicate(doc: &StoredDocument, pred: &Filters) -> DbResult<()> {
	if pred.is_empty() {
		return Ok(());
	}
	let compiled = CompiledFilter::compile(pred)?;
	if compiled.matches(&doc.filter_view()) {
		Ok(())
	} else {
		Err(Error::PreconditionFailed)
	}
}

/// Monotonic update timestamp: never before the previous one.
fn next_updated_at(prev: Timestamp) -> Timestamp {
	Timestamp(Timestamp::now().0.max(prev.0))
}

pub fn do_create(
	map: &mut TenantMap,
	fullpath: &str,
	data: Map<String, Value>,
) -> DbResult<StoredDocument> {
	validate_document_path(fullpath)?;
	let doc = match map.get(fullpath) {
		Some(existing) if !existing.deleted => return Err(Error::Exists),
		Some(tombstone) => {
			// Resurrection: the version counter continues past the tombstone
			let mut doc = StoredDocument::new(fullpath, data)?;
			doc.version = tombstone.version + 1;
			doc.updated_at = next_updated_at(tombstone.updated_at);
			doc
		}
		None => StoredDocument::new(fullpath, data)?,
	};
	map.insert(fullpath.into(), doc.clone());
	Ok(doc)
}

pub fn do_update(
	map: &mut TenantMap,
	path: &str,
	data: Map<String, Value>,
	pred: &Filters,
) -> DbResult<(StoredDocument, StoredDocument)> {
	validate_document_path(path)?;
	let current = map.get(path).filter(|doc| !doc.deleted).ok_or(Error::NotFound)?;
	check_predicate(current, pred)?;
	let before = current.clone();
	let mut doc = before.clone();
	doc.data = data;
	doc.version += 1;
	doc.updated_at = next_updated_at(before.updated_at);
	map.insert(path.into(), doc.clone());
	Ok((doc, before))
}

pub fn do_patch(
	map: &mut TenantMap,
	path: &str,
	data: Map<String, Value>,
	pred: &Filters,
) -> DbResult<(StoredDocument, StoredDocument)> {
	validate_document_path(path)?;
	let current = map.get(path).filter(|doc| !doc.deleted).ok_or(Error::NotFound)?;
	check_predicate(current, pred)?;
	let before = current.clone();
	let mut doc = before.clone();
	for (key, value) in data {
		doc.data.insert(key, value);
	}
	doc.version += 1;
	doc.updated_at = next_updated_at(before.updated_at);
	map.insert(path.into(), doc.clone());
	Ok((doc, before))
}

pub fn do_delete(
	map: &mut TenantMap,
	path: &str,
	pred: &Filters,
) -> DbResult<(StoredDocument, StoredDocument)> {
	validate_document_path(path)?;
	let current = map.get(path).filter(|doc| !doc.deleted).ok_or(Error::NotFound)?;
	check_predicate(current, pred)?;
	let before = current.clone();
	let mut tombstone = before.clone();
	tombstone.deleted = true;
	tombstone.version += 1;
	tombstone.updated_at = next_updated_at(before.updated_at);
	map.insert(path.into(), tombstone.clone());
	Ok((tombstone, before))
}

/// Order documents by the query's sort list, with `fullpath` as the stable
/// tiebreaker.
fn order_documents(docs: &mut [StoredDocument], q: &Query) {
	docs.sort_by(|a, b| {
		for order in &q.order_by {
			let av = a.filter_view();
			let bv = b.filter_view();
			let left = lookup_path(&av, &order.field);
			let right = lookup_path(&bv, &order.field);
			let ord = match (left, right) {
				(None, None) => Ordering::Equal,
				(None, Some(_)) => Ordering::Less,
				(Some(_), None) => Ordering::Greater,
				(Some(l), Some(r)) => compare_values(l, r).unwrap_or(Ordering::Equal),
			};
			let ord = if order.direction == "desc" { ord.reverse() } else { ord };
			if ord != Ordering::Equal {
				return ord;
			}
		}
		a.fullpath.cmp(&b.fullpath)
	});
}

pub fn run_query(map: &TenantMap, q: &Query) -> DbResult<Vec<StoredDocument>> {
	for order in &q.order_by {
		if order.direction != "asc" && order.direction != "desc" {
			return Err(Error::InvalidQuery(format!("invalid direction {:?}", order.direction)));
		}
	}
	let compiled = CompiledFilter::compile(&q.filters)?;
	let limit = q.effective_limit()?;

	let mut matched: Vec<StoredDocument> = map
		.values()
		.filter(|doc| q.collection.is_empty() || doc.collection.as_ref() == q.collection)
		.filter(|doc| q.show_deleted || !doc.deleted)
		.filter(|doc| compiled.is_empty() || compiled.matches(&doc.filter_view()))
		.cloned()
		.collect();

	order_documents(&mut matched, q);

	if !q.start_after.is_empty() {
		if let Some(pos) = matched.iter().position(|d| d.fullpath.as_ref() == q.start_after) {
			matched.drain(..=pos);
		} else if q.order_by.is_empty() {
			// Cursor document vanished; fall back to the path range bound
			matched.retain(|d| d.fullpath.as_ref() > q.start_after.as_str());
		}
	}

	matched.truncate(limit);
	Ok(matched)
}

// vim: ts=4
