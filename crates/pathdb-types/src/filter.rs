//! Query model and filter expression compiler.
//!
//! A filter list compiles into a predicate over a JSON document value. The
//! same compiled form drives query evaluation, CAS predicates, change-stream
//! subscriptions and trigger conditions.
//!
//! Comparison is numeric when both sides are numbers (integer and float
//! representations compare by numeric value), lexicographic for strings, and
//! undefined otherwise (the filter evaluates false).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::prelude::*;

/// Queries with `limit == 0` use this page size.
pub const DEFAULT_LIMIT: u32 = 100;

/// Hard cap on query page size.
pub const MAX_LIMIT: u32 = 1000;

/// A single query filter: `field op value`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Filter {
	pub field: String,
	pub op: String,
	pub value: Value,
}

pub type Filters = Vec<Filter>;

/// A sort order entry.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Order {
	pub field: String,
	/// "asc" or "desc"
	pub direction: String,
}

/// A database query.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Query {
	pub collection: String,

	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub filters: Filters,

	#[serde(default, rename = "orderBy", skip_serializing_if = "Vec::is_empty")]
	pub order_by: Vec<Order>,

	#[serde(default)]
	pub limit: u32,

	/// Cursor: the `fullpath` of the last document of the previous page
	#[serde(default, rename = "startAfter", skip_serializing_if = "String::is_empty")]
	pub start_after: String,

	#[serde(default, rename = "showDeleted", skip_serializing_if = "std::ops::Not::not")]
	pub show_deleted: bool,
}

impl Query {
	pub fn collection(collection: impl Into<String>) -> Self {
		Self { collection: collection.into(), ..Default::default() }
	}

	pub fn with_filter(mut self, field: impl Into<String>, op: impl Into<String>, value: Value) -> Self {
		self.filters.push(Filter { field: field.into(), op: op.into(), value });
		self
	}

	pub fn with_limit(mut self, limit: u32) -> Self {
		self.limit = limit;
		self
	}

	/// Effective page size: 0 maps to the default, everything is capped.
	pub fn effective_limit(&self) -> DbResult<usize> {
		if self.limit > MAX_LIMIT {
			return Err(Error::InvalidQuery(format!("limit {} exceeds {}", self.limit, MAX_LIMIT)));
		}
		Ok(if self.limit == 0 { DEFAULT_LIMIT as usize } else { self.limit as usize })
	}
}

/// Supported filter operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
	Eq,
	Gt,
	Ge,
	Lt,
	Le,
	In,
	ArrayContains,
}

impl FilterOp {
	pub fn parse(op: &str) -> DbResult<Self> {
		match op {
			"==" => Ok(FilterOp::Eq),
			">" => Ok(FilterOp::Gt),
			">=" => Ok(FilterOp::Ge),
			"<" => Ok(FilterOp::Lt),
			"<=" => Ok(FilterOp::Le),
			"in" => Ok(FilterOp::In),
			"array-contains" => Ok(FilterOp::ArrayContains),
			other => Err(Error::InvalidQuery(format!("unknown operator: {:?}", other))),
		}
	}
}

#[derive(Clone, Debug)]
struct Clause {
	field: String,
	op: FilterOp,
	value: Value,
}

/// A filter list compiled into a predicate. Clauses are AND-ed.
#[derive(Clone, Debug, Default)]
pub struct CompiledFilter {
	clauses: Vec<Clause>,
}

impl CompiledFilter {
	/// Compile a filter list. Unknown operators and list-typed `in` misuse
	/// fail with `InvalidQuery`.
	pub fn compile(filters: &Filters) -> DbResult<Self> {
		let mut clauses = Vec::with_capacity(filters.len());
		for f in filters {
			let op = FilterOp::parse(&f.op)?;
			if op == FilterOp::In && !f.value.is_array() {
				return Err(Error::InvalidQuery(format!(
					"'in' operator requires a list value for field {:?}",
					f.field
				)));
			}
			if f.field.is_empty() {
				return Err(Error::InvalidQuery("empty filter field".into()));
			}
			clauses.push(Clause { field: f.field.clone(), op, value: f.value.clone() });
		}
		Ok(Self { clauses })
	}

	pub fn is_empty(&self) -> bool {
		self.clauses.is_empty()
	}

	/// Evaluate the predicate against a document value.
	pub fn matches(&self, doc: &Value) -> bool {
		self.clauses.iter().all(|clause| {
			let actual = lookup_path(doc, &clause.field);
			match clause.op {
				FilterOp::Eq => actual.is_some_and(|a| values_equal(a, &clause.value)),
				FilterOp::Gt => {
					actual.is_some_and(|a| compare_values(a, &clause.value) == Some(Ordering::Greater))
				}
				FilterOp::Ge => actual.is_some_and(|a| {
					matches!(
						compare_values(a, &clause.value),
						Some(Ordering::Greater) | Some(Ordering::Equal)
					)
				}),
				FilterOp::Lt => {
					actual.is_some_and(|a| compare_values(a, &clause.value) == Some(Ordering::Less))
				}
				FilterOp::Le => actual.is_some_and(|a| {
					matches!(
						compare_values(a, &clause.value),
						Some(Ordering::Less) | Some(Ordering::Equal)
					)
				}),
				FilterOp::In => match (&clause.value, actual) {
					(Value::Array(allowed), Some(a)) => allowed.iter().any(|v| values_equal(a, v)),
					_ => false,
				},
				FilterOp::ArrayContains => match actual {
					Some(Value::Array(arr)) => arr.iter().any(|v| values_equal(v, &clause.value)),
					_ => false,
				},
			}
		})
	}
}

/// Look up a dotted field path in a JSON value (`user.address.city`).
pub fn lookup_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
	// Exact top-level key wins over a dotted traversal
	if let Some(v) = doc.get(path) {
		return Some(v);
	}
	let mut current = doc;
	for part in path.split('.') {
		current = current.get(part)?;
	}
	Some(current)
}

/// Numeric-aware equality: integer and float representations of the same
/// value are equal; everything else falls back to structural equality.
pub fn values_equal(a: &Value, b: &Value) -> bool {
	match (a, b) {
		(Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
			(Some(x), Some(y)) => x == y,
			_ => a == b,
		},
		_ => a == b,
	}
}

/// Ordering comparison. Numbers compare numerically, strings
/// lexicographically, booleans false < true. Mixed or unordered types have
/// no defined ordering.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
	match (a, b) {
		(Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
		(Value::String(a), Value::String(b)) => Some(a.cmp(b)),
		(Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
		_ => None,
	}
}

/// Build the standard CAS predicate `version == n`.
pub fn version_predicate(version: i64) -> Filters {
	vec![Filter { field: "version".into(), op: "==".into(), value: Value::Number(version.into()) }]
}

// vim: ts=4
