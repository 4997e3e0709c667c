//! Trigger rule loading and atomic snapshot publication.
//!
//! Rules come from a YAML file at startup and are swapped wholesale on
//! admin push. Readers clone an `Arc` snapshot and never block writers.

use std::path::Path;
use std::sync::{Arc, RwLock};

use pathdb_types::filter::CompiledFilter;

use crate::prelude::*;
use crate::types::TriggerRule;

pub const EVENT_KINDS: [&str; 3] = ["create", "update", "delete"];

/// A rule with its condition compiled.
#[derive(Clone, Debug)]
pub struct CompiledRule {
	pub rule: Arc<TriggerRule>,
	pub condition: CompiledFilter,
}

/// Immutable published snapshot.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
	pub rules: Vec<CompiledRule>,
}

#[derive(Debug)]
pub struct RuleStore {
	inner: RwLock<Arc<RuleSet>>,
}

impl RuleStore {
	pub fn new() -> Arc<Self> {
		Arc::new(Self { inner: RwLock::new(Arc::new(RuleSet::default())) })
	}

	/// Current snapshot.
	pub fn snapshot(&self) -> Arc<RuleSet> {
		self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
	}

	/// Validate, compile and atomically publish a new rule set.
	pub fn replace(&self, rules: Vec<TriggerRule>) -> DbResult<usize> {
		let compiled = compile_rules(rules)?;
		let count = compiled.rules.len();
		let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
		*guard = Arc::new(compiled);
		info!("trigger rules swapped, {} active", count);
		Ok(count)
	}

	/// Load rules from a YAML file and publish them.
	pub fn load_file(&self, path: &Path) -> DbResult<usize> {
		let raw = std::fs::read_to_string(path)?;
		let rules: Vec<TriggerRule> = serde_yaml::from_str(&raw)
			.map_err(|err| Error::ConfigError(format!("bad trigger rules file: {}", err)))?;
		self.replace(rules)
	}
}

fn compile_rules(rules: Vec<TriggerRule>) -> DbResult<RuleSet> {
	let mut compiled = Vec::with_capacity(rules.len());
	for rule in rules {
		if rule.id.is_empty() {
			return Err(Error::ConfigError("trigger rule without id".into()));
		}
		if rule.url.is_empty() {
			return Err(Error::ConfigError(format!("trigger {:?} without url", rule.id)));
		}
		if rule.events.is_empty() {
			return Err(Error::ConfigError(format!("trigger {:?} without events", rule.id)));
		}
		for event in &rule.events {
			if !EVENT_KINDS.contains(&event.as_str()) {
				return Err(Error::ConfigError(format!(
					"trigger {:?} has unknown event kind {:?}",
					rule.id, event
				)));
			}
		}
		let condition = CompiledFilter::compile(&rule.condition)
			.map_err(|err| Error::ConfigError(format!("trigger {:?}: {}", rule.id, err)))?;
		compiled.push(CompiledRule { rule: Arc::new(rule), condition });
	}
	Ok(RuleSet { rules: compiled })
}

// vim: ts=4
