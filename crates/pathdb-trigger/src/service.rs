//! Trigger service: drains the change stream, evaluates the rule snapshot
//! and publishes delivery tasks.

use futures::StreamExt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use pathdb_engine::Engine;
use pathdb_types::store_adapter::{ChangeEvent, ResumeToken, WatchOptions};
use pathdb_types::types::tenant_or_default;

use crate::evaluator::rule_matches;
use crate::loader::{CompiledRule, RuleStore};
use crate::prelude::*;
use crate::queue::DeliveryQueue;
use crate::types::DeliveryTask;

pub struct TriggerService {
	engine: Arc<Engine>,
	rules: Arc<RuleStore>,
	queue: Arc<dyn DeliveryQueue>,
	seq: AtomicI64,
}

impl TriggerService {
	pub fn new(
		engine: Arc<Engine>,
		rules: Arc<RuleStore>,
		queue: Arc<dyn DeliveryQueue>,
	) -> Arc<Self> {
		Arc::new(Self { engine, rules, queue, seq: AtomicI64::new(0) })
	}

	pub fn rules(&self) -> &Arc<RuleStore> {
		&self.rules
	}

	/// Evaluate one event against the current rule snapshot and publish a
	/// delivery task per match.
	pub async fn process_event(&self, event: &ChangeEvent) -> DbResult<()> {
		let snapshot = self.rules.snapshot();
		for compiled in &snapshot.rules {
			if !rule_matches(compiled, event) {
				continue;
			}
			let task = self.build_task(compiled, event);
			debug!("trigger {} matched {} {}", task.trigger_id, task.event, task.doc_key);
			self.queue.publish(&task.subject(), &task.to_bytes()).await?;
		}
		Ok(())
	}

	fn build_task(&self, compiled: &CompiledRule, event: &ChangeEvent) -> DeliveryTask {
		let rule = &compiled.rule;
		let before = if rule.include_before {
			event.before.as_ref().map(|doc| doc.flatten())
		} else {
			None
		};
		DeliveryTask {
			trigger_id: rule.id.clone(),
			tenant: tenant_or_default(&event.tenant).to_string(),
			event: event.kind.as_str().to_string(),
			collection: event.collection.to_string(),
			doc_key: event.path.to_string(),
			lsn: format!("0:{}", event.resume_token.unwrap_or(0)),
			seq: self.seq.fetch_add(1, Ordering::SeqCst),
			before,
			after: event.document.as_ref().map(|doc| doc.flatten()),
			timestamp: event.timestamp.0,
			url: rule.url.clone(),
			headers: rule.headers.clone(),
			secrets_ref: rule.secrets_ref.clone(),
			retry_policy: rule.retry_policy,
			timeout_ms: rule.timeout_ms,
			pre_issued_token: None,
		}
	}

	/// Watch the whole backend and process events until cancelled. The
	/// watch stream is reopened from the last resume token on close.
	pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
		let mut resume: Option<ResumeToken> = None;
		loop {
			if cancel.is_cancelled() {
				return;
			}
			let stream = self
				.engine
				.store()
				.watch("", "", resume, WatchOptions { include_before: true })
				.await;
			let mut stream = match stream {
				Ok(stream) => stream,
				Err(err) => {
					warn!("trigger watch open failed: {}", err);
					tokio::select! {
						() = cancel.cancelled() => return,
						() = tokio::time::sleep(Duration::from_secs(1)) => continue,
					}
				}
			};
			info!("trigger service watching change stream");

			loop {
				tokio::select! {
					() = cancel.cancelled() => return,
					event = stream.next() => match event {
						Some(event) => {
							if event.resume_token.is_some() {
								resume = event.resume_token;
							}
							if let Err(err) = self.process_event(&event).await {
								error!("trigger event processing failed: {}", err);
							}
						}
						None => {
							info!("trigger change stream closed, reopening");
							break;
						}
					}
				}
			}
		}
	}
}

impl std::fmt::Debug for TriggerService {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TriggerService")
			.field("rules", &self.rules.snapshot().rules.len())
			.finish()
	}
}

// vim: ts=4
