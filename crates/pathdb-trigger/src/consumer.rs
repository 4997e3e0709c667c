//! Trigger delivery consumer.
//!
//! Pull loops lease tasks from the work queue one at a time, run the
//! webhook worker under the task timeout and settle the message: ack on
//! success or terminal failure, nak with exponential backoff on retryable
//! failure, dead-letter after the last allowed attempt. Malformed payloads
//! are terminated without redelivery.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;
use crate::queue::{Delivery, DeliveryQueue};
use crate::types::{dlq_subject, DeliveryTask};
use crate::worker::{DeliveryWorker, Disposition};

/// Default budget for processing one task (delivery + settling).
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct ConsumerConfig {
	/// Number of concurrent pull loops
	pub workers: usize,

	pub task_timeout: Duration,
}

impl Default for ConsumerConfig {
	fn default() -> Self {
		Self { workers: 4, task_timeout: DEFAULT_TASK_TIMEOUT }
	}
}

pub struct TriggerConsumer {
	queue: Arc<dyn DeliveryQueue>,
	worker: DeliveryWorker,
	config: ConsumerConfig,
}

impl TriggerConsumer {
	pub fn new(
		queue: Arc<dyn DeliveryQueue>,
		worker: DeliveryWorker,
		config: ConsumerConfig,
	) -> Arc<Self> {
		Arc::new(Self { queue, worker, config })
	}

	/// Spawn the pull loops. Returned handles finish when the token is
	/// cancelled.
	pub fn start(self: &Arc<Self>, cancel: &CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
		(0..self.config.workers.max(1))
			.map(|n| {
				let consumer = self.clone();
				let cancel = cancel.clone();
				tokio::spawn(async move {
					info!("trigger delivery worker {} started", n);
					consumer.pull_loop(cancel).await;
					info!("trigger delivery worker {} stopped", n);
				})
			})
			.collect()
	}

	async fn pull_loop(&self, cancel: CancellationToken) {
		loop {
			let delivery = match self.queue.next(&cancel).await {
				Ok(Some(delivery)) => delivery,
				Ok(None) => return,
				Err(err) => {
					error!("queue pull failed: {}", err);
					tokio::select! {
						() = cancel.cancelled() => return,
						() = tokio::time::sleep(Duration::from_secs(1)) => continue,
					}
				}
			};
			if let Err(err) = self.process_delivery(&delivery).await {
				error!("delivery {} settling failed: {}", delivery.id, err);
			}
		}
	}

	async fn process_delivery(&self, delivery: &Delivery) -> DbResult<()> {
		let task: DeliveryTask = match serde_json::from_slice(&delivery.payload) {
			Ok(task) => task,
			Err(err) => {
				// Unrecoverable payload; redelivering it cannot help
				warn!("terminating malformed delivery task: {}", err);
				return self.queue.term(delivery.id).await;
			}
		};

		let disposition =
			match tokio::time::timeout(self.config.task_timeout, self.worker.process(&task)).await {
				Ok(disposition) => disposition,
				Err(_) => Disposition::Retry("task timeout".into()),
			};

		match disposition {
			Disposition::Delivered => {
				info!(
					"delivered trigger {} for {} (attempt {})",
					task.trigger_id, task.doc_key, delivery.attempt
				);
				self.queue.ack(delivery.id).await
			}
			Disposition::Terminal(reason) => {
				warn!("trigger {} delivery terminal: {}", task.trigger_id, reason);
				self.queue.ack(delivery.id).await
			}
			Disposition::Retry(reason) => {
				let policy = task.retry_policy;
				if delivery.attempt >= policy.max_attempts {
					warn!(
						"trigger {} exhausted {} attempts, dead-lettering: {}",
						task.trigger_id, delivery.attempt, reason
					);
					self.queue
						.publish(&dlq_subject(&task.trigger_id), &delivery.payload)
						.await?;
					self.queue.ack(delivery.id).await
				} else {
					let backoff = policy.backoff(delivery.attempt);
					debug!(
						"trigger {} attempt {} failed ({}), retry in {:?}",
						task.trigger_id, delivery.attempt, reason, backoff
					);
					self.queue.nak(delivery.id, backoff).await
				}
			}
		}
	}
}

impl std::fmt::Debug for TriggerConsumer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TriggerConsumer").field("workers", &self.config.workers).finish()
	}
}

// vim: ts=4
