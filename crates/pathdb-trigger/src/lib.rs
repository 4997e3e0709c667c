//! Trigger pipeline: match change events against configured rules, publish
//! delivery tasks to a durable work queue, and deliver them to remote
//! webhooks with retry and dead-lettering.

pub mod consumer;
pub mod evaluator;
pub mod loader;
pub mod queue;
pub mod service;
pub mod types;
pub mod worker;

mod prelude;

pub use consumer::TriggerConsumer;
pub use loader::RuleStore;
pub use queue::{Delivery, DeliveryQueue, WorkQueue};
pub use service::TriggerService;
pub use types::{DeliveryTask, RetryPolicy, TriggerRule};
pub use worker::DeliveryWorker;

// vim: ts=4
