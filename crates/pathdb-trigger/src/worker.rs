//! Webhook delivery worker.
//!
//! Builds an HTTP POST per task and classifies the outcome: 2xx delivered,
//! 4xx terminal, 5xx and transport errors retryable.

use reqwest::StatusCode;
use std::time::Duration;

use crate::prelude::*;
use crate::types::DeliveryTask;

/// Default per-delivery HTTP timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one delivery attempt.
#[derive(Debug)]
pub enum Disposition {
	/// 2xx: ack, no redelivery
	Delivered,
	/// 4xx: ack and record, the destination rejected the payload
	Terminal(String),
	/// 5xx / timeout / transport error: nak with backoff
	Retry(String),
}

#[derive(Clone, Debug)]
pub struct DeliveryWorker {
	http: reqwest::Client,
}

impl DeliveryWorker {
	pub fn new() -> DbResult<Self> {
		let http = reqwest::Client::builder()
			.timeout(DEFAULT_HTTP_TIMEOUT)
			.build()
			.map_err(|err| Error::ConfigError(format!("http client: {}", err)))?;
		Ok(Self { http })
	}

	/// POST the task snapshot to its destination URL.
	pub async fn process(&self, task: &DeliveryTask) -> Disposition {
		let timeout = if task.timeout_ms > 0 {
			Duration::from_millis(task.timeout_ms)
		} else {
			DEFAULT_HTTP_TIMEOUT
		};

		let mut request = self.http.post(&task.url).timeout(timeout).json(task);
		for (name, value) in &task.headers {
			request = request.header(name, value);
		}
		if let Some(token) = &task.pre_issued_token {
			request = request.bearer_auth(token);
		}

		match request.send().await {
			Ok(response) => classify_status(response.status()),
			Err(err) if err.is_timeout() => Disposition::Retry("timeout".into()),
			Err(err) => Disposition::Retry(format!("transport: {}", err)),
		}
	}
}

fn classify_status(status: StatusCode) -> Disposition {
	if status.is_success() {
		Disposition::Delivered
	} else if status.is_client_error() {
		Disposition::Terminal(format!("destination returned {}", status))
	} else {
		Disposition::Retry(format!("destination returned {}", status))
	}
}

// vim: ts=4
