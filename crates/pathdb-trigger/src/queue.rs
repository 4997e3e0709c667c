//! Durable work queue for delivery tasks.
//!
//! Work-queue retention: each message is handed to exactly one worker and
//! removed on ack. Messages are partitioned by subject
//! (`triggers.<tenant>.<collection>.<doc-key>`) and dispatch never releases
//! a message while an earlier message of the same subject is pending, which
//! preserves per-document delivery order. Nak re-schedules a message after
//! a delay; term drops it as unprocessable.
//!
//! The embedded implementation keeps state in memory with an optional
//! append-only journal, replayed on open, for durability across restarts.
//! Dead-letter subjects are excluded from consumption and only accumulate.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::prelude::*;
use crate::types::{DLQ_PREFIX, SUBJECT_PREFIX};

/// A message leased to a worker. `attempt` is 1-based.
#[derive(Clone, Debug)]
pub struct Delivery {
	pub id: u64,
	pub subject: Box<str>,
	pub payload: Vec<u8>,
	pub attempt: u32,
}

#[async_trait]
pub trait DeliveryQueue: Debug + Send + Sync {
	async fn publish(&self, subject: &str, payload: &[u8]) -> DbResult<()>;

	/// Pull the next dispatchable message, waiting until one is available
	/// or the token is cancelled (None).
	async fn next(&self, cancel: &CancellationToken) -> DbResult<Option<Delivery>>;

	/// Remove a processed message.
	async fn ack(&self, id: u64) -> DbResult<()>;

	/// Reschedule a failed message after a delay.
	async fn nak(&self, id: u64, delay: Duration) -> DbResult<()>;

	/// Drop an unprocessable message without redelivery.
	async fn term(&self, id: u64) -> DbResult<()>;
}

#[derive(Debug)]
enum MsgState {
	Ready,
	Inflight,
	Delayed(Timestamp),
}

#[derive(Debug)]
struct Message {
	subject: Box<str>,
	payload: Vec<u8>,
	attempt: u32,
	state: MsgState,
}

#[derive(Debug, Default)]
struct State {
	messages: HashMap<u64, Message>,
	/// Per-subject FIFO of message ids
	subjects: HashMap<Box<str>, VecDeque<u64>>,
	next_id: u64,
}

impl State {
	fn insert(&mut self, subject: &str, payload: Vec<u8>, id: Option<u64>) -> u64 {
		let id = match id {
			Some(id) => {
				self.next_id = self.next_id.max(id);
				id
			}
			None => {
				self.next_id += 1;
				self.next_id
			}
		};
		self.messages.insert(
			id,
			Message { subject: subject.into(), payload, attempt: 0, state: MsgState::Ready },
		);
		self.subjects.entry(subject.into()).or_default().push_back(id);
		id
	}

	fn remove(&mut self, id: u64) -> Option<Message> {
		let message = self.messages.remove(&id)?;
		if let Some(queue) = self.subjects.get_mut(&message.subject) {
			queue.retain(|queued| *queued != id);
			if queue.is_empty() {
				self.subjects.remove(&message.subject);
			}
		}
		Some(message)
	}

	/// Find a dispatchable message for the consumer filter: the head of a
	/// subject queue, ready (or past its redelivery time).
	fn pop_dispatchable(
		&mut self,
		prefix: &str,
		exclude: &str,
		now: Timestamp,
	) -> Option<Delivery> {
		let mut candidate = None;
		for (subject, queue) in &self.subjects {
			if !subject.starts_with(prefix) || (!exclude.is_empty() && subject.starts_with(exclude))
			{
				continue;
			}
			let Some(&head) = queue.front() else { continue };
			let Some(message) = self.messages.get(&head) else { continue };
			let due = match message.state {
				MsgState::Ready => true,
				MsgState::Delayed(at) => at <= now,
				MsgState::Inflight => false,
			};
			if due {
				candidate = Some(head);
				break;
			}
		}
		let id = candidate?;
		let message = self.messages.get_mut(&id)?;
		message.state = MsgState::Inflight;
		message.attempt += 1;
		Some(Delivery {
			id,
			subject: message.subject.clone(),
			payload: message.payload.clone(),
			attempt: message.attempt,
		})
	}

	/// Earliest pending redelivery among dispatchable subjects.
	fn earliest_delay(&self, prefix: &str, exclude: &str) -> Option<Timestamp> {
		let mut earliest: Option<Timestamp> = None;
		for (subject, queue) in &self.subjects {
			if !subject.starts_with(prefix) || (!exclude.is_empty() && subject.starts_with(exclude))
			{
				continue;
			}
			let Some(&head) = queue.front() else { continue };
			if let Some(Message { state: MsgState::Delayed(at), .. }) = self.messages.get(&head) {
				earliest = Some(earliest.map_or(*at, |cur| cur.min(*at)));
			}
		}
		earliest
	}
}

/// Queue configuration.
#[derive(Clone, Debug)]
pub struct QueueConfig {
	/// Subjects this queue's consumers pull from
	pub consume_prefix: String,

	/// Subjects excluded from consumption (dead letters)
	pub exclude_prefix: String,

	/// Append-only journal for durability; replayed on open
	pub journal: Option<PathBuf>,
}

impl Default for QueueConfig {
	fn default() -> Self {
		Self {
			consume_prefix: SUBJECT_PREFIX.into(),
			exclude_prefix: DLQ_PREFIX.into(),
			journal: None,
		}
	}
}

#[derive(serde::Serialize)]
struct JournalRecord<'a> {
	op: &'a str,
	id: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	subject: Option<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	payload: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct JournalRecordOwned {
	op: String,
	id: u64,
	#[serde(default)]
	subject: Option<String>,
	#[serde(default)]
	payload: Option<String>,
}

pub struct WorkQueue {
	state: Mutex<State>,
	notify: Notify,
	config: QueueConfig,
	journal: Option<Mutex<std::fs::File>>,
}

impl WorkQueue {
	pub fn new(config: QueueConfig) -> DbResult<std::sync::Arc<Self>> {
		let mut state = State::default();
		let journal = match &config.journal {
			Some(path) => {
				if path.exists() {
					replay_journal(path, &mut state)?;
				}
				let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
				Some(Mutex::new(file))
			}
			None => None,
		};
		Ok(std::sync::Arc::new(Self { state: Mutex::new(state), notify: Notify::new(), config, journal }))
	}

	fn journal_write(&self, record: &JournalRecord) {
		if let Some(journal) = &self.journal {
			let mut file = journal.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			match serde_json::to_string(record) {
				Ok(line) => {
					if let Err(err) = writeln!(file, "{}", line) {
						error!("journal write failed: {}", err);
					}
				}
				Err(err) => error!("journal encode failed: {}", err),
			}
		}
	}

	/// Number of queued messages under a subject prefix (metrics, tests).
	pub fn pending(&self, prefix: &str) -> usize {
		let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		state.messages.values().filter(|message| message.subject.starts_with(prefix)).count()
	}
}

fn replay_journal(path: &std::path::Path, state: &mut State) -> DbResult<()> {
	let raw = std::fs::read_to_string(path)?;
	let mut replayed = 0usize;
	for line in raw.lines() {
		if line.is_empty() {
			continue;
		}
		let record: JournalRecordOwned = match serde_json::from_str(line) {
			Ok(record) => record,
			Err(err) => {
				warn!("skipping bad journal line: {}", err);
				continue;
			}
		};
		match record.op.as_str() {
			"pub" => {
				if let (Some(subject), Some(payload)) = (record.subject, record.payload) {
					state.insert(&subject, payload.into_bytes(), Some(record.id));
					replayed += 1;
				}
			}
			"ack" | "term" => {
				state.remove(record.id);
				replayed = replayed.saturating_sub(1);
			}
			other => warn!("unknown journal op {:?}", other),
		}
	}
	info!("journal replay: {} messages pending", replayed);
	Ok(())
}

#[async_trait]
impl DeliveryQueue for WorkQueue {
	async fn publish(&self, subject: &str, payload: &[u8]) -> DbResult<()> {
		let id = {
			let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			state.insert(subject, payload.to_vec(), None)
		};
		self.journal_write(&JournalRecord {
			op: "pub",
			id,
			subject: Some(subject),
			payload: Some(&String::from_utf8_lossy(payload)),
		});
		self.notify.notify_waiters();
		Ok(())
	}

	async fn next(&self, cancel: &CancellationToken) -> DbResult<Option<Delivery>> {
		loop {
			// Register for wakeups before inspecting the state, otherwise a
			// publish landing in between is missed
			let notified = self.notify.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			let (delivery, earliest) = {
				let mut state =
					self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
				let now = Timestamp::now();
				let delivery = state.pop_dispatchable(
					&self.config.consume_prefix,
					&self.config.exclude_prefix,
					now,
				);
				let earliest =
					state.earliest_delay(&self.config.consume_prefix, &self.config.exclude_prefix);
				(delivery, earliest)
			};
			if let Some(delivery) = delivery {
				return Ok(Some(delivery));
			}
			let wait = earliest
				.map(|at| Duration::from_millis((at.0 - Timestamp::now().0).max(1) as u64))
				.unwrap_or(Duration::from_secs(3600));
			tokio::select! {
				() = cancel.cancelled() => return Ok(None),
				() = &mut notified => {}
				() = tokio::time::sleep(wait) => {}
			}
		}
	}

	async fn ack(&self, id: u64) -> DbResult<()> {
		let removed = {
			let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			state.remove(id)
		};
		if removed.is_some() {
			self.journal_write(&JournalRecord { op: "ack", id, subject: None, payload: None });
			self.notify.notify_waiters();
		}
		Ok(())
	}

	async fn nak(&self, id: u64, delay: Duration) -> DbResult<()> {
		{
			let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			if let Some(message) = state.messages.get_mut(&id) {
				message.state = MsgState::Delayed(Timestamp::from_now(delay.as_millis() as i64));
			}
		}
		self.notify.notify_waiters();
		Ok(())
	}

	async fn term(&self, id: u64) -> DbResult<()> {
		let removed = {
			let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
			state.remove(id)
		};
		if removed.is_some() {
			self.journal_write(&JournalRecord { op: "term", id, subject: None, payload: None });
			self.notify.notify_waiters();
		}
		Ok(())
	}
}

impl Debug for WorkQueue {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
		f.debug_struct("WorkQueue")
			.field("messages", &state.messages.len())
			.field("subjects", &state.subjects.len())
			.finish()
	}
}

// vim: ts=4
