//! Server settings.
//!
//! Layering: `config/config.yml`, then the optional `config/config.local.yml`
//! overlay, then environment variables override both.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::prelude::*;

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
	pub server: ServerSettings,
	pub storage: StorageSettings,
	pub realtime: RealtimeSettings,
	pub trigger: TriggerSettings,
	pub auth: AuthSettings,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
	pub bind: String,
	pub api_port: u16,
	pub realtime_port: u16,
}

impl Default for ServerSettings {
	fn default() -> Self {
		Self { bind: "0.0.0.0".into(), api_port: 8080, realtime_port: 8081 }
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
	/// Tombstone retention window, seconds
	pub retention_secs: u64,

	/// Purge sweeper interval, seconds
	pub sweep_interval_secs: u64,

	/// Change events kept for watch resumption
	pub event_replay: usize,
}

impl Default for StorageSettings {
	fn default() -> Self {
		Self { retention_secs: 24 * 3600, sweep_interval_secs: 300, event_replay: 4096 }
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RealtimeSettings {
	pub heartbeat_secs: u64,
	pub outbound_buffer: usize,
	pub sub_buffer: usize,
	pub max_subscriptions: usize,
	pub fanout_buffer: usize,
}

impl Default for RealtimeSettings {
	fn default() -> Self {
		Self {
			heartbeat_secs: 30,
			outbound_buffer: 64,
			sub_buffer: 64,
			max_subscriptions: 64,
			fanout_buffer: 256,
		}
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TriggerSettings {
	/// YAML rules file loaded at startup; absent means no triggers
	pub rules_file: Option<PathBuf>,

	/// Append-only queue journal; absent means in-memory only
	pub journal_file: Option<PathBuf>,

	pub workers: usize,
	pub task_timeout_secs: u64,
}

impl Default for TriggerSettings {
	fn default() -> Self {
		Self { rules_file: None, journal_file: None, workers: 4, task_timeout_secs: 10 }
	}
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthSettings {
	/// HS256 shared secret of the auth collaborator
	pub jwt_secret: String,
}

impl Default for AuthSettings {
	fn default() -> Self {
		Self { jwt_secret: "insecure-dev-secret".into() }
	}
}

impl Settings {
	/// Load settings from a config directory plus environment overrides.
	pub fn load(dir: &Path) -> DbResult<Self> {
		let mut value = read_yaml(&dir.join("config.yml"))?
			.unwrap_or(serde_yaml::Value::Mapping(Default::default()));
		if let Some(overlay) = read_yaml(&dir.join("config.local.yml"))? {
			merge_yaml(&mut value, overlay);
		}
		let mut settings: Settings = serde_yaml::from_value(value)
			.map_err(|err| Error::ConfigError(format!("bad config file: {}", err)))?;
		settings.apply_env()?;
		Ok(settings)
	}

	/// Environment variables override everything.
	pub fn apply_env(&mut self) -> DbResult<()> {
		if let Ok(port) = std::env::var("API_PORT") {
			self.server.api_port = parse_env("API_PORT", &port)?;
		}
		if let Ok(port) = std::env::var("REALTIME_PORT") {
			self.server.realtime_port = parse_env("REALTIME_PORT", &port)?;
		}
		if let Ok(bind) = std::env::var("BIND_ADDR") {
			self.server.bind = bind;
		}
		if let Ok(secs) = std::env::var("STORE_RETENTION_SECS") {
			self.storage.retention_secs = parse_env("STORE_RETENTION_SECS", &secs)?;
		}
		if let Ok(path) = std::env::var("TRIGGER_RULES_FILE") {
			self.trigger.rules_file = Some(PathBuf::from(path));
		}
		if let Ok(path) = std::env::var("TRIGGER_JOURNAL_FILE") {
			self.trigger.journal_file = Some(PathBuf::from(path));
		}
		if let Ok(secret) = std::env::var("AUTH_JWT_SECRET") {
			self.auth.jwt_secret = secret;
		}
		Ok(())
	}
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> DbResult<T> {
	raw.parse()
		.map_err(|_| Error::ConfigError(format!("invalid value for {}: {:?}", name, raw)))
}

fn read_yaml(path: &Path) -> DbResult<Option<serde_yaml::Value>> {
	if !path.exists() {
		return Ok(None);
	}
	let raw = std::fs::read_to_string(path)?;
	let value = serde_yaml::from_str(&raw)
		.map_err(|err| Error::ConfigError(format!("{}: {}", path.display(), err)))?;
	Ok(Some(value))
}

/// Recursive mapping merge; everything else is replaced by the overlay.
fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
	match (base, overlay) {
		(serde_yaml::Value::Mapping(base), serde_yaml::Value::Mapping(overlay)) => {
			for (key, value) in overlay {
				match base.get_mut(&key) {
					Some(existing) => merge_yaml(existing, value),
					None => {
						base.insert(key, value);
					}
				}
			}
		}
		(base, overlay) => *base = overlay,
	}
}

// vim: ts=4
