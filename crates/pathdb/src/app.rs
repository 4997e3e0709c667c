//! App state shared by every handler and background task.

use std::sync::Arc;

use pathdb_engine::Engine;
use pathdb_realtime::{FanOut, Hub};
use pathdb_trigger::{RuleStore, TriggerService, WorkQueue};
use pathdb_types::auth_adapter::AuthAdapter;
use pathdb_types::store_adapter::StoreAdapter;

use crate::settings::Settings;

pub struct AppState {
	pub settings: Settings,
	pub store: Arc<dyn StoreAdapter>,
	pub engine: Arc<Engine>,
	pub auth: Arc<dyn AuthAdapter>,
	pub fanout: Arc<FanOut>,
	pub hub: Arc<Hub>,
	pub rules: Arc<RuleStore>,
	pub queue: Arc<WorkQueue>,
	pub trigger_service: Arc<TriggerService>,
}

pub type App = Arc<AppState>;

// vim: ts=4
