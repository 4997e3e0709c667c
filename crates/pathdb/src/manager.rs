//! Service manager: lifecycle orchestration of every subsystem.
//!
//! Initialization runs in dependency order: backend, router, engine,
//! fan-out, hub and trigger pipeline, then the HTTP listeners. Shutdown
//! reverses it: drain the listeners first, cancel the root token, wait for
//! background tasks under a deadline, then close the queue and backend.
//! Failures during init are fatal; partial initialization is never exposed.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use pathdb_engine::{Engine, RoutedStore, SingleRouter};
use pathdb_realtime::{FanOut, Hub, RealtimeConfig};
use pathdb_store_adapter_memory::{AdapterConfig, StoreAdapterMemory};
use pathdb_trigger::consumer::ConsumerConfig;
use pathdb_trigger::queue::QueueConfig;
use pathdb_trigger::{DeliveryWorker, RuleStore, TriggerConsumer, TriggerService, WorkQueue};
use pathdb_types::auth_adapter::{AuthAdapter, StaticKeyAuthAdapter};
use pathdb_types::store_adapter::StoreAdapter;

use crate::app::{App, AppState};
use crate::prelude::*;
use crate::routes;
use crate::settings::Settings;

/// How long shutdown waits for background tasks before abandoning them.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);

pub struct ServiceManager {
	app: App,
	root_cancel: CancellationToken,
	http_cancel: CancellationToken,
	background: Vec<tokio::task::JoinHandle<()>>,
	servers: Vec<(&'static str, tokio::task::JoinHandle<std::io::Result<()>>)>,
}

impl ServiceManager {
	/// Initialize every component and start serving.
	pub async fn start(settings: Settings) -> DbResult<Self> {
		let root_cancel = CancellationToken::new();
		let http_cancel = CancellationToken::new();
		let mut background = Vec::new();

		// Backend, router, engine
		let backend: Arc<dyn StoreAdapter> = StoreAdapterMemory::new(AdapterConfig {
			retention: Duration::from_secs(settings.storage.retention_secs),
			sweep_interval: Duration::from_secs(settings.storage.sweep_interval_secs),
			replay_capacity: settings.storage.event_replay,
			..AdapterConfig::default()
		});
		let router = SingleRouter::new(backend.clone());
		let store: Arc<dyn StoreAdapter> = RoutedStore::new(router);
		let engine = Engine::new(store);

		// Auth collaborator
		let auth: Arc<dyn AuthAdapter> =
			Arc::new(StaticKeyAuthAdapter::new(&settings.auth.jwt_secret));

		// Change-stream fan-out and realtime hub
		let fanout = FanOut::new(engine.clone(), settings.realtime.sub_buffer);
		background.push(tokio::spawn(fanout.clone().run(root_cancel.child_token())));
		let hub = Hub::new(
			engine.clone(),
			auth.clone(),
			fanout.clone(),
			RealtimeConfig {
				heartbeat: Duration::from_secs(settings.realtime.heartbeat_secs),
				outbound_buffer: settings.realtime.outbound_buffer,
				sub_buffer: settings.realtime.sub_buffer,
				max_subscriptions: settings.realtime.max_subscriptions,
			},
		);

		// Trigger pipeline
		let rules = RuleStore::new();
		if let Some(path) = &settings.trigger.rules_file {
			let count = rules.load_file(path)?;
			info!("loaded {} trigger rules from {}", count, path.display());
		}
		let queue = WorkQueue::new(QueueConfig {
			journal: settings.trigger.journal_file.clone(),
			..QueueConfig::default()
		})?;
		let trigger_service = TriggerService::new(engine.clone(), rules.clone(), queue.clone());
		background.push(tokio::spawn(trigger_service.clone().run(root_cancel.child_token())));
		let consumer = TriggerConsumer::new(
			queue.clone(),
			DeliveryWorker::new()?,
			ConsumerConfig {
				workers: settings.trigger.workers,
				task_timeout: Duration::from_secs(settings.trigger.task_timeout_secs),
			},
		);
		background.extend(consumer.start(&root_cancel));

		let app: App = Arc::new(AppState {
			settings: settings.clone(),
			store: backend,
			engine,
			auth,
			fanout,
			hub,
			rules,
			queue,
			trigger_service,
		});

		// HTTP listeners, last
		let mut servers = Vec::new();
		let api_addr = format!("{}:{}", settings.server.bind, settings.server.api_port);
		servers.push(("api", serve(&api_addr, routes::api_router(app.clone()), &http_cancel).await?));
		let rt_addr = format!("{}:{}", settings.server.bind, settings.server.realtime_port);
		servers.push((
			"realtime",
			serve(&rt_addr, routes::realtime_router(app.clone()), &http_cancel).await?,
		));

		Ok(Self { app, root_cancel, http_cancel, background, servers })
	}

	pub fn app(&self) -> &App {
		&self.app
	}

	/// Serve until SIGINT, then shut down.
	pub async fn run_until_signal(self) -> DbResult<()> {
		tokio::signal::ctrl_c().await.map_err(Error::Io)?;
		info!("shutdown signal received");
		self.shutdown().await
	}

	/// Ordered shutdown: listeners, background tasks, backend.
	pub async fn shutdown(self) -> DbResult<()> {
		// Drain HTTP first so no new work arrives
		self.http_cancel.cancel();
		for (name, handle) in self.servers {
			match handle.await {
				Ok(Ok(())) => info!("{} listener stopped", name),
				Ok(Err(err)) => warn!("{} listener failed: {}", name, err),
				Err(err) => warn!("{} listener panicked: {}", name, err),
			}
		}

		// Stop background tasks under a deadline
		self.root_cancel.cancel();
		let drain = async {
			for handle in self.background {
				let _ = handle.await;
			}
		};
		if tokio::time::timeout(SHUTDOWN_DEADLINE, drain).await.is_err() {
			warn!("background tasks did not stop within {:?}", SHUTDOWN_DEADLINE);
		}

		self.app.store.close().await?;
		info!("shutdown complete");
		Ok(())
	}
}

async fn serve(
	addr: &str,
	router: axum::Router,
	http_cancel: &CancellationToken,
) -> DbResult<tokio::task::JoinHandle<std::io::Result<()>>> {
	let listener = TcpListener::bind(addr).await?;
	info!("listening on {}", addr);
	let cancel = http_cancel.clone();
	Ok(tokio::spawn(async move {
		axum::serve(listener, router)
			.with_graceful_shutdown(async move { cancel.cancelled().await })
			.await
	}))
}

// vim: ts=4
