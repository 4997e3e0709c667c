use std::path::PathBuf;

use pathdb::{ServiceManager, Settings};
use tracing::{error, info};

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.init();

	let config_dir =
		PathBuf::from(std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string()));
	let settings = match Settings::load(&config_dir) {
		Ok(settings) => settings,
		Err(err) => {
			error!("FATAL: failed to load settings: {}", err);
			std::process::exit(1);
		}
	};

	info!("pathdb v{} starting", env!("CARGO_PKG_VERSION"));
	let manager = match ServiceManager::start(settings).await {
		Ok(manager) => manager,
		Err(err) => {
			error!("FATAL: initialization failed: {}", err);
			std::process::exit(1);
		}
	};

	if let Err(err) = manager.run_until_signal().await {
		error!("shutdown failed: {}", err);
		std::process::exit(1);
	}
}

// vim: ts=4
