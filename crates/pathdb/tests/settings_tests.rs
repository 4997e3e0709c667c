//! Settings loading and overlay tests.

use pathdb::Settings;

#[test]
fn test_defaults_without_config_dir() {
	let dir = tempfile::tempdir().unwrap();
	let settings = Settings::load(dir.path()).unwrap();
	assert_eq!(settings.server.api_port, 8080);
	assert_eq!(settings.server.realtime_port, 8081);
	assert_eq!(settings.storage.retention_secs, 24 * 3600);
	assert_eq!(settings.realtime.heartbeat_secs, 30);
	assert_eq!(settings.trigger.workers, 4);
}

#[test]
fn test_config_file() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(
		dir.path().join("config.yml"),
		"server:\n  api_port: 9000\nstorage:\n  retention_secs: 60\n",
	)
	.unwrap();

	let settings = Settings::load(dir.path()).unwrap();
	assert_eq!(settings.server.api_port, 9000);
	assert_eq!(settings.storage.retention_secs, 60);
	// Untouched sections keep their defaults
	assert_eq!(settings.server.realtime_port, 8081);
}

#[test]
fn test_local_overlay_wins() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(
		dir.path().join("config.yml"),
		"server:\n  api_port: 9000\n  bind: 127.0.0.1\n",
	)
	.unwrap();
	std::fs::write(dir.path().join("config.local.yml"), "server:\n  api_port: 9001\n").unwrap();

	let settings = Settings::load(dir.path()).unwrap();
	assert_eq!(settings.server.api_port, 9001);
	// Keys absent from the overlay survive from the base file
	assert_eq!(settings.server.bind, "127.0.0.1");
}

#[test]
fn test_bad_yaml_is_config_error() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(dir.path().join("config.yml"), "server: [not, a, mapping\n").unwrap();
	assert!(Settings::load(dir.path()).is_err());
}

#[test]
fn test_trigger_rules_file_setting() {
	let dir = tempfile::tempdir().unwrap();
	std::fs::write(
		dir.path().join("config.yml"),
		"trigger:\n  rules_file: /etc/pathdb/triggers.yml\n  workers: 8\n",
	)
	.unwrap();
	let settings = Settings::load(dir.path()).unwrap();
	assert_eq!(
		settings.trigger.rules_file.as_deref(),
		Some(std::path::Path::new("/etc/pathdb/triggers.yml"))
	);
	assert_eq!(settings.trigger.workers, 8);
}

// vim: ts=4
