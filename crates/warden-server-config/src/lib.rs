// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for Warden server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`WARDEN_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use warden_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Database at {}", config.database.url);
//! ```

pub mod env;
pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use env::{load_secret_env, SecretEnvError};
pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};
use warden_common_secret::SecretString;

pub const MASTER_KEY_ENV: &str = "WARDEN_SERVER_MASTER_KEY";

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub lockout: LockoutConfig,
	pub leases: LeasesConfig,
	pub rotation: RotationConfig,
	pub jobs: JobsConfig,
	/// Base64 encoded 32-byte key sealing rotated slot secrets. Only ever
	/// read from the environment.
	pub master_key: Option<SecretString>,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`WARDEN_SERVER_*`)
/// 2. Config file (`/etc/warden/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	let master_key =
		load_secret_env(MASTER_KEY_ENV).map_err(|e| ConfigError::Secret(e.to_string()))?;
	finalize(merged, master_key)
}

/// Finalize configuration layer into resolved config.
fn finalize(
	layer: ServerConfigLayer,
	master_key: Option<SecretString>,
) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		database: layer.database.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		lockout: layer.lockout.unwrap_or_default().finalize(),
		leases: layer.leases.unwrap_or_default().finalize(),
		rotation: layer.rotation.unwrap_or_default().finalize(),
		jobs: layer.jobs.unwrap_or_default().finalize(),
		master_key,
	};

	validate_config(&config)?;

	info!(
		database = %config.database.url,
		lockout_enabled = config.lockout.enabled,
		lockout_threshold = config.lockout.threshold,
		rotation_tick_secs = config.rotation.tick_interval_secs,
		lease_reaper_secs = config.leases.reaper_interval_secs,
		master_key_configured = config.master_key.is_some(),
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	config
		.lockout
		.policy()
		.validate()
		.map_err(|e| ConfigError::Validation(e.to_string()))?;

	let rotation = &config.rotation;
	if rotation.lock_ttl_secs < rotation.provider_timeout_secs {
		return Err(ConfigError::Validation(format!(
			"rotation lock_ttl_secs ({}) must not be shorter than provider_timeout_secs ({})",
			rotation.lock_ttl_secs, rotation.provider_timeout_secs
		)));
	}

	let positive = [
		("rotation.tick_interval_secs", rotation.tick_interval_secs),
		("rotation.provider_timeout_secs", rotation.provider_timeout_secs),
		("rotation.queue_capacity", rotation.queue_capacity as u64),
		("leases.reaper_interval_secs", config.leases.reaper_interval_secs),
		("leases.reaper_batch_size", u64::from(config.leases.reaper_batch_size)),
		("leases.provider_timeout_secs", config.leases.provider_timeout_secs),
		("leases.max_leases_per_secret", u64::from(config.leases.max_leases_per_secret)),
		("lockout.cleanup_interval_secs", config.lockout.cleanup_interval_secs),
		("jobs.history_retention_days", u64::from(config.jobs.history_retention_days)),
		("jobs.history_cleanup_interval_secs", config.jobs.history_cleanup_interval_secs),
	];
	if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
		return Err(ConfigError::Validation(format!("{key} must be positive")));
	}

	Ok(())
}
