// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, JobsConfigLayer, LeasesConfigLayer, LockoutConfigLayer, LoggingConfigLayer,
	RotationConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/warden/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: WARDEN_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			database: Some(load_database_from_env()),
			logging: Some(load_logging_from_env()?),
			lockout: Some(load_lockout_from_env()?),
			leases: Some(load_leases_from_env()?),
			rotation: Some(load_rotation_from_env()?),
			jobs: Some(load_jobs_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
	env_var(name).map(|v| parse_value(name, &v)).transpose()
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
	value.trim().parse().map_err(|_| ConfigError::InvalidValue {
		key: name.to_string(),
		message: format!("invalid {} value '{value}'", std::any::type_name::<T>()),
	})
}

fn load_database_from_env() -> DatabaseConfigLayer {
	DatabaseConfigLayer {
		url: env_var("WARDEN_SERVER_DATABASE_URL"),
	}
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = env_var("WARDEN_SERVER_LOG_FORMAT")
		.map(|v| {
			v.parse().map_err(|message| ConfigError::InvalidValue {
				key: "WARDEN_SERVER_LOG_FORMAT".to_string(),
				message,
			})
		})
		.transpose()?;

	Ok(LoggingConfigLayer {
		level: env_var("WARDEN_SERVER_LOG_LEVEL"),
		format,
	})
}

fn load_lockout_from_env() -> Result<LockoutConfigLayer, ConfigError> {
	Ok(LockoutConfigLayer {
		enabled: env_bool("WARDEN_SERVER_LOCKOUT_ENABLED"),
		threshold: env_parse("WARDEN_SERVER_LOCKOUT_THRESHOLD")?,
		duration_secs: env_parse("WARDEN_SERVER_LOCKOUT_DURATION_SECS")?,
		counter_reset_secs: env_parse("WARDEN_SERVER_LOCKOUT_COUNTER_RESET_SECS")?,
		cleanup_interval_secs: env_parse("WARDEN_SERVER_LOCKOUT_CLEANUP_INTERVAL_SECS")?,
	})
}

fn load_leases_from_env() -> Result<LeasesConfigLayer, ConfigError> {
	Ok(LeasesConfigLayer {
		reaper_interval_secs: env_parse("WARDEN_SERVER_LEASE_REAPER_INTERVAL_SECS")?,
		reaper_batch_size: env_parse("WARDEN_SERVER_LEASE_REAPER_BATCH_SIZE")?,
		provider_timeout_secs: env_parse("WARDEN_SERVER_LEASE_PROVIDER_TIMEOUT_SECS")?,
		max_leases_per_secret: env_parse("WARDEN_SERVER_LEASE_MAX_PER_SECRET")?,
	})
}

fn load_rotation_from_env() -> Result<RotationConfigLayer, ConfigError> {
	Ok(RotationConfigLayer {
		tick_interval_secs: env_parse("WARDEN_SERVER_ROTATION_TICK_INTERVAL_SECS")?,
		lock_ttl_secs: env_parse("WARDEN_SERVER_ROTATION_LOCK_TTL_SECS")?,
		provider_timeout_secs: env_parse("WARDEN_SERVER_ROTATION_PROVIDER_TIMEOUT_SECS")?,
		queue_capacity: env_parse("WARDEN_SERVER_ROTATION_QUEUE_CAPACITY")?,
	})
}

fn load_jobs_from_env() -> Result<JobsConfigLayer, ConfigError> {
	Ok(JobsConfigLayer {
		history_retention_days: env_parse("WARDEN_SERVER_JOBS_HISTORY_RETENTION_DAYS")?,
		history_cleanup_interval_secs: env_parse(
			"WARDEN_SERVER_JOBS_HISTORY_CLEANUP_INTERVAL_SECS",
		)?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.database.is_none());
		assert!(layer.rotation.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let layer = TomlSource::new("/nonexistent/config.toml").load().unwrap();
		assert!(layer.database.is_none());
	}

	#[test]
	fn test_toml_source_reads_sections() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
[lockout]
threshold = 5

[leases]
max_leases_per_secret = 10
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(layer.lockout.unwrap().threshold, Some(5));
		assert_eq!(layer.leases.unwrap().max_leases_per_secret, Some(10));
	}

	#[test]
	fn test_toml_source_reports_parse_errors() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "[lockout]\nthreshold = \"many\"\n").unwrap();
		assert!(matches!(
			TomlSource::new(file.path()).load(),
			Err(ConfigError::TomlParse { .. })
		));
	}

	#[test]
	fn test_parse_value_reports_key() {
		assert_eq!(parse_value::<u64>("KEY", " 42 ").unwrap(), 42);
		let err = parse_value::<u32>("WARDEN_SERVER_LOCKOUT_THRESHOLD", "-1").unwrap_err();
		assert!(err.to_string().contains("WARDEN_SERVER_LOCKOUT_THRESHOLD"));
	}
}
