// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;
use warden_server_auth::{CredentialManager, CredentialRepository, LockoutGuard, LockoutRepository};
use warden_server_config::{ServerConfig, MASTER_KEY_ENV};
use warden_server_db::SqlitePool;
use warden_server_leases::{LeaseManager, LeaseManagerConfig, LeaseProviderRegistry, LeaseRepository};
use warden_server_rotation::{
	MasterKey, RotationError, RotationLockRepository, RotationProviderRegistry, RotationRepository,
	RotationService, RotationServiceConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
	#[error("{MASTER_KEY_ENV} (or {MASTER_KEY_ENV}_FILE) must be set")]
	MissingMasterKey,

	#[error("invalid master key: {0}")]
	InvalidMasterKey(#[source] RotationError),
}

/// Provider implementations available to this process.
#[derive(Clone, Default)]
pub struct Providers {
	pub leases: LeaseProviderRegistry,
	pub rotations: RotationProviderRegistry,
}

pub struct AppState {
	pub pool: SqlitePool,
	pub lockout_guard: LockoutGuard,
	pub credentials: CredentialManager,
	pub leases: LeaseManager,
	pub rotation: RotationService,
}

pub fn master_key(config: &ServerConfig) -> Result<MasterKey, StartupError> {
	let encoded = config
		.master_key
		.as_ref()
		.ok_or(StartupError::MissingMasterKey)?;
	MasterKey::from_base64(encoded).map_err(StartupError::InvalidMasterKey)
}

pub fn create_app_state(
	pool: SqlitePool,
	config: &ServerConfig,
	master_key: MasterKey,
	providers: Providers,
) -> AppState {
	let lockout_guard = LockoutGuard::new(
		Arc::new(LockoutRepository::new(pool.clone())),
		config.lockout.policy(),
	);
	let credentials = CredentialManager::new(
		Arc::new(CredentialRepository::new(pool.clone())),
		lockout_guard.clone(),
	);

	let lease_repo = Arc::new(LeaseRepository::new(pool.clone()));
	let leases = LeaseManager::new(
		lease_repo.clone(),
		lease_repo,
		providers.leases,
		LeaseManagerConfig {
			provider_timeout: Duration::from_secs(config.leases.provider_timeout_secs),
			max_leases_per_secret: config.leases.max_leases_per_secret,
			reaper_batch_size: config.leases.reaper_batch_size,
		},
	);

	let rotation = RotationService::new(
		Arc::new(RotationRepository::new(pool.clone())),
		Arc::new(RotationLockRepository::new(pool.clone())),
		providers.rotations,
		master_key,
		RotationServiceConfig {
			provider_timeout: Duration::from_secs(config.rotation.provider_timeout_secs),
			lock_ttl: Duration::from_secs(config.rotation.lock_ttl_secs),
			queue_capacity: config.rotation.queue_capacity,
		},
	);

	AppState {
		pool,
		lockout_guard,
		credentials,
		leases,
		rotation,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use warden_common_secret::SecretString;

	#[test]
	fn missing_master_key_is_a_startup_error() {
		let config = ServerConfig::default();
		assert!(matches!(master_key(&config), Err(StartupError::MissingMasterKey)));
	}

	#[test]
	fn malformed_master_key_is_rejected() {
		let config = ServerConfig {
			master_key: Some(SecretString::new("not base64!".to_string())),
			..Default::default()
		};
		assert!(matches!(master_key(&config), Err(StartupError::InvalidMasterKey(_))));
	}

	#[test]
	fn well_formed_master_key_loads() {
		let config = ServerConfig {
			master_key: Some(SecretString::new(
				"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=".to_string(),
			)),
			..Default::default()
		};
		assert!(master_key(&config).is_ok());
	}
}
