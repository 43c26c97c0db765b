// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test fixtures: an in-memory target that serves both leases and rotations.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use warden_common_secret::SecretString;
use warden_credentials_core::{PasswordRequirements, ProviderError};
use warden_server_config::ServerConfig;
use warden_server_db::testing::create_test_pool;
use warden_server_db::{format_timestamp, now, SqlitePool};
use warden_server_leases::{ExtendOutcome, LeaseProvider, ProvisionedCredential};
use warden_server_rotation::{MasterKey, NewRotation, RotationProvider};

use crate::state::{create_app_state, AppState, Providers};

pub const FAKE_TARGET: &str = "fake-sql";

#[derive(Default)]
pub struct FakeTarget {
	next_ref: AtomicU64,
	live: Mutex<HashSet<String>>,
	passwords: Mutex<HashMap<String, String>>,
}

impl FakeTarget {
	pub fn is_live(&self, external_ref: &str) -> bool {
		self.live.lock().unwrap().contains(external_ref)
	}
}

#[async_trait]
impl LeaseProvider for FakeTarget {
	fn provider_type(&self) -> &str {
		FAKE_TARGET
	}

	async fn provision(
		&self,
		_parameters: &serde_json::Value,
		_expires_at: DateTime<Utc>,
	) -> Result<ProvisionedCredential, ProviderError> {
		let external_ref = format!("v-user-{}", self.next_ref.fetch_add(1, Ordering::SeqCst));
		self.live.lock().unwrap().insert(external_ref.clone());
		Ok(ProvisionedCredential {
			credentials: SecretString::new(format!("{{\"username\":\"{external_ref}\"}}")),
			external_ref,
		})
	}

	async fn extend(
		&self,
		_parameters: &serde_json::Value,
		_external_ref: &str,
		_expires_at: DateTime<Utc>,
	) -> Result<ExtendOutcome, ProviderError> {
		Ok(ExtendOutcome::Unsupported)
	}

	async fn teardown(
		&self,
		_parameters: &serde_json::Value,
		external_ref: &str,
	) -> Result<(), ProviderError> {
		self.live.lock().unwrap().remove(external_ref);
		Ok(())
	}
}

#[async_trait]
impl RotationProvider for FakeTarget {
	fn rotation_type(&self) -> &str {
		FAKE_TARGET
	}

	async fn apply_credential(
		&self,
		_parameters: &serde_json::Value,
		identity: &str,
		new_secret: &SecretString,
	) -> Result<(), ProviderError> {
		self.passwords
			.lock()
			.unwrap()
			.insert(identity.to_string(), new_secret.expose().clone());
		Ok(())
	}
}

pub struct TestState {
	pub state: AppState,
	pub target: Arc<FakeTarget>,
}

pub async fn test_state() -> TestState {
	let pool = create_test_pool().await;
	let target = Arc::new(FakeTarget::default());
	let mut providers = Providers::default();
	providers.leases.register(target.clone());
	providers.rotations.register(target.clone());

	let state = create_app_state(pool, &ServerConfig::default(), MasterKey::generate(), providers);
	TestState { state, target }
}

pub fn new_rotation(name: &str) -> NewRotation {
	NewRotation {
		name: name.to_string(),
		rotation_type: FAKE_TARGET.to_string(),
		interval_secs: 3600,
		parameters: serde_json::json!({"host": "db.internal"}),
		generation: PasswordRequirements::default(),
		identities: [format!("{name}_a"), format!("{name}_b")],
	}
}

/// Moves a configuration's `last_rotated_at` into the past.
pub async fn backdate_rotation(pool: &SqlitePool, id: &str, secs: i64) {
	sqlx::query("UPDATE rotation_configurations SET last_rotated_at = ? WHERE id = ?")
		.bind(format_timestamp(now() - ChronoDuration::seconds(secs)))
		.bind(id)
		.execute(pool)
		.await
		.unwrap();
}
