// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory rotation target for tests.

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use warden_common_secret::SecretString;
use warden_credentials_core::{PasswordRequirements, ProviderError, RotationId};
use warden_server_db::testing::create_test_pool;
use warden_server_db::{format_timestamp, now, SqlitePool};

use crate::encryption::MasterKey;
use crate::executor::RotationExecutor;
use crate::lock::RotationLockRepository;
use crate::provider::{RotationProvider, RotationProviderRegistry};
use crate::repository::RotationRepository;
use crate::scheduler::{RotationScheduler, RotationTask};
use crate::service::{NewRotation, RotationService, RotationServiceConfig};

pub const FAKE_ROTATION_TYPE: &str = "fake-sql";

/// Records the current password of every identity it has been asked to set.
pub struct FakeRotationProvider {
	passwords: Mutex<HashMap<String, String>>,
	pub reject: AtomicBool,
	pub reject_message: Mutex<String>,
	pub hang: AtomicBool,
}

impl Default for FakeRotationProvider {
	fn default() -> Self {
		Self {
			passwords: Mutex::new(HashMap::new()),
			reject: AtomicBool::new(false),
			reject_message: Mutex::new("password too weak".to_string()),
			hang: AtomicBool::new(false),
		}
	}
}

impl FakeRotationProvider {
	pub fn password_for(&self, identity: &str) -> Option<String> {
		self.passwords.lock().unwrap().get(identity).cloned()
	}
}

#[async_trait]
impl RotationProvider for FakeRotationProvider {
	fn rotation_type(&self) -> &str {
		FAKE_ROTATION_TYPE
	}

	async fn apply_credential(
		&self,
		_parameters: &serde_json::Value,
		identity: &str,
		new_secret: &SecretString,
	) -> Result<(), ProviderError> {
		if self.hang.load(Ordering::SeqCst) {
			tokio::time::sleep(Duration::from_secs(60)).await;
		}
		if self.reject.load(Ordering::SeqCst) {
			return Err(ProviderError::Rejected(self.reject_message.lock().unwrap().clone()));
		}
		self.passwords
			.lock()
			.unwrap()
			.insert(identity.to_string(), new_secret.expose().clone());
		Ok(())
	}
}

pub struct Harness {
	pub pool: SqlitePool,
	pub store: Arc<RotationRepository>,
	pub locks: Arc<RotationLockRepository>,
	pub provider: Arc<FakeRotationProvider>,
	pub master_key: MasterKey,
	pub service: RotationService,
	pub executor: RotationExecutor,
}

impl Harness {
	pub fn scheduler(&self, sender: mpsc::Sender<RotationTask>) -> RotationScheduler {
		self.service.scheduler_with_sender(sender)
	}
}

pub async fn harness() -> Harness {
	let pool = create_test_pool().await;
	let store = Arc::new(RotationRepository::new(pool.clone()));
	let locks = Arc::new(RotationLockRepository::new(pool.clone()));
	let provider = Arc::new(FakeRotationProvider::default());
	let mut registry = RotationProviderRegistry::new();
	registry.register(provider.clone());
	let master_key = MasterKey::generate();

	let service = RotationService::new(
		store.clone(),
		locks.clone(),
		registry,
		master_key.clone(),
		RotationServiceConfig {
			provider_timeout: Duration::from_millis(200),
			lock_ttl: Duration::from_secs(60),
			queue_capacity: 8,
		},
	);
	let executor = service.executor().clone();

	Harness {
		pool,
		store,
		locks,
		provider,
		master_key,
		service,
		executor,
	}
}

pub fn new_rotation(name: &str) -> NewRotation {
	NewRotation {
		name: name.to_string(),
		rotation_type: FAKE_ROTATION_TYPE.to_string(),
		interval_secs: 3600,
		parameters: serde_json::json!({"host": "db.internal", "database": name}),
		generation: PasswordRequirements::default(),
		identities: [format!("{name}_a"), format!("{name}_b")],
	}
}

/// Moves `last_rotated_at` into the past.
pub async fn backdate(pool: &SqlitePool, id: RotationId, secs: i64) {
	sqlx::query("UPDATE rotation_configurations SET last_rotated_at = ? WHERE id = ?")
		.bind(format_timestamp(now() - ChronoDuration::seconds(secs)))
		.bind(id.to_string())
		.execute(pool)
		.await
		.unwrap();
}
