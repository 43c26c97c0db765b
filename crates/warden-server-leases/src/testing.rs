// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory lease provider for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warden_common_secret::SecretString;
use warden_credentials_core::ProviderError;
use warden_server_db::testing::create_test_pool;
use warden_server_db::SqlitePool;

use crate::manager::{LeaseManager, LeaseManagerConfig, NewDynamicSecret};
use crate::provider::{ExtendOutcome, LeaseProvider, LeaseProviderRegistry, ProvisionedCredential};
use crate::repository::LeaseRepository;

pub const FAKE_PROVIDER: &str = "fake";

#[derive(Default)]
pub struct FakeProvider {
	pub live: Mutex<HashSet<String>>,
	pub fail_provision: AtomicBool,
	pub fail_teardown: AtomicBool,
	pub hang_extend: AtomicBool,
	pub supports_extend: AtomicBool,
	pub teardowns: AtomicU64,
	counter: AtomicU64,
}

#[async_trait]
impl LeaseProvider for FakeProvider {
	fn provider_type(&self) -> &str {
		FAKE_PROVIDER
	}

	async fn provision(
		&self,
		_parameters: &serde_json::Value,
		_expires_at: DateTime<Utc>,
	) -> Result<ProvisionedCredential, ProviderError> {
		if self.fail_provision.load(Ordering::SeqCst) {
			return Err(ProviderError::Rejected("role quota exceeded".to_string()));
		}
		let n = self.counter.fetch_add(1, Ordering::SeqCst);
		let external_ref = format!("user-{n}");
		self.live.lock().unwrap().insert(external_ref.clone());
		Ok(ProvisionedCredential {
			external_ref,
			credentials: SecretString::new(format!("{{\"password\":\"pw-{n}\"}}")),
		})
	}

	async fn extend(
		&self,
		_parameters: &serde_json::Value,
		_external_ref: &str,
		_expires_at: DateTime<Utc>,
	) -> Result<ExtendOutcome, ProviderError> {
		if self.hang_extend.load(Ordering::SeqCst) {
			tokio::time::sleep(Duration::from_secs(60)).await;
		}
		if self.supports_extend.load(Ordering::SeqCst) {
			Ok(ExtendOutcome::Extended)
		} else {
			Ok(ExtendOutcome::Unsupported)
		}
	}

	async fn teardown(
		&self,
		_parameters: &serde_json::Value,
		external_ref: &str,
	) -> Result<(), ProviderError> {
		self.teardowns.fetch_add(1, Ordering::SeqCst);
		if self.fail_teardown.load(Ordering::SeqCst) {
			return Err(ProviderError::Unavailable("connection refused".to_string()));
		}
		self.live.lock().unwrap().remove(external_ref);
		Ok(())
	}
}

pub struct Harness {
	pub manager: LeaseManager,
	pub provider: Arc<FakeProvider>,
	pub pool: SqlitePool,
}

pub async fn harness(config: LeaseManagerConfig) -> Harness {
	let pool = create_test_pool().await;
	let provider = Arc::new(FakeProvider::default());
	let mut registry = LeaseProviderRegistry::new();
	registry.register(provider.clone());
	let repo = Arc::new(LeaseRepository::new(pool.clone()));
	let manager = LeaseManager::new(repo.clone(), repo, registry, config);
	Harness {
		manager,
		provider,
		pool,
	}
}

pub fn new_secret(default_ttl: u64, max_ttl: u64) -> NewDynamicSecret {
	NewDynamicSecret {
		name: format!("pg-{}", uuid_like()),
		provider_type: FAKE_PROVIDER.to_string(),
		parameters: serde_json::json!({"host": "db.internal"}),
		default_ttl_secs: default_ttl,
		max_ttl_secs: max_ttl,
	}
}

fn uuid_like() -> u64 {
	static NEXT: AtomicU64 = AtomicU64::new(0);
	NEXT.fetch_add(1, Ordering::SeqCst)
}
