// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use warden_common_secret::SecretString;
use warden_credentials_core::{
	generate_password, CredentialSlot, PasswordRequirements, RotationConfiguration, RotationId,
	RotationStatus, SlotIndex,
};
use warden_server_db::{now, to_db_int, DbError};

use crate::encryption::MasterKey;
use crate::error::{Result, RotationError};
use crate::executor::{RotationExecutor, RotationOutcome};
use crate::lock::RotationLockStore;
use crate::provider::{bounded, RotationProviderRegistry};
use crate::repository::RotationStore;
use crate::scheduler::{RotationScheduler, RotationTask, RotationWorker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationServiceConfig {
	pub provider_timeout: Duration,
	/// Must outlive `provider_timeout`, or a live cycle can lose its lock.
	pub lock_ttl: Duration,
	pub queue_capacity: usize,
}

impl Default for RotationServiceConfig {
	fn default() -> Self {
		Self {
			provider_timeout: Duration::from_secs(30),
			lock_ttl: Duration::from_secs(600),
			queue_capacity: 256,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRotation {
	pub name: String,
	pub rotation_type: String,
	pub interval_secs: u64,
	pub parameters: serde_json::Value,
	#[serde(default)]
	pub generation: PasswordRequirements,
	/// The two pre-provisioned identities at the target system.
	pub identities: [String; 2],
}

/// Operator-facing view of a configuration. Carries no secret material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationStatusView {
	pub id: RotationId,
	pub name: String,
	pub rotation_type: String,
	pub status: RotationStatus,
	pub active_slot: SlotIndex,
	pub active_identity: String,
	pub interval_secs: u64,
	pub last_rotated_at: Option<DateTime<Utc>>,
	pub next_rotation_at: Option<DateTime<Utc>>,
	pub last_failure_message: Option<String>,
	pub locked_by: Option<String>,
}

fn lock_ttl(config: &RotationServiceConfig) -> ChronoDuration {
	ChronoDuration::seconds(to_db_int(config.lock_ttl.as_secs()))
}

/// Entry point for configuring and inspecting rotations.
#[derive(Clone)]
pub struct RotationService {
	store: Arc<dyn RotationStore>,
	locks: Arc<dyn RotationLockStore>,
	providers: Arc<RotationProviderRegistry>,
	master_key: Arc<MasterKey>,
	executor: RotationExecutor,
	config: RotationServiceConfig,
}

impl RotationService {
	pub fn new(
		store: Arc<dyn RotationStore>,
		locks: Arc<dyn RotationLockStore>,
		providers: RotationProviderRegistry,
		master_key: MasterKey,
		config: RotationServiceConfig,
	) -> Self {
		let providers = Arc::new(providers);
		let master_key = Arc::new(master_key);
		let executor = RotationExecutor::new(
			store.clone(),
			locks.clone(),
			providers.clone(),
			master_key.clone(),
			config.provider_timeout,
			lock_ttl(&config),
		);
		Self {
			store,
			locks,
			providers,
			master_key,
			executor,
			config,
		}
	}

	pub fn executor(&self) -> &RotationExecutor {
		&self.executor
	}

	fn lock_ttl(&self) -> ChronoDuration {
		lock_ttl(&self.config)
	}

	/// Builds a scheduler and the worker that drains its queue.
	pub fn scheduler(&self) -> (RotationScheduler, RotationWorker) {
		let (sender, receiver) = mpsc::channel(self.config.queue_capacity.max(1));
		(
			self.scheduler_with_sender(sender),
			RotationWorker::new(receiver, self.executor.clone()),
		)
	}

	pub fn scheduler_with_sender(&self, sender: mpsc::Sender<RotationTask>) -> RotationScheduler {
		RotationScheduler::new(self.store.clone(), self.locks.clone(), sender, self.lock_ttl())
	}

	/// Registers a configuration and provisions a fresh secret on both
	/// identities, so either slot is valid from the start.
	#[tracing::instrument(skip(self, request), fields(name = %request.name, rotation_type = %request.rotation_type))]
	pub async fn configure_rotation(&self, request: NewRotation) -> Result<RotationConfiguration> {
		if request.name.trim().is_empty() {
			return Err(RotationError::InvalidRequest("name must not be empty".to_string()));
		}
		if request.interval_secs == 0 {
			return Err(RotationError::InvalidRequest("interval must be positive".to_string()));
		}
		let [first, second] = &request.identities;
		if first.trim().is_empty() || second.trim().is_empty() {
			return Err(RotationError::InvalidRequest(
				"slot identities must not be empty".to_string(),
			));
		}
		if first == second {
			return Err(RotationError::InvalidRequest(
				"slot identities must differ".to_string(),
			));
		}
		request
			.generation
			.validate()
			.map_err(|e| RotationError::InvalidRequest(e.to_string()))?;
		let provider = self
			.providers
			.get(&request.rotation_type)
			.ok_or_else(|| RotationError::UnknownProvider(request.rotation_type.clone()))?;

		let mut slots = Vec::with_capacity(2);
		for identity in &request.identities {
			let secret = generate_password(&request.generation)?;
			let sealed_secret = self.master_key.seal(&secret)?;
			bounded(
				self.config.provider_timeout,
				provider.apply_credential(&request.parameters, identity, &secret),
			)
			.await
			.map_err(|e| {
				tracing::warn!(identity = %identity, error = %e, "initial credential apply failed");
				RotationError::from(e)
			})?;
			slots.push(CredentialSlot {
				identity: identity.clone(),
				sealed_secret,
			});
		}
		let slots: [CredentialSlot; 2] = slots
			.try_into()
			.map_err(|_| RotationError::InvalidRequest("expected two slots".to_string()))?;

		let now = now();
		let config = RotationConfiguration {
			id: RotationId::generate(),
			name: request.name,
			rotation_type: request.rotation_type,
			interval_secs: request.interval_secs,
			parameters: request.parameters,
			generation: request.generation,
			slots,
			active_slot: SlotIndex::Zero,
			status: RotationStatus::Idle,
			last_rotated_at: Some(now),
			last_failure_message: None,
			version: 1,
			created_at: now,
			updated_at: now,
		};
		self.store.insert(&config).await.map_err(|e| match e {
			DbError::Conflict(msg) => RotationError::InvalidRequest(msg),
			other => other.into(),
		})?;

		tracing::info!(config_id = %config.id, "rotation configured");
		Ok(config)
	}

	/// Runs a cycle immediately, outside the schedule. Fails with
	/// `InProgress` if any worker holds the configuration's lock.
	#[tracing::instrument(skip(self), fields(config_id = %id))]
	pub async fn trigger_rotation_now(&self, id: RotationId) -> Result<RotationOutcome> {
		if self.store.get(id).await?.is_none() {
			return Err(RotationError::NotFound(id));
		}

		let holder = format!("manual-{}", uuid::Uuid::new_v4());
		if !self.locks.acquire(id, &holder, now(), self.lock_ttl()).await? {
			return Err(RotationError::InProgress(id));
		}

		self.executor.execute(id, &holder).await
	}

	pub async fn get_rotation_status(&self, id: RotationId) -> Result<RotationStatusView> {
		let config = self.store.get(id).await?.ok_or(RotationError::NotFound(id))?;
		self.view(config).await
	}

	pub async fn list_rotations(&self) -> Result<Vec<RotationStatusView>> {
		let mut views = Vec::new();
		for config in self.store.list().await? {
			views.push(self.view(config).await?);
		}
		Ok(views)
	}

	#[tracing::instrument(skip(self), fields(config_id = %id))]
	pub async fn delete_rotation(&self, id: RotationId) -> Result<()> {
		if !self.store.delete(id).await? {
			return Err(RotationError::NotFound(id));
		}
		tracing::info!("rotation deleted");
		Ok(())
	}

	/// Decrypts the secret consumers should currently be using.
	#[tracing::instrument(skip(self), fields(config_id = %id))]
	pub async fn reveal_active_secret(&self, id: RotationId) -> Result<(String, SecretString)> {
		let config = self.store.get(id).await?.ok_or(RotationError::NotFound(id))?;
		let active = config.active();
		let secret = self.master_key.open(&active.sealed_secret)?;
		Ok((active.identity.clone(), secret))
	}

	async fn view(&self, config: RotationConfiguration) -> Result<RotationStatusView> {
		let locked_by = self
			.locks
			.get(config.id)
			.await?
			.filter(|lock| lock.expires_at > now())
			.map(|lock| lock.holder);
		Ok(RotationStatusView {
			id: config.id,
			active_identity: config.active().identity.clone(),
			next_rotation_at: config.next_rotation_at(),
			name: config.name,
			rotation_type: config.rotation_type,
			status: config.status,
			active_slot: config.active_slot,
			interval_secs: config.interval_secs,
			last_rotated_at: config.last_rotated_at,
			last_failure_message: config.last_failure_message,
			locked_by,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{harness, new_rotation, FAKE_ROTATION_TYPE};
	use std::sync::atomic::Ordering;
	use warden_credentials_core::RequiredCharacters;

	#[tokio::test]
	async fn configure_provisions_both_identities() {
		let h = harness().await;
		let config = h.service.configure_rotation(new_rotation("orders")).await.unwrap();

		assert_eq!(config.active_slot, SlotIndex::Zero);
		assert_eq!(config.status, RotationStatus::Idle);
		assert!(config.last_rotated_at.is_some());
		for slot in &config.slots {
			let applied = h.provider.password_for(&slot.identity).unwrap();
			let sealed = h.master_key.open(&slot.sealed_secret).unwrap();
			assert_eq!(sealed.expose(), &applied);
			assert!(config.generation.is_satisfied_by(&applied));
		}
	}

	#[tokio::test]
	async fn configure_rejects_invalid_requests() {
		let h = harness().await;

		let mut same = new_rotation("orders");
		same.identities = ["app".to_string(), "app".to_string()];
		assert!(matches!(
			h.service.configure_rotation(same).await,
			Err(RotationError::InvalidRequest(_))
		));

		let mut zero = new_rotation("orders");
		zero.interval_secs = 0;
		assert!(matches!(
			h.service.configure_rotation(zero).await,
			Err(RotationError::InvalidRequest(_))
		));

		let mut impossible = new_rotation("orders");
		impossible.generation = PasswordRequirements {
			length: 2,
			required: RequiredCharacters {
				lowercase: 2,
				uppercase: 1,
				digits: 0,
				symbols: 0,
			},
			allowed_symbols: None,
		};
		assert!(matches!(
			h.service.configure_rotation(impossible).await,
			Err(RotationError::InvalidRequest(_))
		));

		let mut unknown = new_rotation("orders");
		unknown.rotation_type = "ldap".to_string();
		assert!(matches!(
			h.service.configure_rotation(unknown).await,
			Err(RotationError::UnknownProvider(_))
		));
		assert!(h.service.list_rotations().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn configure_rejects_duplicate_names() {
		let h = harness().await;
		h.service.configure_rotation(new_rotation("orders")).await.unwrap();
		assert!(matches!(
			h.service.configure_rotation(new_rotation("orders")).await,
			Err(RotationError::InvalidRequest(_))
		));
	}

	#[tokio::test]
	async fn configure_fails_when_target_rejects() {
		let h = harness().await;
		h.provider.reject.store(true, Ordering::SeqCst);
		let err = h.service.configure_rotation(new_rotation("orders")).await.unwrap_err();
		assert!(matches!(err, RotationError::ProviderRejected(_)));
		assert!(h.service.list_rotations().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn trigger_now_rotates_and_reports_status() {
		let h = harness().await;
		let config = h.service.configure_rotation(new_rotation("orders")).await.unwrap();

		let outcome = h.service.trigger_rotation_now(config.id).await.unwrap();
		assert_eq!(outcome.active_slot, SlotIndex::One);

		let view = h.service.get_rotation_status(config.id).await.unwrap();
		assert_eq!(view.status, RotationStatus::Idle);
		assert_eq!(view.active_identity, config.slots[1].identity);
		assert_eq!(view.rotation_type, FAKE_ROTATION_TYPE);
		assert_eq!(view.last_rotated_at, Some(outcome.rotated_at));
		assert_eq!(
			view.next_rotation_at,
			Some(outcome.rotated_at + ChronoDuration::seconds(3600))
		);
		assert!(view.locked_by.is_none());
	}

	#[tokio::test]
	async fn trigger_now_refuses_while_locked() {
		let h = harness().await;
		let config = h.service.configure_rotation(new_rotation("orders")).await.unwrap();
		h.locks
			.acquire(config.id, "worker-a", now(), ChronoDuration::seconds(600))
			.await
			.unwrap();

		assert!(matches!(
			h.service.trigger_rotation_now(config.id).await,
			Err(RotationError::InProgress(_))
		));
		let view = h.service.get_rotation_status(config.id).await.unwrap();
		assert_eq!(view.locked_by.as_deref(), Some("worker-a"));
	}

	#[tokio::test]
	async fn trigger_now_unknown_configuration() {
		let h = harness().await;
		assert!(matches!(
			h.service.trigger_rotation_now(RotationId::generate()).await,
			Err(RotationError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn failed_trigger_is_visible_in_status() {
		let h = harness().await;
		let config = h.service.configure_rotation(new_rotation("orders")).await.unwrap();
		h.provider.reject.store(true, Ordering::SeqCst);

		h.service.trigger_rotation_now(config.id).await.unwrap_err();
		let view = h.service.get_rotation_status(config.id).await.unwrap();
		assert_eq!(view.status, RotationStatus::Failed);
		assert_eq!(view.active_slot, SlotIndex::Zero);
		assert!(view.last_failure_message.unwrap().contains("password too weak"));
	}

	#[tokio::test]
	async fn delete_removes_configuration_and_lock() {
		let h = harness().await;
		let config = h.service.configure_rotation(new_rotation("orders")).await.unwrap();
		h.locks
			.acquire(config.id, "worker-a", now(), ChronoDuration::seconds(600))
			.await
			.unwrap();

		h.service.delete_rotation(config.id).await.unwrap();
		assert!(h.locks.get(config.id).await.unwrap().is_none());
		assert!(matches!(
			h.service.get_rotation_status(config.id).await,
			Err(RotationError::NotFound(_))
		));
		assert!(matches!(
			h.service.delete_rotation(config.id).await,
			Err(RotationError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn list_is_ordered_by_name() {
		let h = harness().await;
		h.service.configure_rotation(new_rotation("orders")).await.unwrap();
		h.service.configure_rotation(new_rotation("billing")).await.unwrap();

		let names: Vec<_> = h
			.service
			.list_rotations()
			.await
			.unwrap()
			.into_iter()
			.map(|v| v.name)
			.collect();
		assert_eq!(names, vec!["billing", "orders"]);
	}
}
