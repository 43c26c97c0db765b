// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The dual-slot rotation cycle.
//!
//! A cycle only ever writes to the inactive slot's identity. The active slot
//! keeps serving consumers until the completing write flips `active_slot`, so
//! a failure at any step leaves the previous credential in place.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use warden_credentials_core::{generate_password, CredentialSlot, RotationConfiguration, RotationId, SlotIndex};
use warden_server_db::now;

use crate::encryption::MasterKey;
use crate::error::{Result, RotationError};
use crate::lock::RotationLockStore;
use crate::provider::{bounded, RotationProviderRegistry};
use crate::repository::RotationStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
	pub config_id: RotationId,
	pub active_slot: SlotIndex,
	pub identity: String,
	pub rotated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RotationExecutor {
	store: Arc<dyn RotationStore>,
	locks: Arc<dyn RotationLockStore>,
	providers: Arc<RotationProviderRegistry>,
	master_key: Arc<MasterKey>,
	provider_timeout: Duration,
	lock_ttl: ChronoDuration,
}

impl RotationExecutor {
	pub fn new(
		store: Arc<dyn RotationStore>,
		locks: Arc<dyn RotationLockStore>,
		providers: Arc<RotationProviderRegistry>,
		master_key: Arc<MasterKey>,
		provider_timeout: Duration,
		lock_ttl: ChronoDuration,
	) -> Self {
		Self {
			store,
			locks,
			providers,
			master_key,
			provider_timeout,
			lock_ttl,
		}
	}

	/// Runs one cycle for a configuration whose lock `holder` already owns.
	/// A holder whose lock has expired or been taken over gets `Conflict` and
	/// nothing is rotated. The lock is released on every exit path.
	#[tracing::instrument(skip(self), fields(config_id = %config_id))]
	pub async fn execute(&self, config_id: RotationId, holder: &str) -> Result<RotationOutcome> {
		let result = self.rotate(config_id, holder).await;

		match self.locks.release(config_id, holder).await {
			Ok(true) => {}
			Ok(false) => tracing::warn!(holder, "rotation lock was already taken over"),
			Err(e) => tracing::warn!(error = %e, "failed to release rotation lock"),
		}

		result
	}

	async fn rotate(&self, config_id: RotationId, holder: &str) -> Result<RotationOutcome> {
		if !self
			.locks
			.refresh(config_id, holder, now(), self.lock_ttl)
			.await?
		{
			return Err(RotationError::Conflict(format!(
				"rotation lock for {config_id} is not held by {holder}"
			)));
		}

		let config = self
			.store
			.get(config_id)
			.await?
			.ok_or(RotationError::NotFound(config_id))?;

		let version = self
			.store
			.mark_rotating(config_id, config.version, now())
			.await?
			.ok_or_else(|| RotationError::Conflict(format!("{config_id} changed before rotation started")))?;

		let target = config.active_slot.other();
		let slot = match self.prepare_slot(&config).await {
			Ok(slot) => slot,
			Err(e) => {
				tracing::warn!(
					rotation_type = %config.rotation_type,
					identity = %config.inactive().identity,
					error = %e,
					"rotation cycle failed"
				);
				self.record_failure(config_id, version, &e).await;
				return Err(e);
			}
		};

		let identity = slot.identity.clone();
		let mut slots = config.slots.clone();
		slots[target.as_usize()] = slot;

		let rotated_at = now();
		let completed = match self
			.store
			.complete_rotation(config_id, version, &slots, target, rotated_at)
			.await
		{
			Ok(true) => Ok(()),
			Ok(false) => Err(RotationError::Conflict(format!(
				"{config_id} changed while rotating"
			))),
			Err(e) => Err(RotationError::from(e)),
		};
		if let Err(e) = completed {
			// The target already accepted the new secret for `identity`.
			tracing::error!(identity = %identity, error = %e, "rotated secret could not be stored");
			self.record_failure(config_id, version, &e).await;
			return Err(e);
		}

		tracing::info!(active_slot = ?target, identity = %identity, "rotation succeeded");
		Ok(RotationOutcome {
			config_id,
			active_slot: target,
			identity,
			rotated_at,
		})
	}

	async fn record_failure(&self, config_id: RotationId, version: i64, error: &RotationError) {
		match self
			.store
			.mark_failed(config_id, version, &error.to_string(), now())
			.await
		{
			Ok(true) => {}
			Ok(false) => tracing::warn!("configuration changed; failure not recorded"),
			Err(e) => tracing::warn!(error = %e, "could not record rotation failure"),
		}
	}

	/// Generates, seals, and applies a new secret for the inactive identity.
	async fn prepare_slot(&self, config: &RotationConfiguration) -> Result<CredentialSlot> {
		let provider = self
			.providers
			.get(&config.rotation_type)
			.ok_or_else(|| RotationError::UnknownProvider(config.rotation_type.clone()))?;

		let identity = config.inactive().identity.clone();
		let secret = generate_password(&config.generation)?;
		let sealed_secret = self.master_key.seal(&secret)?;

		bounded(
			self.provider_timeout,
			provider.apply_credential(&config.parameters, &identity, &secret),
		)
		.await?;

		Ok(CredentialSlot {
			identity,
			sealed_secret,
		})
	}
}
