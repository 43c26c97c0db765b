// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use warden_common_secret::SecretString;
use warden_credentials_core::{
	add_secs, DynamicSecret, DynamicSecretId, DynamicSecretLease, LeaseId, LeaseStatus, MAX_TTL_SECS,
};
use warden_server_db::{now, DbError};

use crate::error::{LeaseError, Result};
use crate::provider::{bounded, ExtendOutcome, LeaseProvider, LeaseProviderRegistry};
use crate::repository::{DynamicSecretStore, LeaseStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseManagerConfig {
	pub provider_timeout: Duration,
	pub max_leases_per_secret: u32,
	pub reaper_batch_size: u32,
}

impl Default for LeaseManagerConfig {
	fn default() -> Self {
		Self {
			provider_timeout: Duration::from_secs(10),
			max_leases_per_secret: 50,
			reaper_batch_size: 100,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDynamicSecret {
	pub name: String,
	pub provider_type: String,
	pub parameters: serde_json::Value,
	pub default_ttl_secs: u64,
	/// 0 leaves lease lifetimes unbounded.
	pub max_ttl_secs: u64,
}

/// A new lease and the credential material the provider minted for it.
#[derive(Debug)]
pub struct IssuedLease {
	pub lease: DynamicSecretLease,
	pub credentials: SecretString,
}

/// Result of a revoke. `warning` is set when the external credential could
/// not be torn down and may be orphaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokeOutcome {
	pub lease: DynamicSecretLease,
	pub warning: Option<String>,
}

/// Provisions, renews and revokes provider-backed leases.
#[derive(Clone)]
pub struct LeaseManager {
	secrets: Arc<dyn DynamicSecretStore>,
	leases: Arc<dyn LeaseStore>,
	providers: LeaseProviderRegistry,
	config: LeaseManagerConfig,
}

impl LeaseManager {
	pub fn new(
		secrets: Arc<dyn DynamicSecretStore>,
		leases: Arc<dyn LeaseStore>,
		providers: LeaseProviderRegistry,
		config: LeaseManagerConfig,
	) -> Self {
		Self {
			secrets,
			leases,
			providers,
			config,
		}
	}

	pub fn config(&self) -> &LeaseManagerConfig {
		&self.config
	}

	#[tracing::instrument(skip(self, request), fields(name = %request.name, provider_type = %request.provider_type))]
	pub async fn create_dynamic_secret(&self, request: NewDynamicSecret) -> Result<DynamicSecret> {
		if request.name.trim().is_empty() {
			return Err(LeaseError::InvalidRequest("name must not be empty".to_string()));
		}
		if self.providers.get(&request.provider_type).is_none() {
			return Err(LeaseError::UnknownProvider(request.provider_type));
		}
		if request.default_ttl_secs == 0 {
			return Err(LeaseError::InvalidRequest("default TTL must be positive".to_string()));
		}
		if request.default_ttl_secs > MAX_TTL_SECS || request.max_ttl_secs > MAX_TTL_SECS {
			return Err(LeaseError::InvalidRequest(format!(
				"TTLs must not exceed {MAX_TTL_SECS}s"
			)));
		}
		if request.max_ttl_secs > 0 && request.default_ttl_secs > request.max_ttl_secs {
			return Err(LeaseError::InvalidRequest(
				"default TTL exceeds max TTL".to_string(),
			));
		}

		let secret = DynamicSecret {
			id: DynamicSecretId::generate(),
			name: request.name,
			provider_type: request.provider_type,
			parameters: request.parameters,
			default_ttl_secs: request.default_ttl_secs,
			max_ttl_secs: request.max_ttl_secs,
			created_at: now(),
		};
		self.secrets.insert_dynamic_secret(&secret).await.map_err(|e| match e {
			DbError::Conflict(msg) => LeaseError::InvalidRequest(msg),
			other => other.into(),
		})?;

		tracing::info!(dynamic_secret_id = %secret.id, "dynamic secret created");
		Ok(secret)
	}

	pub async fn get_dynamic_secret(&self, id: DynamicSecretId) -> Result<DynamicSecret> {
		self.secrets
			.get_dynamic_secret(id)
			.await?
			.ok_or(LeaseError::DynamicSecretNotFound(id))
	}

	pub async fn list_dynamic_secrets(&self) -> Result<Vec<DynamicSecret>> {
		Ok(self.secrets.list_dynamic_secrets().await?)
	}

	#[tracing::instrument(skip(self), fields(dynamic_secret_id = %id))]
	pub async fn delete_dynamic_secret(&self, id: DynamicSecretId) -> Result<()> {
		match self.secrets.delete_dynamic_secret(id).await? {
			Ok(true) => {
				tracing::info!("dynamic secret deleted");
				Ok(())
			}
			Ok(false) => Err(LeaseError::DynamicSecretNotFound(id)),
			Err(blocking) => Err(LeaseError::HasActiveLeases(blocking)),
		}
	}

	/// Provisions an external credential and records it as an active lease.
	/// Nothing is persisted unless provisioning succeeds.
	#[tracing::instrument(skip(self), fields(dynamic_secret_id = %dynamic_secret_id))]
	pub async fn create_lease(
		&self,
		dynamic_secret_id: DynamicSecretId,
		ttl_secs: Option<u64>,
	) -> Result<IssuedLease> {
		let secret = self.get_dynamic_secret(dynamic_secret_id).await?;
		let ttl = ttl_secs.unwrap_or(secret.default_ttl_secs);
		if ttl == 0 {
			return Err(LeaseError::InvalidRequest("TTL must be positive".to_string()));
		}
		if secret.max_ttl_secs > 0 && ttl > secret.max_ttl_secs {
			return Err(LeaseError::MaxTtlExceeded);
		}

		let limit = self.config.max_leases_per_secret;
		if self.leases.count_active_leases(dynamic_secret_id).await? >= u64::from(limit) {
			return Err(LeaseError::LeaseLimitReached { limit });
		}

		let provider = self.provider(&secret)?;
		let now = now();
		let expires_at = expiry_after(now, ttl)?;
		let provisioned = bounded(
			self.config.provider_timeout,
			provider.provision(&secret.parameters, expires_at),
		)
		.await
		.map_err(|e| {
			tracing::warn!(error = %e, "lease provisioning failed");
			LeaseError::from(e)
		})?;

		let lease = DynamicSecretLease {
			id: LeaseId::generate(),
			dynamic_secret_id,
			external_ref: provisioned.external_ref,
			status: LeaseStatus::Active,
			expires_at,
			renewal_count: 0,
			teardown_error: None,
			created_at: now,
			updated_at: now,
		};

		let inserted = match self.leases.insert_lease_within_limit(&lease, limit).await {
			Ok(inserted) => inserted,
			Err(e) => {
				self.discard(&*provider, &secret, &lease.external_ref).await;
				return Err(e.into());
			}
		};
		if !inserted {
			self.discard(&*provider, &secret, &lease.external_ref).await;
			return Err(LeaseError::LeaseLimitReached { limit });
		}

		tracing::info!(lease_id = %lease.id, expires_at = %lease.expires_at, "lease created");
		Ok(IssuedLease {
			lease,
			credentials: provisioned.credentials,
		})
	}

	/// Extends an active lease by `extension_secs` (default TTL when `None`)
	/// from now, clamped to the dynamic secret's max TTL measured from lease
	/// creation. A provider failure or timeout leaves the lease unextended.
	#[tracing::instrument(skip(self), fields(lease_id = %lease_id))]
	pub async fn renew_lease(
		&self,
		lease_id: LeaseId,
		extension_secs: Option<u64>,
	) -> Result<DynamicSecretLease> {
		let lease = self.leases.get_lease(lease_id).await?.ok_or(LeaseError::NotFound(lease_id))?;
		let now = now();
		if !lease.is_live(now) {
			return Err(LeaseError::NotActive);
		}

		let secret = self.get_dynamic_secret(lease.dynamic_secret_id).await?;
		let extension = extension_secs.unwrap_or(secret.default_ttl_secs);
		if extension == 0 {
			return Err(LeaseError::InvalidRequest("extension must be positive".to_string()));
		}

		let mut expires_at = expiry_after(now, extension)?;
		if let Some(deadline) = secret.lease_deadline(lease.created_at) {
			if lease.expires_at >= deadline {
				return Err(LeaseError::MaxTtlExceeded);
			}
			expires_at = expires_at.min(deadline);
		}

		let provider = self.provider(&secret)?;
		let outcome = bounded(
			self.config.provider_timeout,
			provider.extend(&secret.parameters, &lease.external_ref, expires_at),
		)
		.await
		.map_err(|e| {
			tracing::warn!(error = %e, "lease extension failed");
			LeaseError::from(e)
		})?;
		if outcome == ExtendOutcome::Unsupported {
			tracing::debug!("provider has no expiry; extending locally");
		}

		if !self.leases.extend_lease(lease_id, expires_at, now).await? {
			return Err(LeaseError::NotActive);
		}

		tracing::info!(expires_at = %expires_at, "lease renewed");
		Ok(DynamicSecretLease {
			expires_at,
			renewal_count: lease.renewal_count.saturating_add(1),
			updated_at: now,
			..lease
		})
	}

	/// Idempotent revoke. The lease is marked revoked before teardown so a
	/// provider failure cannot leave it active; the failure is returned as a
	/// warning and the lease is tracked as orphaned.
	#[tracing::instrument(skip(self), fields(lease_id = %lease_id))]
	pub async fn revoke_lease(&self, lease_id: LeaseId) -> Result<RevokeOutcome> {
		let lease = self.leases.get_lease(lease_id).await?.ok_or(LeaseError::NotFound(lease_id))?;
		if lease.status.is_terminal() {
			return Ok(RevokeOutcome {
				lease,
				warning: None,
			});
		}

		let now = now();
		if !self.leases.finish_lease(lease_id, LeaseStatus::Revoked, now).await? {
			// Revoked or reaped concurrently; the winner owns teardown.
			let lease = self.leases.get_lease(lease_id).await?.ok_or(LeaseError::NotFound(lease_id))?;
			return Ok(RevokeOutcome {
				lease,
				warning: None,
			});
		}

		let warning = self.teardown(&lease).await?;
		let lease = self.leases.get_lease(lease_id).await?.ok_or(LeaseError::NotFound(lease_id))?;
		tracing::info!(orphaned = warning.is_some(), "lease revoked");
		Ok(RevokeOutcome { lease, warning })
	}

	/// Active leases are reported as expired once their expiry has passed,
	/// even before the reaper has swept them.
	pub async fn get_lease(&self, lease_id: LeaseId) -> Result<DynamicSecretLease> {
		let lease = self.leases.get_lease(lease_id).await?.ok_or(LeaseError::NotFound(lease_id))?;
		Ok(effective(lease))
	}

	pub async fn list_leases(&self, dynamic_secret_id: DynamicSecretId) -> Result<Vec<DynamicSecretLease>> {
		let leases = self.leases.list_leases(dynamic_secret_id).await?;
		Ok(leases.into_iter().map(effective).collect())
	}

	/// Leases whose external credential failed to tear down.
	pub async fn list_orphaned_leases(&self) -> Result<Vec<DynamicSecretLease>> {
		Ok(self.leases.list_orphaned().await?)
	}

	/// Operator retry of a failed teardown. Clears the orphan marker on
	/// success; a lease that is not orphaned is returned unchanged.
	#[tracing::instrument(skip(self), fields(lease_id = %lease_id))]
	pub async fn retry_teardown(&self, lease_id: LeaseId) -> Result<DynamicSecretLease> {
		let lease = self.leases.get_lease(lease_id).await?.ok_or(LeaseError::NotFound(lease_id))?;
		if !lease.is_orphaned() {
			return Ok(lease);
		}
		if !lease.status.is_terminal() {
			return Err(LeaseError::InvalidRequest(
				"active leases are torn down by revoke".to_string(),
			));
		}

		let secret = self.get_dynamic_secret(lease.dynamic_secret_id).await?;
		let provider = self.provider(&secret)?;
		let result = bounded(
			self.config.provider_timeout,
			provider.teardown(&secret.parameters, &lease.external_ref),
		)
		.await;

		match result {
			Ok(()) => {
				self.leases.set_teardown_error(lease_id, None, now()).await?;
				tracing::info!("orphaned lease cleaned up");
			}
			Err(e) => {
				self.leases
					.set_teardown_error(lease_id, Some(&e.to_string()), now())
					.await?;
				return Err(e.into());
			}
		}

		self.leases.get_lease(lease_id).await?.ok_or(LeaseError::NotFound(lease_id))
	}

	/// Best-effort teardown of a lease this caller has just finished. Returns
	/// the failure message when the external credential may be orphaned.
	pub(crate) async fn teardown(&self, lease: &DynamicSecretLease) -> Result<Option<String>> {
		let outcome = match self.get_dynamic_secret(lease.dynamic_secret_id).await {
			Ok(secret) => match self.provider(&secret) {
				Ok(provider) => bounded(
					self.config.provider_timeout,
					provider.teardown(&secret.parameters, &lease.external_ref),
				)
				.await
				.map_err(|e| e.to_string()),
				Err(e) => Err(e.to_string()),
			},
			Err(e) => Err(e.to_string()),
		};

		match outcome {
			Ok(()) => Ok(None),
			Err(message) => {
				tracing::warn!(
					lease_id = %lease.id,
					external_ref = %lease.external_ref,
					error = %message,
					"lease teardown failed; external credential may be orphaned"
				);
				self.leases
					.set_teardown_error(lease.id, Some(&message), now())
					.await?;
				Ok(Some(message))
			}
		}
	}

	pub(crate) fn leases(&self) -> &Arc<dyn LeaseStore> {
		&self.leases
	}

	fn provider(&self, secret: &DynamicSecret) -> Result<Arc<dyn LeaseProvider>> {
		self.providers
			.get(&secret.provider_type)
			.ok_or_else(|| LeaseError::UnknownProvider(secret.provider_type.clone()))
	}

	async fn discard(&self, provider: &dyn LeaseProvider, secret: &DynamicSecret, external_ref: &str) {
		let result = bounded(
			self.config.provider_timeout,
			provider.teardown(&secret.parameters, external_ref),
		)
		.await;
		if let Err(e) = result {
			tracing::warn!(external_ref, error = %e, "failed to discard unrecorded credential");
		}
	}
}

fn effective(mut lease: DynamicSecretLease) -> DynamicSecretLease {
	if lease.status == LeaseStatus::Active && !lease.is_live(now()) {
		lease.status = LeaseStatus::Expired;
	}
	lease
}

fn expiry_after(now: DateTime<Utc>, secs: u64) -> Result<DateTime<Utc>> {
	if secs > MAX_TTL_SECS {
		return Err(LeaseError::InvalidRequest(format!(
			"TTL must not exceed {MAX_TTL_SECS}s"
		)));
	}
	Ok(add_secs(now, secs))
}
