// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The Lease Provider collaborator and its registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use warden_common_secret::SecretString;
use warden_credentials_core::ProviderError;

/// Credential minted by a provider for a new lease.
#[derive(Debug)]
pub struct ProvisionedCredential {
	/// Provider's handle for the credential, used for extend and teardown.
	pub external_ref: String,
	/// Material handed to the lease holder (e.g. a username/password JSON
	/// document). Never persisted.
	pub credentials: SecretString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendOutcome {
	Extended,
	/// The target system has no expiry of its own; only the local lease is
	/// extended.
	Unsupported,
}

/// Provisions and destroys credentials at one kind of external system.
#[async_trait]
pub trait LeaseProvider: Send + Sync {
	fn provider_type(&self) -> &str;

	async fn provision(
		&self,
		parameters: &serde_json::Value,
		expires_at: DateTime<Utc>,
	) -> Result<ProvisionedCredential, ProviderError>;

	async fn extend(
		&self,
		parameters: &serde_json::Value,
		external_ref: &str,
		expires_at: DateTime<Utc>,
	) -> Result<ExtendOutcome, ProviderError>;

	async fn teardown(
		&self,
		parameters: &serde_json::Value,
		external_ref: &str,
	) -> Result<(), ProviderError>;
}

#[derive(Clone, Default)]
pub struct LeaseProviderRegistry {
	providers: HashMap<String, Arc<dyn LeaseProvider>>,
}

impl LeaseProviderRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, provider: Arc<dyn LeaseProvider>) {
		tracing::debug!(provider_type = provider.provider_type(), "lease provider registered");
		self.providers
			.insert(provider.provider_type().to_string(), provider);
	}

	pub fn get(&self, provider_type: &str) -> Option<Arc<dyn LeaseProvider>> {
		self.providers.get(provider_type).cloned()
	}

	pub fn provider_types(&self) -> Vec<String> {
		let mut types: Vec<_> = self.providers.keys().cloned().collect();
		types.sort();
		types
	}
}

/// Bounds a provider call. A timeout is reported as `Unavailable`.
pub(crate) async fn bounded<T>(
	timeout: Duration,
	call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
	match tokio::time::timeout(timeout, call).await {
		Ok(result) => result,
		Err(_) => Err(ProviderError::Unavailable(format!(
			"provider call timed out after {}s",
			timeout.as_secs()
		))),
	}
}
