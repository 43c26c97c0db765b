// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The Rotation Provider collaborator and its registry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use warden_common_secret::SecretString;
use warden_credentials_core::ProviderError;

/// Applies a new secret to an identity at one kind of target system.
#[async_trait]
pub trait RotationProvider: Send + Sync {
	fn rotation_type(&self) -> &str;

	/// Sets `new_secret` as the credential for `identity`. Must leave the
	/// other slot's identity untouched.
	async fn apply_credential(
		&self,
		parameters: &serde_json::Value,
		identity: &str,
		new_secret: &SecretString,
	) -> Result<(), ProviderError>;
}

#[derive(Clone, Default)]
pub struct RotationProviderRegistry {
	providers: HashMap<String, Arc<dyn RotationProvider>>,
}

impl RotationProviderRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, provider: Arc<dyn RotationProvider>) {
		tracing::debug!(rotation_type = provider.rotation_type(), "rotation provider registered");
		self.providers
			.insert(provider.rotation_type().to_string(), provider);
	}

	pub fn get(&self, rotation_type: &str) -> Option<Arc<dyn RotationProvider>> {
		self.providers.get(rotation_type).cloned()
	}
}

/// Bounds a provider call. A timeout is reported as `Unavailable`.
pub(crate) async fn bounded<T>(
	timeout: Duration,
	call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
	tokio::time::timeout(timeout, call).await.unwrap_or_else(|_| {
		Err(ProviderError::Unavailable(format!(
			"provider call timed out after {}s",
			timeout.as_secs()
		)))
	})
}
