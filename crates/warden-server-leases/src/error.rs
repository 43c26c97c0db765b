// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use warden_credentials_core::{DynamicSecretId, LeaseId, ProviderError};
use warden_server_db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
	#[error("lease not found: {0}")]
	NotFound(LeaseId),

	#[error("dynamic secret not found: {0}")]
	DynamicSecretNotFound(DynamicSecretId),

	#[error("lease is not active")]
	NotActive,

	#[error("requested TTL exceeds the dynamic secret's maximum TTL")]
	MaxTtlExceeded,

	#[error("dynamic secret already has {limit} active leases")]
	LeaseLimitReached { limit: u32 },

	#[error("dynamic secret still has {0} active or orphaned leases")]
	HasActiveLeases(u64),

	#[error("no lease provider registered for type {0:?}")]
	UnknownProvider(String),

	#[error("provider unavailable: {0}")]
	ProviderUnavailable(String),

	#[error("provider rejected request: {0}")]
	ProviderRejected(String),

	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error(transparent)]
	Database(#[from] DbError),
}

impl From<ProviderError> for LeaseError {
	fn from(e: ProviderError) -> Self {
		match e {
			ProviderError::Unavailable(msg) => LeaseError::ProviderUnavailable(msg),
			ProviderError::Rejected(msg) => LeaseError::ProviderRejected(msg),
		}
	}
}

impl From<sqlx::Error> for LeaseError {
	fn from(e: sqlx::Error) -> Self {
		LeaseError::Database(DbError::Sqlx(e))
	}
}

pub type Result<T> = std::result::Result<T, LeaseError>;
