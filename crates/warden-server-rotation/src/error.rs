// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use warden_credentials_core::{PasswordPolicyError, ProviderError, RotationId};
use warden_server_db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum RotationError {
	#[error("rotation configuration not found: {0}")]
	NotFound(RotationId),

	#[error("rotation already in progress for {0}")]
	InProgress(RotationId),

	#[error("no rotation provider registered for type {0:?}")]
	UnknownProvider(String),

	#[error("provider unavailable: {0}")]
	ProviderUnavailable(String),

	#[error("provider rejected request: {0}")]
	ProviderRejected(String),

	/// The generator produced, or was asked for, a value outside policy.
	#[error("generation policy violation: {0}")]
	GenerationPolicyViolation(#[from] PasswordPolicyError),

	#[error("encryption failed: {0}")]
	Encryption(String),

	#[error("decryption failed: {0}")]
	Decryption(String),

	#[error("invalid key size: expected {expected}, got {actual}")]
	InvalidKeySize { expected: usize, actual: usize },

	#[error("configuration changed during rotation: {0}")]
	Conflict(String),

	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error(transparent)]
	Database(#[from] DbError),
}

impl From<ProviderError> for RotationError {
	fn from(e: ProviderError) -> Self {
		match e {
			ProviderError::Unavailable(msg) => RotationError::ProviderUnavailable(msg),
			ProviderError::Rejected(msg) => RotationError::ProviderRejected(msg),
		}
	}
}

impl From<sqlx::Error> for RotationError {
	fn from(e: sqlx::Error) -> Self {
		RotationError::Database(DbError::Sqlx(e))
	}
}

impl From<serde_json::Error> for RotationError {
	fn from(e: serde_json::Error) -> Self {
		RotationError::Database(DbError::Serialization(e))
	}
}

pub type Result<T> = std::result::Result<T, RotationError>;
