// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use warden_credentials_core::CredentialId;
use warden_server_db::DbError;

/// Failures surfaced by the lockout guard and credential manager.
///
/// Entity-state variants are terminal for the call; nothing here is retried
/// internally.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
	/// Same shape for unknown credentials and wrong secrets.
	#[error("invalid credential")]
	InvalidCredential,

	#[error("too many failed attempts, retry after {retry_after_secs}s")]
	Locked { retry_after_secs: u64 },

	#[error("credential expired")]
	Expired,

	#[error("credential usage limit reached")]
	UsesExceeded,

	#[error("credential revoked")]
	Revoked,

	#[error("renewal would exceed the maximum TTL")]
	MaxTtlExceeded,

	#[error("credential cannot be renewed")]
	NotRenewable,

	#[error("credential not found: {0}")]
	NotFound(CredentialId),

	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error("hashing failed: {0}")]
	Hashing(String),

	#[error(transparent)]
	Database(#[from] DbError),
}

impl From<sqlx::Error> for AuthError {
	fn from(e: sqlx::Error) -> Self {
		AuthError::Database(DbError::Sqlx(e))
	}
}

pub type Result<T> = std::result::Result<T, AuthError>;
