// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Single-flight rotation locks.
//!
//! One row per configuration. Acquisition is a single upsert that only
//! replaces an existing row once it has expired, so a crashed holder stalls a
//! configuration for at most the lock TTL.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePool;
use warden_credentials_core::RotationId;
use warden_server_db::{format_timestamp, parse_timestamp, DbError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationLock {
	pub config_id: RotationId,
	pub holder: String,
	pub acquired_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait RotationLockStore: Send + Sync {
	async fn acquire(
		&self,
		config_id: RotationId,
		holder: &str,
		now: DateTime<Utc>,
		ttl: Duration,
	) -> Result<bool, DbError>;
	/// Extends a live lock still owned by `holder`. An expired or taken-over
	/// lock is not refreshed.
	async fn refresh(
		&self,
		config_id: RotationId,
		holder: &str,
		now: DateTime<Utc>,
		ttl: Duration,
	) -> Result<bool, DbError>;
	async fn release(&self, config_id: RotationId, holder: &str) -> Result<bool, DbError>;
	async fn get(&self, config_id: RotationId) -> Result<Option<RotationLock>, DbError>;
}

#[derive(Clone)]
pub struct RotationLockRepository {
	pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct LockRow {
	config_id: String,
	holder: String,
	acquired_at: String,
	expires_at: String,
}

impl TryFrom<LockRow> for RotationLock {
	type Error = DbError;

	fn try_from(row: LockRow) -> Result<Self, Self::Error> {
		Ok(RotationLock {
			config_id: row
				.config_id
				.parse()
				.map_err(|e| DbError::Internal(format!("Invalid rotation id: {e}")))?,
			holder: row.holder,
			acquired_at: parse_timestamp(&row.acquired_at)?,
			expires_at: parse_timestamp(&row.expires_at)?,
		})
	}
}

impl RotationLockRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self), fields(config_id = %config_id))]
	pub async fn acquire(
		&self,
		config_id: RotationId,
		holder: &str,
		now: DateTime<Utc>,
		ttl: Duration,
	) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			INSERT INTO rotation_locks (config_id, holder, acquired_at, expires_at)
			VALUES (?1, ?2, ?3, ?4)
			ON CONFLICT(config_id) DO UPDATE SET
				holder = excluded.holder,
				acquired_at = excluded.acquired_at,
				expires_at = excluded.expires_at
			WHERE rotation_locks.expires_at <= ?3
			"#,
		)
		.bind(config_id.to_string())
		.bind(holder)
		.bind(format_timestamp(now))
		.bind(format_timestamp(now + ttl))
		.execute(&self.pool)
		.await?;

		let acquired = result.rows_affected() == 1;
		tracing::debug!(acquired, "rotation lock acquire");
		Ok(acquired)
	}

	#[tracing::instrument(skip(self), fields(config_id = %config_id))]
	pub async fn refresh(
		&self,
		config_id: RotationId,
		holder: &str,
		now: DateTime<Utc>,
		ttl: Duration,
	) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE rotation_locks
			SET expires_at = ?
			WHERE config_id = ? AND holder = ? AND expires_at > ?
			"#,
		)
		.bind(format_timestamp(now + ttl))
		.bind(config_id.to_string())
		.bind(holder)
		.bind(format_timestamp(now))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	#[tracing::instrument(skip(self), fields(config_id = %config_id))]
	pub async fn release(&self, config_id: RotationId, holder: &str) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM rotation_locks WHERE config_id = ? AND holder = ?")
			.bind(config_id.to_string())
			.bind(holder)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() == 1)
	}

	pub async fn get(&self, config_id: RotationId) -> Result<Option<RotationLock>, DbError> {
		let row = sqlx::query_as::<_, LockRow>(
			"SELECT config_id, holder, acquired_at, expires_at FROM rotation_locks WHERE config_id = ?",
		)
		.bind(config_id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(RotationLock::try_from).transpose()
	}
}

#[async_trait]
impl RotationLockStore for RotationLockRepository {
	async fn acquire(
		&self,
		config_id: RotationId,
		holder: &str,
		now: DateTime<Utc>,
		ttl: Duration,
	) -> Result<bool, DbError> {
		self.acquire(config_id, holder, now, ttl).await
	}

	async fn refresh(
		&self,
		config_id: RotationId,
		holder: &str,
		now: DateTime<Utc>,
		ttl: Duration,
	) -> Result<bool, DbError> {
		self.refresh(config_id, holder, now, ttl).await
	}

	async fn release(&self, config_id: RotationId, holder: &str) -> Result<bool, DbError> {
		self.release(config_id, holder).await
	}

	async fn get(&self, config_id: RotationId) -> Result<Option<RotationLock>, DbError> {
		self.get(config_id).await
	}
}
