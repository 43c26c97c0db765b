// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dynamic secret and lease persistence.
//!
//! Status changes are conditional on the lease still being `active`, so only
//! one caller (an explicit revoke or the reaper) ever wins the right to tear
//! the external credential down.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use warden_credentials_core::{
	truncate_failure, DynamicSecret, DynamicSecretId, DynamicSecretLease, LeaseId, LeaseStatus,
};
use warden_server_db::{format_timestamp, from_db_int, parse_timestamp, to_db_int, DbError};

#[async_trait]
pub trait DynamicSecretStore: Send + Sync {
	async fn insert_dynamic_secret(&self, secret: &DynamicSecret) -> Result<(), DbError>;
	async fn get_dynamic_secret(&self, id: DynamicSecretId) -> Result<Option<DynamicSecret>, DbError>;
	async fn list_dynamic_secrets(&self) -> Result<Vec<DynamicSecret>, DbError>;
	/// Deletes the secret and its finished leases. Refused (returns the
	/// blocking count) while active or orphaned leases remain.
	async fn delete_dynamic_secret(&self, id: DynamicSecretId) -> Result<Result<bool, u64>, DbError>;
}

#[async_trait]
pub trait LeaseStore: Send + Sync {
	/// Inserts an active lease unless the secret already has `limit` active
	/// leases. Returns `false` when the limit was hit.
	async fn insert_lease_within_limit(
		&self,
		lease: &DynamicSecretLease,
		limit: u32,
	) -> Result<bool, DbError>;
	async fn get_lease(&self, id: LeaseId) -> Result<Option<DynamicSecretLease>, DbError>;
	async fn list_leases(&self, dynamic_secret_id: DynamicSecretId) -> Result<Vec<DynamicSecretLease>, DbError>;
	async fn count_active_leases(&self, dynamic_secret_id: DynamicSecretId) -> Result<u64, DbError>;
	async fn extend_lease(
		&self,
		id: LeaseId,
		expires_at: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<bool, DbError>;
	/// Moves an active lease to a terminal status. `false` if it was not active.
	async fn finish_lease(
		&self,
		id: LeaseId,
		status: LeaseStatus,
		now: DateTime<Utc>,
	) -> Result<bool, DbError>;
	async fn list_expired_active(&self, now: DateTime<Utc>, limit: u32) -> Result<Vec<DynamicSecretLease>, DbError>;
	async fn set_teardown_error(
		&self,
		id: LeaseId,
		error: Option<&str>,
		now: DateTime<Utc>,
	) -> Result<(), DbError>;
	async fn list_orphaned(&self) -> Result<Vec<DynamicSecretLease>, DbError>;
}

#[derive(Clone)]
pub struct LeaseRepository {
	pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct DynamicSecretRow {
	id: String,
	name: String,
	provider_type: String,
	parameters: String,
	default_ttl_secs: i64,
	max_ttl_secs: i64,
	created_at: String,
}

impl TryFrom<DynamicSecretRow> for DynamicSecret {
	type Error = DbError;

	fn try_from(row: DynamicSecretRow) -> Result<Self, Self::Error> {
		Ok(DynamicSecret {
			id: row
				.id
				.parse()
				.map_err(|e| DbError::Internal(format!("Invalid dynamic secret id: {e}")))?,
			name: row.name,
			provider_type: row.provider_type,
			parameters: serde_json::from_str(&row.parameters)?,
			default_ttl_secs: from_db_int(row.default_ttl_secs),
			max_ttl_secs: from_db_int(row.max_ttl_secs),
			created_at: parse_timestamp(&row.created_at)?,
		})
	}
}

#[derive(sqlx::FromRow)]
struct LeaseRow {
	id: String,
	dynamic_secret_id: String,
	external_ref: String,
	status: String,
	expires_at: String,
	renewal_count: i64,
	teardown_error: Option<String>,
	created_at: String,
	updated_at: String,
}

impl TryFrom<LeaseRow> for DynamicSecretLease {
	type Error = DbError;

	fn try_from(row: LeaseRow) -> Result<Self, Self::Error> {
		Ok(DynamicSecretLease {
			id: row
				.id
				.parse()
				.map_err(|e| DbError::Internal(format!("Invalid lease id: {e}")))?,
			dynamic_secret_id: row
				.dynamic_secret_id
				.parse()
				.map_err(|e| DbError::Internal(format!("Invalid dynamic secret id: {e}")))?,
			external_ref: row.external_ref,
			status: row
				.status
				.parse()
				.map_err(|e| DbError::Internal(format!("{e}")))?,
			expires_at: parse_timestamp(&row.expires_at)?,
			renewal_count: u32::try_from(row.renewal_count).unwrap_or(u32::MAX),
			teardown_error: row.teardown_error,
			created_at: parse_timestamp(&row.created_at)?,
			updated_at: parse_timestamp(&row.updated_at)?,
		})
	}
}

const LEASE_COLUMNS: &str = r#"
	SELECT id, dynamic_secret_id, external_ref, status, expires_at, renewal_count,
	       teardown_error, created_at, updated_at
	FROM dynamic_secret_leases
"#;

impl LeaseRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl DynamicSecretStore for LeaseRepository {
	#[tracing::instrument(skip(self, secret), fields(dynamic_secret_id = %secret.id, name = %secret.name))]
	async fn insert_dynamic_secret(&self, secret: &DynamicSecret) -> Result<(), DbError> {
		let result = sqlx::query(
			r#"
			INSERT INTO dynamic_secrets (
				id, name, provider_type, parameters, default_ttl_secs, max_ttl_secs, created_at
			) VALUES (?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(secret.id.to_string())
		.bind(&secret.name)
		.bind(&secret.provider_type)
		.bind(serde_json::to_string(&secret.parameters)?)
		.bind(to_db_int(secret.default_ttl_secs))
		.bind(to_db_int(secret.max_ttl_secs))
		.bind(format_timestamp(secret.created_at))
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(DbError::Conflict(format!(
				"dynamic secret {:?} already exists",
				secret.name
			))),
			Err(e) => Err(e.into()),
		}
	}

	#[tracing::instrument(skip(self), fields(dynamic_secret_id = %id))]
	async fn get_dynamic_secret(&self, id: DynamicSecretId) -> Result<Option<DynamicSecret>, DbError> {
		let row = sqlx::query_as::<_, DynamicSecretRow>(
			r#"
			SELECT id, name, provider_type, parameters, default_ttl_secs, max_ttl_secs, created_at
			FROM dynamic_secrets
			WHERE id = ?
			"#,
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(DynamicSecret::try_from).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn list_dynamic_secrets(&self) -> Result<Vec<DynamicSecret>, DbError> {
		let rows = sqlx::query_as::<_, DynamicSecretRow>(
			r#"
			SELECT id, name, provider_type, parameters, default_ttl_secs, max_ttl_secs, created_at
			FROM dynamic_secrets
			ORDER BY name
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(DynamicSecret::try_from).collect()
	}

	#[tracing::instrument(skip(self), fields(dynamic_secret_id = %id))]
	async fn delete_dynamic_secret(&self, id: DynamicSecretId) -> Result<Result<bool, u64>, DbError> {
		let mut tx = self.pool.begin().await?;

		let blocking: i64 = sqlx::query_scalar(
			r#"
			SELECT COUNT(*) FROM dynamic_secret_leases
			WHERE dynamic_secret_id = ?
			  AND (status = 'active' OR teardown_error IS NOT NULL)
			"#,
		)
		.bind(id.to_string())
		.fetch_one(&mut *tx)
		.await?;
		if blocking > 0 {
			return Ok(Err(from_db_int(blocking)));
		}

		sqlx::query("DELETE FROM dynamic_secret_leases WHERE dynamic_secret_id = ?")
			.bind(id.to_string())
			.execute(&mut *tx)
			.await?;
		let result = sqlx::query("DELETE FROM dynamic_secrets WHERE id = ?")
			.bind(id.to_string())
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;

		Ok(Ok(result.rows_affected() == 1))
	}
}

#[async_trait]
impl LeaseStore for LeaseRepository {
	#[tracing::instrument(skip(self, lease), fields(lease_id = %lease.id, dynamic_secret_id = %lease.dynamic_secret_id))]
	async fn insert_lease_within_limit(
		&self,
		lease: &DynamicSecretLease,
		limit: u32,
	) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			INSERT INTO dynamic_secret_leases (
				id, dynamic_secret_id, external_ref, status, expires_at, renewal_count,
				teardown_error, created_at, updated_at
			)
			SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
			WHERE (
				SELECT COUNT(*) FROM dynamic_secret_leases
				WHERE dynamic_secret_id = ?2 AND status = 'active'
			) < ?10
			"#,
		)
		.bind(lease.id.to_string())
		.bind(lease.dynamic_secret_id.to_string())
		.bind(&lease.external_ref)
		.bind(lease.status.to_string())
		.bind(format_timestamp(lease.expires_at))
		.bind(i64::from(lease.renewal_count))
		.bind(lease.teardown_error.as_deref())
		.bind(format_timestamp(lease.created_at))
		.bind(format_timestamp(lease.updated_at))
		.bind(i64::from(limit))
		.execute(&self.pool)
		.await?;

		tracing::debug!(inserted = result.rows_affected(), "lease insert");
		Ok(result.rows_affected() == 1)
	}

	#[tracing::instrument(skip(self), fields(lease_id = %id))]
	async fn get_lease(&self, id: LeaseId) -> Result<Option<DynamicSecretLease>, DbError> {
		let row = sqlx::query_as::<_, LeaseRow>(&format!("{LEASE_COLUMNS} WHERE id = ?"))
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		row.map(DynamicSecretLease::try_from).transpose()
	}

	#[tracing::instrument(skip(self), fields(dynamic_secret_id = %dynamic_secret_id))]
	async fn list_leases(
		&self,
		dynamic_secret_id: DynamicSecretId,
	) -> Result<Vec<DynamicSecretLease>, DbError> {
		let rows = sqlx::query_as::<_, LeaseRow>(&format!(
			"{LEASE_COLUMNS} WHERE dynamic_secret_id = ? ORDER BY created_at DESC"
		))
		.bind(dynamic_secret_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(DynamicSecretLease::try_from).collect()
	}

	async fn count_active_leases(&self, dynamic_secret_id: DynamicSecretId) -> Result<u64, DbError> {
		let count: i64 = sqlx::query_scalar(
			"SELECT COUNT(*) FROM dynamic_secret_leases WHERE dynamic_secret_id = ? AND status = 'active'",
		)
		.bind(dynamic_secret_id.to_string())
		.fetch_one(&self.pool)
		.await?;

		Ok(from_db_int(count))
	}

	#[tracing::instrument(skip(self), fields(lease_id = %id))]
	async fn extend_lease(
		&self,
		id: LeaseId,
		expires_at: DateTime<Utc>,
		now: DateTime<Utc>,
	) -> Result<bool, DbError> {
		let now_s = format_timestamp(now);
		let result = sqlx::query(
			r#"
			UPDATE dynamic_secret_leases
			SET expires_at = ?, renewal_count = renewal_count + 1, updated_at = ?
			WHERE id = ? AND status = 'active' AND expires_at > ?
			"#,
		)
		.bind(format_timestamp(expires_at))
		.bind(&now_s)
		.bind(id.to_string())
		.bind(&now_s)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	#[tracing::instrument(skip(self), fields(lease_id = %id, status = %status))]
	async fn finish_lease(
		&self,
		id: LeaseId,
		status: LeaseStatus,
		now: DateTime<Utc>,
	) -> Result<bool, DbError> {
		if !status.is_terminal() {
			return Err(DbError::Internal(format!("{status} is not a terminal lease status")));
		}
		let result = sqlx::query(
			r#"
			UPDATE dynamic_secret_leases
			SET status = ?, updated_at = ?
			WHERE id = ? AND status = 'active'
			"#,
		)
		.bind(status.to_string())
		.bind(format_timestamp(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	#[tracing::instrument(skip(self))]
	async fn list_expired_active(
		&self,
		now: DateTime<Utc>,
		limit: u32,
	) -> Result<Vec<DynamicSecretLease>, DbError> {
		let rows = sqlx::query_as::<_, LeaseRow>(&format!(
			"{LEASE_COLUMNS} WHERE status = 'active' AND expires_at <= ? ORDER BY expires_at LIMIT ?"
		))
		.bind(format_timestamp(now))
		.bind(i64::from(limit))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(DynamicSecretLease::try_from).collect()
	}

	#[tracing::instrument(skip(self, error), fields(lease_id = %id))]
	async fn set_teardown_error(
		&self,
		id: LeaseId,
		error: Option<&str>,
		now: DateTime<Utc>,
	) -> Result<(), DbError> {
		sqlx::query(
			r#"
			UPDATE dynamic_secret_leases
			SET teardown_error = ?, updated_at = ?
			WHERE id = ?
			"#,
		)
		.bind(error.map(truncate_failure))
		.bind(format_timestamp(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self))]
	async fn list_orphaned(&self) -> Result<Vec<DynamicSecretLease>, DbError> {
		let rows = sqlx::query_as::<_, LeaseRow>(&format!(
			"{LEASE_COLUMNS} WHERE teardown_error IS NOT NULL ORDER BY updated_at"
		))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(DynamicSecretLease::try_from).collect()
	}
}
