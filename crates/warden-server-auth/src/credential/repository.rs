// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credential persistence.
//!
//! Usage counting, renewal and revocation are single guarded UPDATEs so the
//! usage ceiling, the expiry and the revoked flag are enforced by the
//! database, not by a read followed by a write. `expires_at` is stored
//! alongside the TTL columns and rewritten on every renewal.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use warden_credentials_core::{AuthCredential, CredentialId, OwnerId};
use warden_server_db::{
	format_optional, format_timestamp, from_db_int, parse_optional, parse_timestamp, to_db_int,
	DbError,
};

#[async_trait]
pub trait CredentialStore: Send + Sync {
	async fn insert(&self, credential: &AuthCredential) -> Result<(), DbError>;
	async fn get(&self, id: CredentialId) -> Result<Option<AuthCredential>, DbError>;
	async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<AuthCredential>, DbError>;
	async fn consume_use(&self, id: CredentialId, now: DateTime<Utc>) -> Result<bool, DbError>;
	async fn mark_renewed(
		&self,
		id: CredentialId,
		now: DateTime<Utc>,
		expires_at: DateTime<Utc>,
	) -> Result<bool, DbError>;
	async fn revoke(&self, id: CredentialId, now: DateTime<Utc>) -> Result<bool, DbError>;
	async fn revoke_all_for_owner(&self, owner_id: OwnerId, now: DateTime<Utc>) -> Result<u64, DbError>;
}

#[derive(Clone)]
pub struct CredentialRepository {
	pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct CredentialRow {
	id: String,
	owner_id: String,
	kind: String,
	fingerprint: String,
	ttl_secs: i64,
	max_ttl_secs: i64,
	uses_count: i64,
	uses_limit: i64,
	last_used_at: Option<String>,
	last_renewed_at: Option<String>,
	revoked: bool,
	created_at: String,
}

impl TryFrom<CredentialRow> for AuthCredential {
	type Error = DbError;

	fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
		Ok(AuthCredential {
			id: row
				.id
				.parse()
				.map_err(|e| DbError::Internal(format!("Invalid credential id: {e}")))?,
			owner_id: row
				.owner_id
				.parse()
				.map_err(|e| DbError::Internal(format!("Invalid owner id: {e}")))?,
			kind: row
				.kind
				.parse()
				.map_err(|e| DbError::Internal(format!("{e}")))?,
			fingerprint: row.fingerprint,
			ttl_secs: from_db_int(row.ttl_secs),
			max_ttl_secs: from_db_int(row.max_ttl_secs),
			uses_count: from_db_int(row.uses_count),
			uses_limit: from_db_int(row.uses_limit),
			last_used_at: parse_optional(row.last_used_at.as_deref())?,
			last_renewed_at: parse_optional(row.last_renewed_at.as_deref())?,
			revoked: row.revoked,
			created_at: parse_timestamp(&row.created_at)?,
		})
	}
}

const SELECT_COLUMNS: &str = r#"
	SELECT id, owner_id, kind, fingerprint, ttl_secs, max_ttl_secs, uses_count,
	       uses_limit, last_used_at, last_renewed_at, revoked, created_at
	FROM auth_credentials
"#;

impl CredentialRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, credential), fields(credential_id = %credential.id, owner_id = %credential.owner_id))]
	pub async fn insert(&self, credential: &AuthCredential) -> Result<(), DbError> {
		sqlx::query(
			r#"
			INSERT INTO auth_credentials (
				id, owner_id, kind, fingerprint, ttl_secs, max_ttl_secs, uses_count,
				uses_limit, last_used_at, last_renewed_at, expires_at, revoked, created_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(credential.id.to_string())
		.bind(credential.owner_id.to_string())
		.bind(credential.kind.to_string())
		.bind(&credential.fingerprint)
		.bind(to_db_int(credential.ttl_secs))
		.bind(to_db_int(credential.max_ttl_secs))
		.bind(to_db_int(credential.uses_count))
		.bind(to_db_int(credential.uses_limit))
		.bind(format_optional(credential.last_used_at))
		.bind(format_optional(credential.last_renewed_at))
		.bind(format_optional(credential.expires_at()))
		.bind(credential.revoked)
		.bind(format_timestamp(credential.created_at))
		.execute(&self.pool)
		.await?;

		tracing::debug!("credential inserted");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(credential_id = %id))]
	pub async fn get(&self, id: CredentialId) -> Result<Option<AuthCredential>, DbError> {
		let row = sqlx::query_as::<_, CredentialRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		row.map(AuthCredential::try_from).transpose()
	}

	#[tracing::instrument(skip(self), fields(owner_id = %owner_id))]
	pub async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<AuthCredential>, DbError> {
		let rows = sqlx::query_as::<_, CredentialRow>(&format!(
			"{SELECT_COLUMNS} WHERE owner_id = ? ORDER BY created_at DESC"
		))
		.bind(owner_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(AuthCredential::try_from).collect()
	}

	/// Counts one use. Fails (returns `false`) when the credential is revoked,
	/// has expired by `now`, or the increment would pass the usage ceiling.
	#[tracing::instrument(skip(self), fields(credential_id = %id))]
	pub async fn consume_use(&self, id: CredentialId, now: DateTime<Utc>) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE auth_credentials
			SET uses_count = uses_count + 1, last_used_at = ?
			WHERE id = ?
			  AND revoked = 0
			  AND (expires_at IS NULL OR expires_at > ?)
			  AND (uses_limit = 0 OR uses_count < uses_limit)
			"#,
		)
		.bind(format_timestamp(now))
		.bind(id.to_string())
		.bind(format_timestamp(now))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	/// Moves the expiry to `expires_at`. Fails when the credential is revoked
	/// or already expired.
	#[tracing::instrument(skip(self), fields(credential_id = %id))]
	pub async fn mark_renewed(
		&self,
		id: CredentialId,
		now: DateTime<Utc>,
		expires_at: DateTime<Utc>,
	) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE auth_credentials
			SET last_renewed_at = ?, expires_at = ?
			WHERE id = ?
			  AND revoked = 0
			  AND (expires_at IS NULL OR expires_at > ?)
			"#,
		)
		.bind(format_timestamp(now))
		.bind(format_timestamp(expires_at))
		.bind(id.to_string())
		.bind(format_timestamp(now))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	/// Returns `false` only when no such credential exists.
	#[tracing::instrument(skip(self), fields(credential_id = %id))]
	pub async fn revoke(&self, id: CredentialId, now: DateTime<Utc>) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE auth_credentials
			SET revoked = 1, revoked_at = COALESCE(revoked_at, ?)
			WHERE id = ?
			"#,
		)
		.bind(format_timestamp(now))
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	#[tracing::instrument(skip(self), fields(owner_id = %owner_id))]
	pub async fn revoke_all_for_owner(
		&self,
		owner_id: OwnerId,
		now: DateTime<Utc>,
	) -> Result<u64, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE auth_credentials
			SET revoked = 1, revoked_at = ?
			WHERE owner_id = ? AND revoked = 0
			"#,
		)
		.bind(format_timestamp(now))
		.bind(owner_id.to_string())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}
}

#[async_trait]
impl CredentialStore for CredentialRepository {
	async fn insert(&self, credential: &AuthCredential) -> Result<(), DbError> {
		self.insert(credential).await
	}

	async fn get(&self, id: CredentialId) -> Result<Option<AuthCredential>, DbError> {
		self.get(id).await
	}

	async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<AuthCredential>, DbError> {
		self.list_for_owner(owner_id).await
	}

	async fn consume_use(&self, id: CredentialId, now: DateTime<Utc>) -> Result<bool, DbError> {
		self.consume_use(id, now).await
	}

	async fn mark_renewed(
		&self,
		id: CredentialId,
		now: DateTime<Utc>,
		expires_at: DateTime<Utc>,
	) -> Result<bool, DbError> {
		self.mark_renewed(id, now, expires_at).await
	}

	async fn revoke(&self, id: CredentialId, now: DateTime<Utc>) -> Result<bool, DbError> {
		self.revoke(id, now).await
	}

	async fn revoke_all_for_owner(&self, owner_id: OwnerId, now: DateTime<Utc>) -> Result<u64, DbError> {
		self.revoke_all_for_owner(owner_id, now).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;
	use warden_credentials_core::CredentialKind;
	use warden_server_db::{now, testing::create_test_pool};

	fn credential(uses_limit: u64) -> AuthCredential {
		AuthCredential {
			id: CredentialId::generate(),
			owner_id: OwnerId::generate(),
			kind: CredentialKind::AccessToken,
			fingerprint: "$argon2id$v=19$stub".to_string(),
			ttl_secs: 3600,
			max_ttl_secs: 0,
			uses_count: 0,
			uses_limit,
			last_used_at: None,
			last_renewed_at: None,
			revoked: false,
			created_at: now(),
		}
	}

	#[tokio::test]
	async fn insert_and_get_roundtrip() {
		let repo = CredentialRepository::new(create_test_pool().await);
		let cred = credential(0);
		repo.insert(&cred).await.unwrap();

		assert_eq!(repo.get(cred.id).await.unwrap(), Some(cred));
		assert_eq!(repo.get(CredentialId::generate()).await.unwrap(), None);
	}

	#[tokio::test]
	async fn consume_use_stops_at_limit() {
		let repo = CredentialRepository::new(create_test_pool().await);
		let cred = credential(2);
		repo.insert(&cred).await.unwrap();

		assert!(repo.consume_use(cred.id, now()).await.unwrap());
		assert!(repo.consume_use(cred.id, now()).await.unwrap());
		assert!(!repo.consume_use(cred.id, now()).await.unwrap());

		let stored = repo.get(cred.id).await.unwrap().unwrap();
		assert_eq!(stored.uses_count, 2);
		assert!(stored.last_used_at.is_some());
	}

	#[tokio::test]
	async fn expired_credential_cannot_be_used_or_renewed() {
		let repo = CredentialRepository::new(create_test_pool().await);
		let cred = credential(0);
		repo.insert(&cred).await.unwrap();
		let expiry = cred.expires_at().unwrap();

		assert!(repo.consume_use(cred.id, expiry - Duration::seconds(1)).await.unwrap());
		assert!(!repo.consume_use(cred.id, expiry).await.unwrap());
		assert!(!repo.mark_renewed(cred.id, expiry, expiry + Duration::seconds(3600)).await.unwrap());

		let stored = repo.get(cred.id).await.unwrap().unwrap();
		assert_eq!(stored.uses_count, 1);
		assert_eq!(stored.last_renewed_at, None);
	}

	#[tokio::test]
	async fn renewal_moves_the_stored_expiry() {
		let repo = CredentialRepository::new(create_test_pool().await);
		let cred = credential(0);
		repo.insert(&cred).await.unwrap();
		let expiry = cred.expires_at().unwrap();

		let renewed_at = expiry - Duration::seconds(10);
		assert!(repo
			.mark_renewed(cred.id, renewed_at, renewed_at + Duration::seconds(3600))
			.await
			.unwrap());
		assert!(repo.consume_use(cred.id, expiry + Duration::seconds(60)).await.unwrap());
		assert_eq!(
			repo.get(cred.id).await.unwrap().unwrap().expires_at(),
			Some(renewed_at + Duration::seconds(3600))
		);
	}

	#[tokio::test]
	async fn revoked_credential_cannot_be_used_or_renewed() {
		let repo = CredentialRepository::new(create_test_pool().await);
		let cred = credential(0);
		repo.insert(&cred).await.unwrap();

		assert!(repo.revoke(cred.id, now()).await.unwrap());
		assert!(repo.revoke(cred.id, now()).await.unwrap());
		assert!(!repo.consume_use(cred.id, now()).await.unwrap());
		assert!(!repo.mark_renewed(cred.id, now(), now()).await.unwrap());
		assert!(!repo.revoke(CredentialId::generate(), now()).await.unwrap());
	}

	#[tokio::test]
	async fn revoke_all_for_owner_skips_other_owners() {
		let repo = CredentialRepository::new(create_test_pool().await);
		let a = credential(0);
		let mut b = credential(0);
		b.owner_id = a.owner_id;
		let other = credential(0);
		for c in [&a, &b, &other] {
			repo.insert(c).await.unwrap();
		}

		assert_eq!(repo.revoke_all_for_owner(a.owner_id, now()).await.unwrap(), 2);
		assert_eq!(repo.list_for_owner(a.owner_id).await.unwrap().len(), 2);
		assert!(!repo.get(other.id).await.unwrap().unwrap().revoked);
	}
}
