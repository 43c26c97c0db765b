// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rotation configuration persistence.
//!
//! Every write bumps `version`; the executor's completing write is guarded by
//! the version it observed when it marked the configuration rotating, so the
//! slot flip is a compare-and-swap.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use warden_credentials_core::{
	truncate_failure, CredentialSlot, RotationConfiguration, RotationId, SlotIndex,
};
use warden_server_db::{
	format_optional, format_timestamp, from_db_int, parse_optional, parse_timestamp, to_db_int,
	DbError,
};

#[async_trait]
pub trait RotationStore: Send + Sync {
	async fn insert(&self, config: &RotationConfiguration) -> Result<(), DbError>;
	async fn get(&self, id: RotationId) -> Result<Option<RotationConfiguration>, DbError>;
	async fn list(&self) -> Result<Vec<RotationConfiguration>, DbError>;
	/// Configurations that are not mid-rotation, or whose rotation lock is
	/// gone or expired. Interval checks are left to the caller.
	async fn list_candidates(&self, now: DateTime<Utc>) -> Result<Vec<RotationConfiguration>, DbError>;
	/// Sets `rotating` if `version` still matches. Returns the new version.
	async fn mark_rotating(
		&self,
		id: RotationId,
		version: i64,
		now: DateTime<Utc>,
	) -> Result<Option<i64>, DbError>;
	/// Stores the new slots and flips the active index if `version` matches.
	async fn complete_rotation(
		&self,
		id: RotationId,
		version: i64,
		slots: &[CredentialSlot; 2],
		active_slot: SlotIndex,
		now: DateTime<Utc>,
	) -> Result<bool, DbError>;
	/// Records a failed cycle if `version` matches. The active slot is not
	/// touched.
	async fn mark_failed(
		&self,
		id: RotationId,
		version: i64,
		message: &str,
		now: DateTime<Utc>,
	) -> Result<bool, DbError>;
	/// Removes the configuration and its lock row together.
	async fn delete(&self, id: RotationId) -> Result<bool, DbError>;
}

#[derive(Clone)]
pub struct RotationRepository {
	pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct RotationRow {
	id: String,
	name: String,
	rotation_type: String,
	interval_secs: i64,
	parameters: String,
	generation: String,
	slots: String,
	active_slot: i64,
	status: String,
	last_rotated_at: Option<String>,
	last_failure_message: Option<String>,
	version: i64,
	created_at: String,
	updated_at: String,
}

impl TryFrom<RotationRow> for RotationConfiguration {
	type Error = DbError;

	fn try_from(row: RotationRow) -> Result<Self, Self::Error> {
		Ok(RotationConfiguration {
			id: row
				.id
				.parse()
				.map_err(|e| DbError::Internal(format!("Invalid rotation id: {e}")))?,
			name: row.name,
			rotation_type: row.rotation_type,
			interval_secs: from_db_int(row.interval_secs),
			parameters: serde_json::from_str(&row.parameters)?,
			generation: serde_json::from_str(&row.generation)?,
			slots: serde_json::from_str(&row.slots)?,
			active_slot: SlotIndex::try_from(row.active_slot)
				.map_err(|e| DbError::Internal(e.to_string()))?,
			status: row
				.status
				.parse()
				.map_err(|e| DbError::Internal(format!("{e}")))?,
			last_rotated_at: parse_optional(row.last_rotated_at.as_deref())?,
			last_failure_message: row.last_failure_message,
			version: row.version,
			created_at: parse_timestamp(&row.created_at)?,
			updated_at: parse_timestamp(&row.updated_at)?,
		})
	}
}

const SELECT_COLUMNS: &str = r#"
	SELECT c.id, c.name, c.rotation_type, c.interval_secs, c.parameters, c.generation,
	       c.slots, c.active_slot, c.status, c.last_rotated_at, c.last_failure_message,
	       c.version, c.created_at, c.updated_at
	FROM rotation_configurations c
"#;

impl RotationRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[async_trait]
impl RotationStore for RotationRepository {
	#[tracing::instrument(skip(self, config), fields(config_id = %config.id, name = %config.name))]
	async fn insert(&self, config: &RotationConfiguration) -> Result<(), DbError> {
		let result = sqlx::query(
			r#"
			INSERT INTO rotation_configurations (
				id, name, rotation_type, interval_secs, parameters, generation, slots,
				active_slot, status, last_rotated_at, last_failure_message, version,
				created_at, updated_at
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(config.id.to_string())
		.bind(&config.name)
		.bind(&config.rotation_type)
		.bind(to_db_int(config.interval_secs))
		.bind(serde_json::to_string(&config.parameters)?)
		.bind(serde_json::to_string(&config.generation)?)
		.bind(serde_json::to_string(&config.slots)?)
		.bind(i64::from(config.active_slot))
		.bind(config.status.to_string())
		.bind(format_optional(config.last_rotated_at))
		.bind(config.last_failure_message.as_deref())
		.bind(config.version)
		.bind(format_timestamp(config.created_at))
		.bind(format_timestamp(config.updated_at))
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(DbError::Conflict(
				format!("rotation {:?} already exists", config.name),
			)),
			Err(e) => Err(e.into()),
		}
	}

	#[tracing::instrument(skip(self), fields(config_id = %id))]
	async fn get(&self, id: RotationId) -> Result<Option<RotationConfiguration>, DbError> {
		let row = sqlx::query_as::<_, RotationRow>(&format!("{SELECT_COLUMNS} WHERE c.id = ?"))
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		row.map(RotationConfiguration::try_from).transpose()
	}

	#[tracing::instrument(skip(self))]
	async fn list(&self) -> Result<Vec<RotationConfiguration>, DbError> {
		let rows = sqlx::query_as::<_, RotationRow>(&format!("{SELECT_COLUMNS} ORDER BY c.name"))
			.fetch_all(&self.pool)
			.await?;

		rows.into_iter().map(RotationConfiguration::try_from).collect()
	}

	#[tracing::instrument(skip(self))]
	async fn list_candidates(&self, now: DateTime<Utc>) -> Result<Vec<RotationConfiguration>, DbError> {
		let rows = sqlx::query_as::<_, RotationRow>(&format!(
			r#"{SELECT_COLUMNS}
			LEFT JOIN rotation_locks l ON l.config_id = c.id
			WHERE c.status != 'rotating' OR l.config_id IS NULL OR l.expires_at <= ?
			ORDER BY c.last_rotated_at"#
		))
		.bind(format_timestamp(now))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(RotationConfiguration::try_from).collect()
	}

	#[tracing::instrument(skip(self), fields(config_id = %id, version))]
	async fn mark_rotating(
		&self,
		id: RotationId,
		version: i64,
		now: DateTime<Utc>,
	) -> Result<Option<i64>, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE rotation_configurations
			SET status = 'rotating', version = version + 1, updated_at = ?
			WHERE id = ? AND version = ?
			"#,
		)
		.bind(format_timestamp(now))
		.bind(id.to_string())
		.bind(version)
		.execute(&self.pool)
		.await?;

		Ok((result.rows_affected() == 1).then_some(version + 1))
	}

	#[tracing::instrument(skip(self, slots), fields(config_id = %id, version, active_slot = ?active_slot))]
	async fn complete_rotation(
		&self,
		id: RotationId,
		version: i64,
		slots: &[CredentialSlot; 2],
		active_slot: SlotIndex,
		now: DateTime<Utc>,
	) -> Result<bool, DbError> {
		let now_s = format_timestamp(now);
		let result = sqlx::query(
			r#"
			UPDATE rotation_configurations
			SET slots = ?, active_slot = ?, status = 'idle', last_rotated_at = ?,
			    last_failure_message = NULL, version = version + 1, updated_at = ?
			WHERE id = ? AND version = ?
			"#,
		)
		.bind(serde_json::to_string(slots)?)
		.bind(i64::from(active_slot))
		.bind(&now_s)
		.bind(&now_s)
		.bind(id.to_string())
		.bind(version)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	#[tracing::instrument(skip(self, message), fields(config_id = %id))]
	async fn mark_failed(
		&self,
		id: RotationId,
		version: i64,
		message: &str,
		now: DateTime<Utc>,
	) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE rotation_configurations
			SET status = 'failed', last_failure_message = ?, version = version + 1, updated_at = ?
			WHERE id = ? AND version = ?
			"#,
		)
		.bind(truncate_failure(message))
		.bind(format_timestamp(now))
		.bind(id.to_string())
		.bind(version)
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected() == 1)
	}

	#[tracing::instrument(skip(self), fields(config_id = %id))]
	async fn delete(&self, id: RotationId) -> Result<bool, DbError> {
		let mut tx = self.pool.begin().await?;
		sqlx::query("DELETE FROM rotation_locks WHERE config_id = ?")
			.bind(id.to_string())
			.execute(&mut *tx)
			.await?;
		let result = sqlx::query("DELETE FROM rotation_configurations WHERE id = ?")
			.bind(id.to_string())
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;

		Ok(result.rows_affected() == 1)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use warden_credentials_core::{PasswordRequirements, RotationStatus, SealedSecret};
	use warden_server_db::now;
	use warden_server_db::testing::create_test_pool;

	fn slot(identity: &str, marker: u8) -> CredentialSlot {
		CredentialSlot {
			identity: identity.to_string(),
			sealed_secret: SealedSecret {
				ciphertext: vec![marker; 16],
				nonce: vec![0; 12],
				wrapped_key: vec![marker; 48],
				key_nonce: vec![1; 12],
			},
		}
	}

	fn config(name: &str) -> RotationConfiguration {
		let t = now();
		RotationConfiguration {
			id: RotationId::generate(),
			name: name.to_string(),
			rotation_type: "fake-sql".to_string(),
			interval_secs: 3600,
			parameters: serde_json::json!({"host": "db"}),
			generation: PasswordRequirements::default(),
			slots: [slot("app_a", 1), slot("app_b", 2)],
			active_slot: SlotIndex::Zero,
			status: RotationStatus::Idle,
			last_rotated_at: Some(t),
			last_failure_message: None,
			version: 1,
			created_at: t,
			updated_at: t,
		}
	}

	#[tokio::test]
	async fn insert_and_get() {
		let repo = RotationRepository::new(create_test_pool().await);
		let cfg = config("orders");
		repo.insert(&cfg).await.unwrap();
		assert_eq!(repo.get(cfg.id).await.unwrap().unwrap(), cfg);
		assert!(matches!(
			repo.insert(&config("orders")).await,
			Err(DbError::Conflict(_))
		));
	}

	#[tokio::test]
	async fn stale_version_cannot_flip_slots() {
		let repo = RotationRepository::new(create_test_pool().await);
		let cfg = config("orders");
		repo.insert(&cfg).await.unwrap();

		let version = repo.mark_rotating(cfg.id, cfg.version, now()).await.unwrap().unwrap();
		assert!(repo.mark_rotating(cfg.id, cfg.version, now()).await.unwrap().is_none());

		let slots = [slot("app_a", 1), slot("app_b", 9)];
		assert!(!repo
			.complete_rotation(cfg.id, cfg.version, &slots, SlotIndex::One, now())
			.await
			.unwrap());
		assert!(repo
			.complete_rotation(cfg.id, version, &slots, SlotIndex::One, now())
			.await
			.unwrap());

		let stored = repo.get(cfg.id).await.unwrap().unwrap();
		assert_eq!(stored.active_slot, SlotIndex::One);
		assert_eq!(stored.slots, slots);
		assert_eq!(stored.status, RotationStatus::Idle);
		assert_eq!(stored.version, version + 1);
	}

	#[tokio::test]
	async fn failure_keeps_slots() {
		let repo = RotationRepository::new(create_test_pool().await);
		let cfg = config("orders");
		repo.insert(&cfg).await.unwrap();

		assert!(!repo
			.mark_failed(cfg.id, cfg.version + 5, "stale", now())
			.await
			.unwrap());
		assert!(repo
			.mark_failed(cfg.id, cfg.version, "target unreachable", now())
			.await
			.unwrap());
		let stored = repo.get(cfg.id).await.unwrap().unwrap();
		assert_eq!(stored.status, RotationStatus::Failed);
		assert_eq!(stored.active_slot, SlotIndex::Zero);
		assert_eq!(stored.slots, cfg.slots);
		assert_eq!(stored.last_failure_message.as_deref(), Some("target unreachable"));
	}

	#[tokio::test]
	async fn delete_is_reported() {
		let repo = RotationRepository::new(create_test_pool().await);
		let cfg = config("orders");
		repo.insert(&cfg).await.unwrap();
		assert!(repo.delete(cfg.id).await.unwrap());
		assert!(!repo.delete(cfg.id).await.unwrap());
		assert!(repo.list().await.unwrap().is_empty());
	}
}
