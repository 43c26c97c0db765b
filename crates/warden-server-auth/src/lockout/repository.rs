// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lockout counter persistence.
//!
//! Every transition is one SQL statement guarded by the current lock, so
//! parallel attempts on a scope never under-count or double-extend a lock.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePool;
use warden_credentials_core::{add_secs, LockoutPolicy, LockoutState};
use warden_server_db::{format_timestamp, parse_optional, parse_timestamp, to_db_int, DbError};

#[async_trait]
pub trait LockoutStore: Send + Sync {
	async fn get_state(&self, scope_key: &str) -> Result<Option<LockoutState>, DbError>;

	/// Counts a failure unless the scope is locked. Returns `None` when the
	/// scope was locked and nothing changed.
	async fn record_failure(
		&self,
		scope_key: &str,
		policy: &LockoutPolicy,
		now: DateTime<Utc>,
	) -> Result<Option<LockoutState>, DbError>;

	/// Clears the counter unless the scope is locked. Returns `false` when
	/// the scope was locked and nothing changed.
	async fn record_success(&self, scope_key: &str, now: DateTime<Utc>) -> Result<bool, DbError>;

	async fn clear_prefix(&self, scope_prefix: &str) -> Result<u64, DbError>;

	/// Deletes unlocked rows whose last failure is older than `window_cutoff`.
	async fn delete_stale(
		&self,
		now: DateTime<Utc>,
		window_cutoff: DateTime<Utc>,
	) -> Result<u64, DbError>;
}

#[derive(Clone)]
pub struct LockoutRepository {
	pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct LockoutRow {
	scope_key: String,
	failure_count: i64,
	window_start: String,
	locked_until: Option<String>,
}

impl TryFrom<LockoutRow> for LockoutState {
	type Error = DbError;

	fn try_from(row: LockoutRow) -> Result<Self, Self::Error> {
		Ok(LockoutState {
			scope_key: row.scope_key,
			failure_count: u32::try_from(row.failure_count).unwrap_or(0),
			window_start: parse_timestamp(&row.window_start)?,
			locked_until: parse_optional(row.locked_until.as_deref())?,
		})
	}
}

impl LockoutRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_state(&self, scope_key: &str) -> Result<Option<LockoutState>, DbError> {
		let row = sqlx::query_as::<_, LockoutRow>(
			r#"
			SELECT scope_key, failure_count, window_start, locked_until
			FROM lockouts
			WHERE scope_key = ?
			"#,
		)
		.bind(scope_key)
		.fetch_optional(&self.pool)
		.await?;

		row.map(LockoutState::try_from).transpose()
	}

	#[tracing::instrument(skip(self, policy), fields(threshold = policy.threshold))]
	pub async fn record_failure(
		&self,
		scope_key: &str,
		policy: &LockoutPolicy,
		now: DateTime<Utc>,
	) -> Result<Option<LockoutState>, DbError> {
		let now_s = format_timestamp(now);
		let locked_until = format_timestamp(add_secs(now, policy.lockout_duration_secs));
		let reset_cutoff = format_timestamp(
			now.checked_sub_signed(secs(policy.counter_reset_secs))
				.unwrap_or(DateTime::<Utc>::MIN_UTC),
		);

		// A lapsed lock or a quiet window starts the count over at 1.
		let row = sqlx::query_as::<_, LockoutRow>(
			r#"
			INSERT INTO lockouts (scope_key, failure_count, window_start, locked_until, updated_at)
			VALUES (?1, 1, ?2, CASE WHEN 1 >= ?3 THEN ?4 ELSE NULL END, ?2)
			ON CONFLICT(scope_key) DO UPDATE SET
				failure_count = CASE
					WHEN lockouts.locked_until IS NOT NULL OR lockouts.window_start < ?5 THEN 1
					ELSE lockouts.failure_count + 1
				END,
				locked_until = CASE
					WHEN (CASE
						WHEN lockouts.locked_until IS NOT NULL OR lockouts.window_start < ?5 THEN 1
						ELSE lockouts.failure_count + 1
					END) >= ?3 THEN ?4
					ELSE NULL
				END,
				window_start = ?2,
				updated_at = ?2
			WHERE lockouts.locked_until IS NULL OR lockouts.locked_until <= ?2
			RETURNING scope_key, failure_count, window_start, locked_until
			"#,
		)
		.bind(scope_key)
		.bind(&now_s)
		.bind(i64::from(policy.threshold))
		.bind(&locked_until)
		.bind(&reset_cutoff)
		.fetch_optional(&self.pool)
		.await?;

		let state = row.map(LockoutState::try_from).transpose()?;
		if let Some(state) = &state {
			tracing::debug!(failure_count = state.failure_count, "lockout failure recorded");
		}
		Ok(state)
	}

	#[tracing::instrument(skip(self))]
	pub async fn record_success(&self, scope_key: &str, now: DateTime<Utc>) -> Result<bool, DbError> {
		sqlx::query(
			r#"
			DELETE FROM lockouts
			WHERE scope_key = ? AND (locked_until IS NULL OR locked_until <= ?)
			"#,
		)
		.bind(scope_key)
		.bind(format_timestamp(now))
		.execute(&self.pool)
		.await?;

		let still_locked: Option<String> = sqlx::query_scalar(
			"SELECT scope_key FROM lockouts WHERE scope_key = ? AND locked_until > ?",
		)
		.bind(scope_key)
		.bind(format_timestamp(now))
		.fetch_optional(&self.pool)
		.await?;

		Ok(still_locked.is_none())
	}

	#[tracing::instrument(skip(self))]
	pub async fn clear_prefix(&self, scope_prefix: &str) -> Result<u64, DbError> {
		let pattern = format!("{}%", escape_like(scope_prefix));
		let result = sqlx::query(r"DELETE FROM lockouts WHERE scope_key LIKE ? ESCAPE '\'")
			.bind(pattern)
			.execute(&self.pool)
			.await?;

		tracing::debug!(cleared = result.rows_affected(), "lockouts cleared");
		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_stale(
		&self,
		now: DateTime<Utc>,
		window_cutoff: DateTime<Utc>,
	) -> Result<u64, DbError> {
		let result = sqlx::query(
			r#"
			DELETE FROM lockouts
			WHERE (locked_until IS NULL OR locked_until <= ?)
			  AND window_start < ?
			"#,
		)
		.bind(format_timestamp(now))
		.bind(format_timestamp(window_cutoff))
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}
}

#[async_trait]
impl LockoutStore for LockoutRepository {
	async fn get_state(&self, scope_key: &str) -> Result<Option<LockoutState>, DbError> {
		self.get_state(scope_key).await
	}

	async fn record_failure(
		&self,
		scope_key: &str,
		policy: &LockoutPolicy,
		now: DateTime<Utc>,
	) -> Result<Option<LockoutState>, DbError> {
		self.record_failure(scope_key, policy, now).await
	}

	async fn record_success(&self, scope_key: &str, now: DateTime<Utc>) -> Result<bool, DbError> {
		self.record_success(scope_key, now).await
	}

	async fn clear_prefix(&self, scope_prefix: &str) -> Result<u64, DbError> {
		self.clear_prefix(scope_prefix).await
	}

	async fn delete_stale(
		&self,
		now: DateTime<Utc>,
		window_cutoff: DateTime<Utc>,
	) -> Result<u64, DbError> {
		self.delete_stale(now, window_cutoff).await
	}
}

fn secs(value: u64) -> Duration {
	Duration::try_seconds(to_db_int(value)).unwrap_or(Duration::MAX)
}

fn escape_like(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	for c in value.chars() {
		if matches!(c, '%' | '_' | '\\') {
			out.push('\\');
		}
		out.push(c);
	}
	out
}
