// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Embedded schema migrations, applied in order and recorded in
//! `schema_migrations`.

use sqlx::sqlite::SqlitePool;

use crate::error::DbError;
use crate::time::{format_timestamp, now};

const MIGRATIONS: &[(&str, &str)] = &[
	(
		"001_auth_credentials",
		include_str!("../migrations/001_auth_credentials.sql"),
	),
	("002_lockouts", include_str!("../migrations/002_lockouts.sql")),
	(
		"003_dynamic_secrets",
		include_str!("../migrations/003_dynamic_secrets.sql"),
	),
	("004_rotations", include_str!("../migrations/004_rotations.sql")),
	("005_job_runs", include_str!("../migrations/005_job_runs.sql")),
];

/// Applies every migration that has not run yet. Each migration runs in its
/// own transaction.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS schema_migrations (
			version TEXT PRIMARY KEY NOT NULL,
			applied_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	for &(version, sql) in MIGRATIONS {
		let applied: Option<String> =
			sqlx::query_scalar("SELECT version FROM schema_migrations WHERE version = ?")
				.bind(version)
				.fetch_optional(pool)
				.await?;
		if applied.is_some() {
			continue;
		}

		let mut tx = pool.begin().await?;
		for stmt in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
			sqlx::query(stmt)
				.execute(&mut *tx)
				.await
				.map_err(|source| DbError::Migration { version, source })?;
		}
		sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
			.bind(version)
			.bind(format_timestamp(now()))
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;

		tracing::info!(version, "applied migration");
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;

	#[tokio::test]
	async fn migrations_are_idempotent() {
		let pool = create_test_pool().await;
		run_migrations(&pool).await.unwrap();

		let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
			.fetch_one(&pool)
			.await
			.unwrap();
		assert_eq!(count, MIGRATIONS.len() as i64);
	}

	#[tokio::test]
	async fn creates_expected_tables() {
		let pool = create_test_pool().await;
		for table in [
			"auth_credentials",
			"lockouts",
			"dynamic_secrets",
			"dynamic_secret_leases",
			"rotation_configurations",
			"rotation_locks",
			"job_runs",
		] {
			let found: Option<String> = sqlx::query_scalar(
				"SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
			)
			.bind(table)
			.fetch_optional(&pool)
			.await
			.unwrap();
			assert_eq!(found.as_deref(), Some(table));
		}
	}
}
