// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqlitePool;
use warden_server_db::{format_timestamp, parse_optional, parse_timestamp, DbError, Result};

use crate::types::{JobRun, JobStatus};

#[derive(sqlx::FromRow)]
struct JobRunRow {
	id: String,
	job_id: String,
	status: String,
	started_at: String,
	completed_at: Option<String>,
	duration_ms: Option<i64>,
	error_message: Option<String>,
	triggered_by: String,
	metadata: Option<String>,
}

impl TryFrom<JobRunRow> for JobRun {
	type Error = DbError;

	fn try_from(row: JobRunRow) -> Result<Self> {
		Ok(JobRun {
			id: row.id,
			job_id: row.job_id,
			status: row.status.parse().map_err(DbError::Internal)?,
			started_at: parse_timestamp(&row.started_at)?,
			completed_at: parse_optional(row.completed_at.as_deref())?,
			duration_ms: row.duration_ms,
			error_message: row.error_message,
			triggered_by: row.triggered_by.parse().map_err(DbError::Internal)?,
			metadata: row
				.metadata
				.as_deref()
				.and_then(|s| serde_json::from_str(s).ok()),
		})
	}
}

/// Run history for background jobs.
#[derive(Clone)]
pub struct JobRepository {
	pool: SqlitePool,
}

impl JobRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self, run), fields(run_id = %run.id, job_id = %run.job_id))]
	pub async fn record_run_start(&self, run: &JobRun) -> Result<()> {
		sqlx::query(
			r#"
			INSERT INTO job_runs (id, job_id, status, started_at, triggered_by)
			VALUES (?, ?, ?, ?, ?)
			"#,
		)
		.bind(&run.id)
		.bind(&run.job_id)
		.bind(run.status.as_str())
		.bind(format_timestamp(run.started_at))
		.bind(run.triggered_by.as_str())
		.execute(&self.pool)
		.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self, error, metadata))]
	pub async fn record_run_complete(
		&self,
		run_id: &str,
		status: JobStatus,
		duration_ms: i64,
		error: Option<String>,
		metadata: Option<serde_json::Value>,
	) -> Result<()> {
		let metadata_str = metadata.map(|m| m.to_string());

		let result = sqlx::query(
			r#"
			UPDATE job_runs
			SET status = ?, completed_at = ?, duration_ms = ?, error_message = ?, metadata = ?
			WHERE id = ?
			"#,
		)
		.bind(status.as_str())
		.bind(format_timestamp(warden_server_db::now()))
		.bind(duration_ms)
		.bind(error)
		.bind(metadata_str)
		.bind(run_id)
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(run_id.to_string()));
		}
		Ok(())
	}

	#[tracing::instrument(skip(self))]
	pub async fn get_run(&self, run_id: &str) -> Result<Option<JobRun>> {
		let row = sqlx::query_as::<_, JobRunRow>(
			r#"
			SELECT id, job_id, status, started_at, completed_at, duration_ms, error_message,
			       triggered_by, metadata
			FROM job_runs
			WHERE id = ?
			"#,
		)
		.bind(run_id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(JobRun::try_from).transpose()
	}

	/// Most recent first.
	#[tracing::instrument(skip(self))]
	pub async fn list_runs(&self, job_id: &str, limit: u32, offset: u32) -> Result<Vec<JobRun>> {
		let rows = sqlx::query_as::<_, JobRunRow>(
			r#"
			SELECT id, job_id, status, started_at, completed_at, duration_ms, error_message,
			       triggered_by, metadata
			FROM job_runs
			WHERE job_id = ?
			ORDER BY started_at DESC
			LIMIT ? OFFSET ?
			"#,
		)
		.bind(job_id)
		.bind(i64::from(limit))
		.bind(i64::from(offset))
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(JobRun::try_from).collect()
	}

	pub async fn get_last_run(&self, job_id: &str) -> Result<Option<JobRun>> {
		Ok(self.list_runs(job_id, 1, 0).await?.into_iter().next())
	}

	/// Failed runs since the last run that finished any other way.
	#[tracing::instrument(skip(self))]
	pub async fn count_consecutive_failures(&self, job_id: &str) -> Result<u32> {
		let count: i64 = sqlx::query_scalar(
			r#"
			SELECT COUNT(*)
			FROM job_runs
			WHERE job_id = ?1
			  AND status = 'failed'
			  AND started_at > COALESCE(
			      (SELECT MAX(started_at) FROM job_runs
			       WHERE job_id = ?1 AND status IN ('succeeded', 'cancelled')),
			      '')
			"#,
		)
		.bind(job_id)
		.fetch_one(&self.pool)
		.await?;

		Ok(u32::try_from(count).unwrap_or(u32::MAX))
	}

	#[tracing::instrument(skip(self))]
	pub async fn delete_old_runs(&self, before: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM job_runs WHERE completed_at < ?")
			.bind(format_timestamp(before))
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected())
	}

	/// Deletes runs that finished more than `retention_days` ago.
	#[tracing::instrument(skip(self))]
	pub async fn cleanup_old_runs(&self, retention_days: u32) -> Result<u64> {
		let Some(cutoff) = warden_server_db::now()
			.checked_sub_signed(Duration::days(i64::from(retention_days)))
		else {
			return Ok(0);
		};
		self.delete_old_runs(cutoff).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::TriggerSource;
	use warden_server_db::now;
	use warden_server_db::testing::create_test_pool;

	fn run(id: &str, started_at: DateTime<Utc>) -> JobRun {
		JobRun {
			id: id.to_string(),
			job_id: "job-1".to_string(),
			status: JobStatus::Running,
			started_at,
			completed_at: None,
			duration_ms: None,
			error_message: None,
			triggered_by: TriggerSource::Schedule,
			metadata: None,
		}
	}

	async fn record(repo: &JobRepository, id: &str, offset_secs: i64, status: JobStatus) {
		let started = now() - Duration::seconds(100) + Duration::seconds(offset_secs);
		repo.record_run_start(&run(id, started)).await.unwrap();
		let error = (status == JobStatus::Failed).then(|| "boom".to_string());
		repo.record_run_complete(id, status, 5, error, None).await.unwrap();
	}

	#[tokio::test]
	async fn records_run_lifecycle() {
		let repo = JobRepository::new(create_test_pool().await);
		let started = now();
		repo.record_run_start(&run("run-1", started)).await.unwrap();

		let running = repo.get_run("run-1").await.unwrap().unwrap();
		assert_eq!(running.status, JobStatus::Running);
		assert_eq!(running.started_at, started);

		repo.record_run_complete(
			"run-1",
			JobStatus::Succeeded,
			12,
			None,
			Some(serde_json::json!({"expired": 3})),
		)
		.await
		.unwrap();
		let done = repo.get_run("run-1").await.unwrap().unwrap();
		assert_eq!(done.status, JobStatus::Succeeded);
		assert_eq!(done.duration_ms, Some(12));
		assert!(done.completed_at.is_some());
		assert_eq!(done.metadata, Some(serde_json::json!({"expired": 3})));
	}

	#[tokio::test]
	async fn completing_unknown_run_is_not_found() {
		let repo = JobRepository::new(create_test_pool().await);
		assert!(matches!(
			repo.record_run_complete("missing", JobStatus::Failed, 0, None, None).await,
			Err(DbError::NotFound(_))
		));
	}

	#[tokio::test]
	async fn consecutive_failures_reset_on_success() {
		let repo = JobRepository::new(create_test_pool().await);
		assert_eq!(repo.count_consecutive_failures("job-1").await.unwrap(), 0);

		record(&repo, "a", 0, JobStatus::Failed).await;
		record(&repo, "b", 1, JobStatus::Failed).await;
		assert_eq!(repo.count_consecutive_failures("job-1").await.unwrap(), 2);

		record(&repo, "c", 2, JobStatus::Succeeded).await;
		assert_eq!(repo.count_consecutive_failures("job-1").await.unwrap(), 0);

		record(&repo, "d", 3, JobStatus::Failed).await;
		assert_eq!(repo.count_consecutive_failures("job-1").await.unwrap(), 1);
		assert_eq!(repo.get_last_run("job-1").await.unwrap().unwrap().id, "d");
	}

	#[tokio::test]
	async fn lists_newest_first_and_prunes() {
		let repo = JobRepository::new(create_test_pool().await);
		record(&repo, "a", 0, JobStatus::Succeeded).await;
		record(&repo, "b", 1, JobStatus::Succeeded).await;

		let ids: Vec<_> = repo
			.list_runs("job-1", 10, 0)
			.await
			.unwrap()
			.into_iter()
			.map(|r| r.id)
			.collect();
		assert_eq!(ids, vec!["b", "a"]);

		let deleted = repo.delete_old_runs(now() + Duration::seconds(1)).await.unwrap();
		assert_eq!(deleted, 2);
		assert!(repo.list_runs("job-1", 10, 0).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn cleanup_keeps_runs_inside_retention() {
		let repo = JobRepository::new(create_test_pool().await);
		record(&repo, "recent", 0, JobStatus::Succeeded).await;
		repo.record_run_start(&run("unfinished", now())).await.unwrap();

		assert_eq!(repo.cleanup_old_runs(1).await.unwrap(), 0);
		assert_eq!(repo.cleanup_old_runs(u32::MAX).await.unwrap(), 0);
		assert_eq!(repo.list_runs("job-1", 10, 0).await.unwrap().len(), 2);
	}
}
