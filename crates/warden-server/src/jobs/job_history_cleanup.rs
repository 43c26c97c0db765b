// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::instrument;
use warden_server_jobs::{Job, JobContext, JobError, JobOutput, JobRepository};

pub struct JobHistoryCleanupJob {
	repository: Arc<JobRepository>,
	retention_days: u32,
}

impl JobHistoryCleanupJob {
	pub fn new(repository: Arc<JobRepository>, retention_days: u32) -> Self {
		Self {
			repository,
			retention_days,
		}
	}
}

#[async_trait]
impl Job for JobHistoryCleanupJob {
	fn id(&self) -> &str {
		"job-history-cleanup"
	}

	fn name(&self) -> &str {
		"Job History Cleanup"
	}

	fn description(&self) -> &str {
		"Delete finished job runs older than the retention window"
	}

	#[instrument(skip(self, ctx), fields(job_id = "job-history-cleanup"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let deleted = self
			.repository
			.cleanup_old_runs(self.retention_days)
			.await
			.map_err(|e| JobError::Failed(format!("job history cleanup failed: {e}")))?;

		tracing::info!(
			deleted,
			retention_days = self.retention_days,
			"job history cleanup completed"
		);
		Ok(JobOutput {
			message: format!("Deleted {deleted} old job run records"),
			metadata: Some(json!({
				"deleted": deleted,
				"retention_days": self.retention_days,
			})),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration as ChronoDuration;
	use warden_server_db::testing::create_test_pool;
	use warden_server_db::{format_timestamp, now};
	use warden_server_jobs::{CancellationToken, JobRun, JobStatus, TriggerSource};

	async fn finished_run(repo: &JobRepository, id: &str) {
		repo.record_run_start(&JobRun {
			id: id.to_string(),
			job_id: "lease-reaper".to_string(),
			status: JobStatus::Running,
			started_at: now(),
			completed_at: None,
			duration_ms: None,
			error_message: None,
			triggered_by: TriggerSource::Schedule,
			metadata: None,
		})
		.await
		.unwrap();
		repo.record_run_complete(id, JobStatus::Succeeded, 3, None, None)
			.await
			.unwrap();
	}

	fn ctx() -> JobContext {
		JobContext {
			run_id: "run-1".to_string(),
			triggered_by: TriggerSource::Schedule,
			cancellation_token: CancellationToken::new(),
		}
	}

	#[tokio::test]
	async fn deletes_runs_past_retention() {
		let pool = create_test_pool().await;
		let repo = Arc::new(JobRepository::new(pool.clone()));
		finished_run(&repo, "old").await;
		finished_run(&repo, "recent").await;
		sqlx::query("UPDATE job_runs SET completed_at = ? WHERE id = 'old'")
			.bind(format_timestamp(now() - ChronoDuration::days(31)))
			.execute(&pool)
			.await
			.unwrap();

		let output = JobHistoryCleanupJob::new(Arc::clone(&repo), 30)
			.run(&ctx())
			.await
			.unwrap();
		assert_eq!(output.metadata.unwrap()["deleted"], 1);
		assert!(repo.get_run("old").await.unwrap().is_none());
		assert!(repo.get_run("recent").await.unwrap().is_some());
	}

	#[tokio::test]
	async fn cancelled_run_deletes_nothing() {
		let pool = create_test_pool().await;
		let repo = Arc::new(JobRepository::new(pool));
		let ctx = ctx();
		ctx.cancellation_token.cancel();

		let err = JobHistoryCleanupJob::new(repo, 30).run(&ctx).await.unwrap_err();
		assert!(matches!(err, JobError::Cancelled));
	}
}
