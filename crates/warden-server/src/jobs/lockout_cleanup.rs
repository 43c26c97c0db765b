// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;
use warden_server_auth::LockoutGuard;
use warden_server_jobs::{Job, JobContext, JobError, JobOutput};

pub struct LockoutCleanupJob {
	guard: LockoutGuard,
}

impl LockoutCleanupJob {
	pub fn new(guard: LockoutGuard) -> Self {
		Self { guard }
	}
}

#[async_trait]
impl Job for LockoutCleanupJob {
	fn id(&self) -> &str {
		"lockout-cleanup"
	}

	fn name(&self) -> &str {
		"Lockout Cleanup"
	}

	fn description(&self) -> &str {
		"Delete lockout records with no active lock or failure window"
	}

	#[instrument(skip(self, ctx), fields(job_id = "lockout-cleanup"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let removed = self
			.guard
			.cleanup()
			.await
			.map_err(|e| JobError::Failed(e.to_string()))?;

		Ok(JobOutput {
			message: format!("Removed {removed} stale lockout records"),
			metadata: Some(json!({ "removed": removed })),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::test_state;
	use warden_credentials_core::AttemptOutcome;
	use warden_server_auth::scope_key;
	use warden_server_jobs::{CancellationToken, TriggerSource};

	#[tokio::test]
	async fn removes_only_stale_records() {
		let t = test_state().await;
		sqlx::query(
			r#"
			INSERT INTO lockouts (scope_key, failure_count, window_start, locked_until, updated_at)
			VALUES ('token:stale', 2, '2020-01-01T00:00:00.000000Z', NULL, '2020-01-01T00:00:00.000000Z')
			"#,
		)
		.execute(&t.state.pool)
		.await
		.unwrap();
		let live = scope_key("token", "fresh");
		t.state
			.lockout_guard
			.check_and_record(&live, AttemptOutcome::Failure)
			.await
			.unwrap();

		let ctx = JobContext {
			run_id: "run-1".to_string(),
			triggered_by: TriggerSource::Schedule,
			cancellation_token: CancellationToken::new(),
		};
		let output = LockoutCleanupJob::new(t.state.lockout_guard.clone())
			.run(&ctx)
			.await
			.unwrap();
		assert_eq!(output.metadata.unwrap()["removed"], 1);

		let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lockouts")
			.fetch_one(&t.state.pool)
			.await
			.unwrap();
		assert_eq!(remaining, 1);
	}
}
