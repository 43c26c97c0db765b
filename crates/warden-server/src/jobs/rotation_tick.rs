// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;
use warden_server_jobs::{Job, JobContext, JobError, JobOutput};
use warden_server_rotation::RotationScheduler;

/// Claims due rotations and queues them for the rotation worker.
pub struct RotationTickJob {
	scheduler: RotationScheduler,
}

impl RotationTickJob {
	pub fn new(scheduler: RotationScheduler) -> Self {
		Self { scheduler }
	}
}

#[async_trait]
impl Job for RotationTickJob {
	fn id(&self) -> &str {
		"rotation-tick"
	}

	fn name(&self) -> &str {
		"Rotation Tick"
	}

	fn description(&self) -> &str {
		"Queue rotation configurations whose interval has elapsed"
	}

	#[instrument(skip(self, ctx), fields(job_id = "rotation-tick"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let report = self
			.scheduler
			.tick()
			.await
			.map_err(|e| JobError::Failed(e.to_string()))?;

		tracing::info!(
			claimed = report.claimed,
			skipped = report.skipped,
			deferred = report.deferred,
			"rotation tick completed"
		);

		Ok(JobOutput {
			message: format!("Queued {} rotations", report.claimed),
			metadata: Some(json!({
				"claimed": report.claimed,
				"skipped": report.skipped,
				"deferred": report.deferred,
			})),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{backdate_rotation, new_rotation, test_state};
	use warden_credentials_core::SlotIndex;
	use warden_server_jobs::{CancellationToken, TriggerSource};

	fn ctx() -> JobContext {
		JobContext {
			run_id: "run-1".to_string(),
			triggered_by: TriggerSource::Manual,
			cancellation_token: CancellationToken::new(),
		}
	}

	#[tokio::test]
	async fn due_rotation_is_queued_and_completed_by_the_worker() {
		let t = test_state().await;
		let config = t.state.rotation.configure_rotation(new_rotation("orders")).await.unwrap();
		backdate_rotation(&t.state.pool, &config.id.to_string(), 7200).await;

		let (scheduler, mut worker) = t.state.rotation.scheduler();
		let job = RotationTickJob::new(scheduler);
		let output = job.run(&ctx()).await.unwrap();
		assert_eq!(output.metadata.unwrap()["claimed"], 1);

		let outcome = worker.process_next().await.unwrap().unwrap();
		assert_eq!(outcome.config_id, config.id);
		assert_eq!(outcome.active_slot, SlotIndex::One);
	}

	#[tokio::test]
	async fn nothing_due_queues_nothing() {
		let t = test_state().await;
		t.state.rotation.configure_rotation(new_rotation("billing")).await.unwrap();

		let (scheduler, _worker) = t.state.rotation.scheduler();
		let output = RotationTickJob::new(scheduler).run(&ctx()).await.unwrap();
		assert_eq!(output.metadata.unwrap()["claimed"], 0);
	}

	#[tokio::test]
	async fn cancelled_job_does_not_tick() {
		let t = test_state().await;
		let (scheduler, _worker) = t.state.rotation.scheduler();
		let ctx = ctx();
		ctx.cancellation_token.cancel();
		let result = RotationTickJob::new(scheduler).run(&ctx).await;
		assert!(matches!(result, Err(JobError::Cancelled)));
	}
}
