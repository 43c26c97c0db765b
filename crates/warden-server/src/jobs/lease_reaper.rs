// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;
use warden_server_jobs::{Job, JobContext, JobError, JobOutput};
use warden_server_leases::LeaseReaper;

/// Expires overdue leases and tears down their external credentials.
pub struct LeaseReaperJob {
	reaper: LeaseReaper,
}

impl LeaseReaperJob {
	pub fn new(reaper: LeaseReaper) -> Self {
		Self { reaper }
	}
}

#[async_trait]
impl Job for LeaseReaperJob {
	fn id(&self) -> &str {
		"lease-reaper"
	}

	fn name(&self) -> &str {
		"Lease Reaper"
	}

	fn description(&self) -> &str {
		"Expire overdue dynamic secret leases and revoke their credentials"
	}

	#[instrument(skip(self, ctx), fields(job_id = "lease-reaper"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let report = self
			.reaper
			.sweep()
			.await
			.map_err(|e| JobError::Failed(e.to_string()))?;

		if report.teardown_failures > 0 {
			tracing::warn!(
				teardown_failures = report.teardown_failures,
				"expired leases left with orphaned credentials"
			);
		}

		Ok(JobOutput {
			message: format!("Expired {} leases", report.expired),
			metadata: Some(json!({
				"expired": report.expired,
				"teardown_failures": report.teardown_failures,
			})),
		})
	}
}
