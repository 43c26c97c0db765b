// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::context::JobContext;
use crate::error::JobError;
use crate::types::JobOutput;

#[async_trait]
pub trait Job: Send + Sync {
	/// Stable identifier, used as the `job_runs.job_id`.
	fn id(&self) -> &str;
	fn name(&self) -> &str;
	fn description(&self) -> &str;

	/// Long-running jobs should poll `ctx.cancellation_token` and return
	/// [`JobError::Cancelled`] when it is set.
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError>;
}
