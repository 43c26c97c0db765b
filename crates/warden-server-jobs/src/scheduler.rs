// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::context::{CancellationToken, JobContext};
use crate::error::{JobError, Result};
use crate::health::{determine_health_state, HealthState, JobHealthStatus, JobsHealthStatus};
use crate::job::Job;
use crate::repository::JobRepository;
use crate::types::{JobRun, JobStatus, TriggerSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

struct RegisteredJob {
	job: Arc<dyn Job>,
	interval: Duration,
	cancellation_token: CancellationToken,
}

pub struct JobScheduler {
	jobs: BTreeMap<String, RegisteredJob>,
	repository: Arc<JobRepository>,
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
	pub fn new(repository: Arc<JobRepository>) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			jobs: BTreeMap::new(),
			repository,
			shutdown_tx,
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn register_periodic(&mut self, job: Arc<dyn Job>, interval: Duration) {
		let id = job.id().to_string();
		self.jobs.insert(
			id,
			RegisteredJob {
				job,
				interval,
				cancellation_token: CancellationToken::new(),
			},
		);
	}

	/// Spawns one timer task per registered job. The first run happens one
	/// interval after start.
	#[instrument(skip(self))]
	pub async fn start(&self) -> Result<()> {
		let mut handles = self.handles.lock().await;

		for (job_id, registered) in &self.jobs {
			let job = Arc::clone(&registered.job);
			let repository = Arc::clone(&self.repository);
			let mut shutdown_rx = self.shutdown_tx.subscribe();
			let cancellation_token = registered.cancellation_token.clone();
			let interval = registered.interval;
			let job_id = job_id.clone();

			let handle = tokio::spawn(async move {
				loop {
					tokio::select! {
						_ = tokio::time::sleep(interval) => {
							if cancellation_token.is_cancelled() {
								continue;
							}
							let _ = run_job(
								&job,
								&repository,
								TriggerSource::Schedule,
								&cancellation_token,
							).await;
						}
						_ = shutdown_rx.recv() => {
							info!(job_id = %job_id, "Shutting down periodic job");
							break;
						}
					}
				}
			});

			handles.push(handle);
		}

		info!(job_count = handles.len(), "Job scheduler started");
		Ok(())
	}

	/// Runs a job immediately and returns its run id.
	#[instrument(skip(self))]
	pub async fn trigger_job(&self, job_id: &str, triggered_by: TriggerSource) -> Result<String> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		run_job(
			&registered.job,
			&self.repository,
			triggered_by,
			&registered.cancellation_token,
		)
		.await
	}

	/// Stops scheduled runs of a job and signals any run in progress.
	#[instrument(skip(self))]
	pub async fn cancel_job(&self, job_id: &str) -> Result<()> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		registered.cancellation_token.cancel();
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn resume_job(&self, job_id: &str) -> Result<()> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		registered.cancellation_token.resume();
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}

		info!("Job scheduler shut down");
	}

	pub fn job_ids(&self) -> Vec<String> {
		self.jobs.keys().cloned().collect()
	}

	#[instrument(skip(self))]
	pub async fn job_status(&self, job_id: &str) -> Option<JobHealthStatus> {
		let registered = self.jobs.get(job_id)?;

		let last_run = self.repository.get_last_run(job_id).await.ok().flatten();
		let consecutive_failures = self
			.repository
			.count_consecutive_failures(job_id)
			.await
			.unwrap_or(0);

		let status = determine_health_state(last_run.as_ref(), consecutive_failures);

		Some(JobHealthStatus {
			job_id: job_id.to_string(),
			name: registered.job.name().to_string(),
			status,
			last_run: last_run.map(Into::into),
			consecutive_failures,
		})
	}

	#[instrument(skip(self))]
	pub async fn health_status(&self) -> JobsHealthStatus {
		let mut jobs = Vec::new();
		let mut worst_state = HealthState::Healthy;

		for job_id in self.jobs.keys() {
			if let Some(status) = self.job_status(job_id).await {
				worst_state = worst_state.max(status.status);
				jobs.push(status);
			}
		}

		JobsHealthStatus {
			status: worst_state,
			jobs,
		}
	}
}

async fn run_job(
	job: &Arc<dyn Job>,
	repository: &Arc<JobRepository>,
	triggered_by: TriggerSource,
	cancellation_token: &CancellationToken,
) -> Result<String> {
	let run_id = uuid::Uuid::new_v4().to_string();
	let ctx = JobContext {
		run_id: run_id.clone(),
		triggered_by,
		cancellation_token: cancellation_token.clone(),
	};

	let run = JobRun {
		id: run_id.clone(),
		job_id: job.id().to_string(),
		status: JobStatus::Running,
		started_at: warden_server_db::now(),
		completed_at: None,
		duration_ms: None,
		error_message: None,
		triggered_by,
		metadata: None,
	};
	repository.record_run_start(&run).await?;

	let started = Instant::now();
	let result = job.run(&ctx).await;
	let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

	match result {
		Ok(output) => {
			repository
				.record_run_complete(&run_id, JobStatus::Succeeded, duration_ms, None, output.metadata)
				.await?;
			info!(job_id = %job.id(), run_id = %run_id, message = %output.message, "Job completed successfully");
			Ok(run_id)
		}
		Err(JobError::Cancelled) => {
			repository
				.record_run_complete(&run_id, JobStatus::Cancelled, duration_ms, None, None)
				.await?;
			info!(job_id = %job.id(), run_id = %run_id, "Job cancelled");
			Err(JobError::Cancelled)
		}
		Err(e) => {
			let message = e.to_string();
			repository
				.record_run_complete(&run_id, JobStatus::Failed, duration_ms, Some(message.clone()), None)
				.await?;
			warn!(job_id = %job.id(), run_id = %run_id, error = %message, "Job failed");
			Err(e)
		}
	}
}
