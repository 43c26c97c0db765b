// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Externally driven rotation scheduling.
//!
//! [`RotationScheduler::tick`] claims due configurations through the
//! single-flight lock and hands them to a [`RotationWorker`] over a bounded
//! queue. All coordination between scheduler instances goes through the
//! lock rows; nothing here is shared in memory.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use warden_credentials_core::RotationId;
use warden_server_db::now;

use crate::error::Result;
use crate::executor::{RotationExecutor, RotationOutcome};
use crate::lock::RotationLockStore;
use crate::repository::RotationStore;

/// A configuration whose lock is held by `holder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationTask {
	pub config_id: RotationId,
	pub holder: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
	/// Locked and queued for the worker.
	pub claimed: usize,
	/// Due, but another holder owns the lock.
	pub skipped: usize,
	/// Locked, but the queue was full; the lock was handed back.
	pub deferred: usize,
}

pub struct RotationScheduler {
	store: Arc<dyn RotationStore>,
	locks: Arc<dyn RotationLockStore>,
	sender: mpsc::Sender<RotationTask>,
	holder: String,
	lock_ttl: ChronoDuration,
}

impl RotationScheduler {
	pub fn new(
		store: Arc<dyn RotationStore>,
		locks: Arc<dyn RotationLockStore>,
		sender: mpsc::Sender<RotationTask>,
		lock_ttl: ChronoDuration,
	) -> Self {
		Self {
			store,
			locks,
			sender,
			holder: format!("scheduler-{}", uuid::Uuid::new_v4()),
			lock_ttl,
		}
	}

	pub fn with_holder(mut self, holder: impl Into<String>) -> Self {
		self.holder = holder.into();
		self
	}

	pub fn holder(&self) -> &str {
		&self.holder
	}

	#[tracing::instrument(skip(self), fields(holder = %self.holder))]
	pub async fn tick(&self) -> Result<TickReport> {
		let now = now();
		let mut report = TickReport::default();

		let due = self
			.store
			.list_candidates(now)
			.await?
			.into_iter()
			.filter(|config| config.is_due(now));

		for config in due {
			if !self
				.locks
				.acquire(config.id, &self.holder, now, self.lock_ttl)
				.await?
			{
				tracing::debug!(config_id = %config.id, "rotation lock held elsewhere");
				report.skipped += 1;
				continue;
			}

			// Another worker may have finished a cycle between the listing and
			// the lock.
			let still_due = self
				.store
				.get(config.id)
				.await?
				.is_some_and(|current| current.is_due(now));
			if !still_due {
				self.locks.release(config.id, &self.holder).await?;
				continue;
			}

			let task = RotationTask {
				config_id: config.id,
				holder: self.holder.clone(),
			};
			match self.sender.try_send(task) {
				Ok(()) => {
					tracing::debug!(config_id = %config.id, "rotation queued");
					report.claimed += 1;
				}
				Err(e) => {
					tracing::warn!(config_id = %config.id, error = %e, "rotation queue unavailable, deferring");
					self.locks.release(config.id, &self.holder).await?;
					report.deferred += 1;
				}
			}
		}

		if report.claimed > 0 || report.deferred > 0 {
			tracing::info!(
				claimed = report.claimed,
				skipped = report.skipped,
				deferred = report.deferred,
				"rotation tick"
			);
		}
		Ok(report)
	}
}

/// Drains the rotation queue, one cycle at a time.
pub struct RotationWorker {
	receiver: mpsc::Receiver<RotationTask>,
	executor: RotationExecutor,
}

impl RotationWorker {
	pub fn new(receiver: mpsc::Receiver<RotationTask>, executor: RotationExecutor) -> Self {
		Self { receiver, executor }
	}

	/// Runs until shutdown is signalled or every sender is dropped.
	pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
		tracing::info!("rotation worker started");
		loop {
			tokio::select! {
				_ = shutdown.recv() => {
					tracing::info!("rotation worker shutting down");
					break;
				}
				task = self.receiver.recv() => match task {
					Some(task) => {
						self.handle(task).await;
					}
					None => break,
				},
			}
		}
	}

	/// Executes the next queued task, if any, without waiting.
	pub async fn process_next(&mut self) -> Option<Result<RotationOutcome>> {
		let task = self.receiver.try_recv().ok()?;
		Some(self.handle(task).await)
	}

	async fn handle(&self, task: RotationTask) -> Result<RotationOutcome> {
		let result = self.executor.execute(task.config_id, &task.holder).await;
		if let Err(e) = &result {
			tracing::warn!(config_id = %task.config_id, error = %e, "rotation cycle did not complete");
		}
		result
	}
}
