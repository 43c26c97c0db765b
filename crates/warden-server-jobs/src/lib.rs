// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background job scheduler for Warden server.
//!
//! Periodic jobs run on tokio timers and every run is recorded in SQLite. A
//! failed run is not retried; it waits for its next interval.

pub mod context;
pub mod error;
pub mod health;
pub mod job;
pub mod repository;
pub mod scheduler;
pub mod types;

pub use context::{CancellationToken, JobContext};
pub use error::{JobError, Result};
pub use health::{HealthState, JobHealthStatus, JobsHealthStatus, LastRunInfo};
pub use job::Job;
pub use repository::JobRepository;
pub use scheduler::JobScheduler;
pub use types::{JobOutput, JobRun, JobStatus, TriggerSource};
