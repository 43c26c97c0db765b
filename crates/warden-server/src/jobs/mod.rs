// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic background jobs run by the server's [`warden_server_jobs::JobScheduler`].

mod job_history_cleanup;
mod lease_reaper;
mod lockout_cleanup;
mod rotation_tick;

pub use job_history_cleanup::JobHistoryCleanupJob;
pub use lease_reaper::LeaseReaperJob;
pub use lockout_cleanup::LockoutCleanupJob;
pub use rotation_tick::RotationTickJob;
