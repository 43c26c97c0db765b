// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod database;
mod jobs;
mod leases;
mod lockout;
mod logging;
mod rotation;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use jobs::{JobsConfig, JobsConfigLayer};
pub use leases::{LeasesConfig, LeasesConfigLayer};
pub use lockout::{LockoutConfig, LockoutConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use rotation::{RotationConfig, RotationConfigLayer};
