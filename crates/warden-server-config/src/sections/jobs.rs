// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background job settings.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobsConfig {
	/// Finished job runs older than this are deleted.
	pub history_retention_days: u32,
	pub history_cleanup_interval_secs: u64,
}

impl Default for JobsConfig {
	fn default() -> Self {
		Self {
			history_retention_days: 90,
			history_cleanup_interval_secs: 86_400,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobsConfigLayer {
	#[serde(default)]
	pub history_retention_days: Option<u32>,
	#[serde(default)]
	pub history_cleanup_interval_secs: Option<u64>,
}

impl JobsConfigLayer {
	pub fn merge(&mut self, other: JobsConfigLayer) {
		if other.history_retention_days.is_some() {
			self.history_retention_days = other.history_retention_days;
		}
		if other.history_cleanup_interval_secs.is_some() {
			self.history_cleanup_interval_secs = other.history_cleanup_interval_secs;
		}
	}

	pub fn finalize(self) -> JobsConfig {
		let defaults = JobsConfig::default();
		JobsConfig {
			history_retention_days: self
				.history_retention_days
				.unwrap_or(defaults.history_retention_days),
			history_cleanup_interval_secs: self
				.history_cleanup_interval_secs
				.unwrap_or(defaults.history_cleanup_interval_secs),
		}
	}
}
