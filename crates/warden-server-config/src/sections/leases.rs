// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dynamic secret lease settings.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasesConfig {
	pub reaper_interval_secs: u64,
	pub reaper_batch_size: u32,
	pub provider_timeout_secs: u64,
	pub max_leases_per_secret: u32,
}

impl Default for LeasesConfig {
	fn default() -> Self {
		Self {
			reaper_interval_secs: 60,
			reaper_batch_size: 100,
			provider_timeout_secs: 10,
			max_leases_per_secret: 50,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeasesConfigLayer {
	#[serde(default)]
	pub reaper_interval_secs: Option<u64>,
	#[serde(default)]
	pub reaper_batch_size: Option<u32>,
	#[serde(default)]
	pub provider_timeout_secs: Option<u64>,
	#[serde(default)]
	pub max_leases_per_secret: Option<u32>,
}

impl LeasesConfigLayer {
	pub fn merge(&mut self, other: LeasesConfigLayer) {
		if other.reaper_interval_secs.is_some() {
			self.reaper_interval_secs = other.reaper_interval_secs;
		}
		if other.reaper_batch_size.is_some() {
			self.reaper_batch_size = other.reaper_batch_size;
		}
		if other.provider_timeout_secs.is_some() {
			self.provider_timeout_secs = other.provider_timeout_secs;
		}
		if other.max_leases_per_secret.is_some() {
			self.max_leases_per_secret = other.max_leases_per_secret;
		}
	}

	pub fn finalize(self) -> LeasesConfig {
		let defaults = LeasesConfig::default();
		LeasesConfig {
			reaper_interval_secs: self
				.reaper_interval_secs
				.unwrap_or(defaults.reaper_interval_secs),
			reaper_batch_size: self.reaper_batch_size.unwrap_or(defaults.reaper_batch_size),
			provider_timeout_secs: self
				.provider_timeout_secs
				.unwrap_or(defaults.provider_timeout_secs),
			max_leases_per_secret: self
				.max_leases_per_secret
				.unwrap_or(defaults.max_leases_per_secret),
		}
	}
}
