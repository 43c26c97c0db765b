// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rotation scheduler settings.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationConfig {
	pub tick_interval_secs: u64,
	pub lock_ttl_secs: u64,
	pub provider_timeout_secs: u64,
	pub queue_capacity: usize,
}

impl Default for RotationConfig {
	fn default() -> Self {
		Self {
			tick_interval_secs: 60,
			lock_ttl_secs: 600,
			provider_timeout_secs: 30,
			queue_capacity: 256,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RotationConfigLayer {
	#[serde(default)]
	pub tick_interval_secs: Option<u64>,
	#[serde(default)]
	pub lock_ttl_secs: Option<u64>,
	#[serde(default)]
	pub provider_timeout_secs: Option<u64>,
	#[serde(default)]
	pub queue_capacity: Option<usize>,
}

impl RotationConfigLayer {
	pub fn merge(&mut self, other: RotationConfigLayer) {
		if other.tick_interval_secs.is_some() {
			self.tick_interval_secs = other.tick_interval_secs;
		}
		if other.lock_ttl_secs.is_some() {
			self.lock_ttl_secs = other.lock_ttl_secs;
		}
		if other.provider_timeout_secs.is_some() {
			self.provider_timeout_secs = other.provider_timeout_secs;
		}
		if other.queue_capacity.is_some() {
			self.queue_capacity = other.queue_capacity;
		}
	}

	pub fn finalize(self) -> RotationConfig {
		let defaults = RotationConfig::default();
		RotationConfig {
			tick_interval_secs: self.tick_interval_secs.unwrap_or(defaults.tick_interval_secs),
			lock_ttl_secs: self.lock_ttl_secs.unwrap_or(defaults.lock_ttl_secs),
			provider_timeout_secs: self
				.provider_timeout_secs
				.unwrap_or(defaults.provider_timeout_secs),
			queue_capacity: self.queue_capacity.unwrap_or(defaults.queue_capacity),
		}
	}
}
