// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Brute-force lockout defaults.

use serde::Deserialize;
use warden_credentials_core::lockout::{
	DEFAULT_COUNTER_RESET_SECS, DEFAULT_LOCKOUT_DURATION_SECS, DEFAULT_LOCKOUT_THRESHOLD,
};
use warden_credentials_core::LockoutPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutConfig {
	pub enabled: bool,
	pub threshold: u32,
	pub duration_secs: u64,
	pub counter_reset_secs: u64,
	pub cleanup_interval_secs: u64,
}

impl Default for LockoutConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			threshold: DEFAULT_LOCKOUT_THRESHOLD,
			duration_secs: DEFAULT_LOCKOUT_DURATION_SECS,
			counter_reset_secs: DEFAULT_COUNTER_RESET_SECS,
			cleanup_interval_secs: 3600,
		}
	}
}

impl LockoutConfig {
	pub fn policy(&self) -> LockoutPolicy {
		LockoutPolicy {
			enabled: self.enabled,
			threshold: self.threshold,
			lockout_duration_secs: self.duration_secs,
			counter_reset_secs: self.counter_reset_secs,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LockoutConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub threshold: Option<u32>,
	#[serde(default)]
	pub duration_secs: Option<u64>,
	#[serde(default)]
	pub counter_reset_secs: Option<u64>,
	#[serde(default)]
	pub cleanup_interval_secs: Option<u64>,
}

impl LockoutConfigLayer {
	pub fn merge(&mut self, other: LockoutConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.threshold.is_some() {
			self.threshold = other.threshold;
		}
		if other.duration_secs.is_some() {
			self.duration_secs = other.duration_secs;
		}
		if other.counter_reset_secs.is_some() {
			self.counter_reset_secs = other.counter_reset_secs;
		}
		if other.cleanup_interval_secs.is_some() {
			self.cleanup_interval_secs = other.cleanup_interval_secs;
		}
	}

	pub fn finalize(self) -> LockoutConfig {
		let defaults = LockoutConfig::default();
		LockoutConfig {
			enabled: self.enabled.unwrap_or(defaults.enabled),
			threshold: self.threshold.unwrap_or(defaults.threshold),
			duration_secs: self.duration_secs.unwrap_or(defaults.duration_secs),
			counter_reset_secs: self.counter_reset_secs.unwrap_or(defaults.counter_reset_secs),
			cleanup_interval_secs: self
				.cleanup_interval_secs
				.unwrap_or(defaults.cleanup_interval_secs),
		}
	}
}
