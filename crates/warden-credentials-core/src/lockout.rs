// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Brute-force lockout policy and per-scope failure state.
//!
//! The persisted transition is a single conditional upsert in
//! `warden-server-auth`; [`LockoutState::apply`] is the in-memory model of
//! that statement and is what the policy is tested against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::{add_secs, secs};
use crate::error::CoreError;

pub const DEFAULT_LOCKOUT_THRESHOLD: u32 = 3;
pub const DEFAULT_LOCKOUT_DURATION_SECS: u64 = 300;
pub const DEFAULT_COUNTER_RESET_SECS: u64 = 30;

pub const THRESHOLD_RANGE: std::ops::RangeInclusive<u32> = 1..=30;
pub const DURATION_RANGE: std::ops::RangeInclusive<u64> = 30..=86_400;
pub const COUNTER_RESET_RANGE: std::ops::RangeInclusive<u64> = 5..=3_600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutPolicy {
	pub enabled: bool,
	pub threshold: u32,
	pub lockout_duration_secs: u64,
	pub counter_reset_secs: u64,
}

impl Default for LockoutPolicy {
	fn default() -> Self {
		Self {
			enabled: true,
			threshold: DEFAULT_LOCKOUT_THRESHOLD,
			lockout_duration_secs: DEFAULT_LOCKOUT_DURATION_SECS,
			counter_reset_secs: DEFAULT_COUNTER_RESET_SECS,
		}
	}
}

impl LockoutPolicy {
	pub fn validate(&self) -> Result<(), CoreError> {
		if !THRESHOLD_RANGE.contains(&self.threshold) {
			return Err(CoreError::InvalidValue {
				field: "lockout threshold",
				value: self.threshold.to_string(),
			});
		}
		if !DURATION_RANGE.contains(&self.lockout_duration_secs) {
			return Err(CoreError::InvalidValue {
				field: "lockout duration",
				value: self.lockout_duration_secs.to_string(),
			});
		}
		if !COUNTER_RESET_RANGE.contains(&self.counter_reset_secs) {
			return Err(CoreError::InvalidValue {
				field: "lockout counter reset",
				value: self.counter_reset_secs.to_string(),
			});
		}
		Ok(())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
	Success,
	Failure,
}

/// Result of a lockout check or record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutDecision {
	pub allowed: bool,
	pub retry_after_secs: Option<u64>,
}

impl LockoutDecision {
	pub fn allow() -> Self {
		Self {
			allowed: true,
			retry_after_secs: None,
		}
	}

	pub fn deny(retry_after_secs: u64) -> Self {
		Self {
			allowed: false,
			retry_after_secs: Some(retry_after_secs),
		}
	}
}

/// Failure counter for one `<auth-method>:<principal>` scope.
///
/// `window_start` is the time of the most recent counted failure; the counter
/// starts over once `counter_reset_secs` have passed since then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutState {
	pub scope_key: String,
	pub failure_count: u32,
	pub window_start: DateTime<Utc>,
	pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
	pub fn new(scope_key: impl Into<String>, now: DateTime<Utc>) -> Self {
		Self {
			scope_key: scope_key.into(),
			failure_count: 0,
			window_start: now,
			locked_until: None,
		}
	}

	pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
		self.locked_until.is_some_and(|until| now < until)
	}

	/// Seconds until the lock lifts, rounded up.
	pub fn retry_after_secs(&self, now: DateTime<Utc>) -> Option<u64> {
		let until = self.locked_until.filter(|until| now < *until)?;
		let millis = (until - now).num_milliseconds().max(0) as u64;
		Some(millis.div_ceil(1000).max(1))
	}

	pub fn decision(&self, now: DateTime<Utc>) -> LockoutDecision {
		match self.retry_after_secs(now) {
			Some(retry) => LockoutDecision::deny(retry),
			None => LockoutDecision::allow(),
		}
	}

	/// Applies one attempt. A locked scope is left untouched.
	pub fn apply(
		&mut self,
		policy: &LockoutPolicy,
		outcome: AttemptOutcome,
		now: DateTime<Utc>,
	) -> LockoutDecision {
		if !policy.enabled {
			return LockoutDecision::allow();
		}
		if let Some(retry) = self.retry_after_secs(now) {
			return LockoutDecision::deny(retry);
		}

		match outcome {
			AttemptOutcome::Success => {
				self.failure_count = 0;
				self.locked_until = None;
				LockoutDecision::allow()
			}
			AttemptOutcome::Failure => {
				let stale = self.locked_until.is_some()
					|| now - self.window_start > secs(policy.counter_reset_secs);
				self.failure_count = if stale { 1 } else { self.failure_count + 1 };
				self.window_start = now;
				if self.failure_count >= policy.threshold {
					self.locked_until = Some(add_secs(now, policy.lockout_duration_secs));
					LockoutDecision::deny(policy.lockout_duration_secs)
				} else {
					self.locked_until = None;
					LockoutDecision::allow()
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;
	use proptest::prelude::*;

	fn now() -> DateTime<Utc> {
		DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
			.unwrap()
			.with_timezone(&Utc)
	}

	#[test]
	fn default_policy_is_valid() {
		assert!(LockoutPolicy::default().validate().is_ok());
	}

	#[test]
	fn out_of_range_policy_is_rejected() {
		let policy = LockoutPolicy {
			threshold: 0,
			..Default::default()
		};
		assert!(policy.validate().is_err());

		let policy = LockoutPolicy {
			lockout_duration_secs: 10,
			..Default::default()
		};
		assert!(policy.validate().is_err());

		let policy = LockoutPolicy {
			counter_reset_secs: 7200,
			..Default::default()
		};
		assert!(policy.validate().is_err());
	}

	#[test]
	fn locks_after_threshold_failures() {
		let policy = LockoutPolicy::default();
		let mut state = LockoutState::new("access_token:abc", now());

		assert!(state.apply(&policy, AttemptOutcome::Failure, now()).allowed);
		assert!(state.apply(&policy, AttemptOutcome::Failure, now()).allowed);
		let decision = state.apply(&policy, AttemptOutcome::Failure, now());
		assert!(!decision.allowed);
		assert_eq!(decision.retry_after_secs, Some(300));

		let later = now() + Duration::seconds(10);
		let decision = state.apply(&policy, AttemptOutcome::Success, later);
		assert_eq!(decision, LockoutDecision::deny(290));
		assert_eq!(state.failure_count, 3);
	}

	#[test]
	fn lock_expires_and_success_clears() {
		let policy = LockoutPolicy::default();
		let mut state = LockoutState::new("scope", now());
		for _ in 0..3 {
			state.apply(&policy, AttemptOutcome::Failure, now());
		}

		let after = now() + Duration::seconds(300);
		assert!(!state.is_locked(after));
		assert!(state.apply(&policy, AttemptOutcome::Success, after).allowed);
		assert_eq!(state.failure_count, 0);
		assert_eq!(state.locked_until, None);
	}

	#[test]
	fn counter_resets_after_quiet_window() {
		let policy = LockoutPolicy::default();
		let mut state = LockoutState::new("scope", now());
		state.apply(&policy, AttemptOutcome::Failure, now());
		state.apply(&policy, AttemptOutcome::Failure, now());

		let later = now() + Duration::seconds(31);
		assert!(state.apply(&policy, AttemptOutcome::Failure, later).allowed);
		assert_eq!(state.failure_count, 1);
	}

	#[test]
	fn disabled_policy_never_locks() {
		let policy = LockoutPolicy {
			enabled: false,
			..Default::default()
		};
		let mut state = LockoutState::new("scope", now());
		for _ in 0..50 {
			assert!(state.apply(&policy, AttemptOutcome::Failure, now()).allowed);
		}
		assert_eq!(state.failure_count, 0);
	}

	proptest! {
		#[test]
		fn locked_scope_is_never_mutated(
			outcomes in proptest::collection::vec(any::<bool>(), 1..40),
			threshold in 1u32..=5,
		) {
			let policy = LockoutPolicy { threshold, ..Default::default() };
			let mut state = LockoutState::new("scope", now());
			for success in outcomes {
				let outcome = if success { AttemptOutcome::Success } else { AttemptOutcome::Failure };
				let before = state.clone();
				let was_locked = state.is_locked(now());
				let decision = state.apply(&policy, outcome, now());
				if was_locked {
					prop_assert!(!decision.allowed);
					prop_assert_eq!(&state, &before);
				}
				prop_assert!(state.failure_count <= threshold);
			}
		}
	}
}
