// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use warden_credentials_core::{AttemptOutcome, LockoutDecision, LockoutPolicy};
use warden_server_db::{now, to_db_int};

use super::repository::LockoutStore;
use crate::error::Result;

/// Per-scope brute-force guard.
///
/// Scopes are `<auth-method>:<principal>`. The policy is chosen by the
/// auth-method part, falling back to the default policy.
#[derive(Clone)]
pub struct LockoutGuard {
	store: Arc<dyn LockoutStore>,
	default_policy: LockoutPolicy,
	method_policies: HashMap<String, LockoutPolicy>,
}

pub fn scope_key(method: &str, principal: &str) -> String {
	format!("{method}:{principal}")
}

impl LockoutGuard {
	pub fn new(store: Arc<dyn LockoutStore>, default_policy: LockoutPolicy) -> Self {
		Self {
			store,
			default_policy,
			method_policies: HashMap::new(),
		}
	}

	pub fn with_method_policy(mut self, method: impl Into<String>, policy: LockoutPolicy) -> Self {
		self.method_policies.insert(method.into(), policy);
		self
	}

	pub fn policy_for(&self, scope_key: &str) -> &LockoutPolicy {
		scope_key
			.split_once(':')
			.and_then(|(method, _)| self.method_policies.get(method))
			.unwrap_or(&self.default_policy)
	}

	/// Read-only check, run before any credential lookup.
	#[tracing::instrument(skip(self))]
	pub async fn check(&self, scope_key: &str) -> Result<LockoutDecision> {
		if !self.policy_for(scope_key).enabled {
			return Ok(LockoutDecision::allow());
		}
		let state = self.store.get_state(scope_key).await?;
		Ok(state.map_or_else(LockoutDecision::allow, |s| s.decision(now())))
	}

	/// Records an attempt. A locked scope is reported as denied and left
	/// untouched.
	#[tracing::instrument(skip(self))]
	pub async fn check_and_record(
		&self,
		scope_key: &str,
		outcome: AttemptOutcome,
	) -> Result<LockoutDecision> {
		let policy = *self.policy_for(scope_key);
		if !policy.enabled {
			return Ok(LockoutDecision::allow());
		}
		let now = now();

		match outcome {
			AttemptOutcome::Failure => match self.store.record_failure(scope_key, &policy, now).await? {
				Some(state) => {
					let decision = state.decision(now);
					if !decision.allowed {
						tracing::warn!(
							failure_count = state.failure_count,
							lockout_secs = policy.lockout_duration_secs,
							"scope locked after repeated failures"
						);
					}
					Ok(decision)
				}
				None => self.locked_decision(scope_key).await,
			},
			AttemptOutcome::Success => {
				if self.store.record_success(scope_key, now).await? {
					Ok(LockoutDecision::allow())
				} else {
					self.locked_decision(scope_key).await
				}
			}
		}
	}

	/// Operator action: clears every scope starting with `scope_prefix`.
	#[tracing::instrument(skip(self))]
	pub async fn clear(&self, scope_prefix: &str) -> Result<u64> {
		let cleared = self.store.clear_prefix(scope_prefix).await?;
		tracing::info!(cleared, "lockouts cleared");
		Ok(cleared)
	}

	/// Drops rows that no longer carry a lock or a live failure window.
	#[tracing::instrument(skip(self))]
	pub async fn cleanup(&self) -> Result<u64> {
		let widest_window = self
			.method_policies
			.values()
			.chain(std::iter::once(&self.default_policy))
			.map(|p| p.counter_reset_secs)
			.max()
			.unwrap_or(self.default_policy.counter_reset_secs);
		let now = now();
		let removed = self
			.store
			.delete_stale(now, now - Duration::seconds(to_db_int(widest_window)))
			.await?;
		tracing::debug!(removed, "stale lockouts removed");
		Ok(removed)
	}

	async fn locked_decision(&self, scope_key: &str) -> Result<LockoutDecision> {
		let now = now();
		let state = self.store.get_state(scope_key).await?;
		Ok(state
			.map(|s| s.decision(now))
			.filter(|d| !d.allowed)
			// The lock lapsed between the write and this read.
			.unwrap_or_else(|| LockoutDecision::deny(1)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lockout::repository::LockoutRepository;
	use warden_server_db::testing::create_test_pool;

	async fn guard(policy: LockoutPolicy) -> LockoutGuard {
		let store = Arc::new(LockoutRepository::new(create_test_pool().await));
		LockoutGuard::new(store, policy)
	}

	#[tokio::test]
	async fn threshold_failures_lock_the_scope() {
		let guard = guard(LockoutPolicy::default()).await;
		let scope = scope_key("access_token", "abc");

		for _ in 0..2 {
			let d = guard.check_and_record(&scope, AttemptOutcome::Failure).await.unwrap();
			assert!(d.allowed);
		}
		let d = guard.check_and_record(&scope, AttemptOutcome::Failure).await.unwrap();
		assert!(!d.allowed);
		assert!(d.retry_after_secs.unwrap() > 290);

		assert!(!guard.check(&scope).await.unwrap().allowed);
		let d = guard.check_and_record(&scope, AttemptOutcome::Success).await.unwrap();
		assert!(!d.allowed);
	}

	#[tokio::test]
	async fn disabled_policy_records_nothing() {
		let guard = guard(LockoutPolicy {
			enabled: false,
			..Default::default()
		})
		.await;
		for _ in 0..10 {
			assert!(guard
				.check_and_record("access_token:x", AttemptOutcome::Failure)
				.await
				.unwrap()
				.allowed);
		}
		assert!(guard.store.get_state("access_token:x").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn method_policy_overrides_default() {
		let guard = guard(LockoutPolicy::default()).await.with_method_policy(
			"client_secret",
			LockoutPolicy {
				threshold: 1,
				..Default::default()
			},
		);
		assert_eq!(guard.policy_for("client_secret:x").threshold, 1);
		assert_eq!(guard.policy_for("access_token:x").threshold, 3);

		let d = guard
			.check_and_record("client_secret:x", AttemptOutcome::Failure)
			.await
			.unwrap();
		assert!(!d.allowed);
	}

	#[tokio::test]
	async fn clear_unlocks_principal() {
		let guard = guard(LockoutPolicy {
			threshold: 1,
			..Default::default()
		})
		.await;
		guard
			.check_and_record("access_token:abc", AttemptOutcome::Failure)
			.await
			.unwrap();
		assert!(!guard.check("access_token:abc").await.unwrap().allowed);

		assert_eq!(guard.clear("access_token:abc").await.unwrap(), 1);
		assert!(guard.check("access_token:abc").await.unwrap().allowed);
	}

	#[tokio::test]
	async fn concurrent_failures_lock_exactly_once() {
		let guard = guard(LockoutPolicy::default()).await;
		let attempts = (0..8).map(|_| {
			let guard = guard.clone();
			async move {
				guard
					.check_and_record("access_token:race", AttemptOutcome::Failure)
					.await
					.unwrap()
			}
		});
		let decisions = futures::future::join_all(attempts).await;

		assert_eq!(decisions.iter().filter(|d| d.allowed).count(), 2);
		let state = guard.store.get_state("access_token:race").await.unwrap().unwrap();
		assert_eq!(state.failure_count, 3);
	}
}
