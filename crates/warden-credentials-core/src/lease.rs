// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dynamic secrets and the ephemeral leases minted from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::credential::add_secs;
use crate::error::CoreError;
use crate::ids::{DynamicSecretId, LeaseId};

/// A provider-backed template that leases are issued from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicSecret {
	pub id: DynamicSecretId,
	pub name: String,
	pub provider_type: String,
	/// Provider-specific settings; opaque to the engine.
	pub parameters: serde_json::Value,
	pub default_ttl_secs: u64,
	/// Ceiling on a lease's lifetime measured from its creation. 0 = unbounded.
	pub max_ttl_secs: u64,
	pub created_at: DateTime<Utc>,
}

impl DynamicSecret {
	/// The latest expiry any lease created at `created_at` may reach.
	pub fn lease_deadline(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
		(self.max_ttl_secs > 0).then(|| add_secs(created_at, self.max_ttl_secs))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
	Active,
	Expired,
	Revoked,
}

impl LeaseStatus {
	pub fn is_terminal(&self) -> bool {
		!matches!(self, LeaseStatus::Active)
	}
}

impl fmt::Display for LeaseStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LeaseStatus::Active => write!(f, "active"),
			LeaseStatus::Expired => write!(f, "expired"),
			LeaseStatus::Revoked => write!(f, "revoked"),
		}
	}
}

impl FromStr for LeaseStatus {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"active" => Ok(LeaseStatus::Active),
			"expired" => Ok(LeaseStatus::Expired),
			"revoked" => Ok(LeaseStatus::Revoked),
			other => Err(CoreError::InvalidValue {
				field: "lease status",
				value: other.to_string(),
			}),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSecretLease {
	pub id: LeaseId,
	pub dynamic_secret_id: DynamicSecretId,
	/// Identifier of the credential at the external system.
	pub external_ref: String,
	pub status: LeaseStatus,
	pub expires_at: DateTime<Utc>,
	pub renewal_count: u32,
	/// Set when provider teardown failed and the external credential may be
	/// orphaned.
	pub teardown_error: Option<String>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl DynamicSecretLease {
	/// Active and not yet past its expiry.
	pub fn is_live(&self, now: DateTime<Utc>) -> bool {
		self.status == LeaseStatus::Active && now < self.expires_at
	}

	pub fn is_orphaned(&self) -> bool {
		self.teardown_error.is_some()
	}
}
