// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bearer credentials: access tokens and client secrets.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::ids::{CredentialId, OwnerId};

/// The two flavours of long-lived bearer credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
	AccessToken,
	ClientSecret,
}

impl CredentialKind {
	/// Short code embedded in the presented token (`wdn_<code>_...`).
	pub fn token_code(&self) -> &'static str {
		match self {
			CredentialKind::AccessToken => "at",
			CredentialKind::ClientSecret => "cs",
		}
	}

	pub fn from_token_code(code: &str) -> Option<Self> {
		match code {
			"at" => Some(CredentialKind::AccessToken),
			"cs" => Some(CredentialKind::ClientSecret),
			_ => None,
		}
	}
}

impl fmt::Display for CredentialKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CredentialKind::AccessToken => write!(f, "access_token"),
			CredentialKind::ClientSecret => write!(f, "client_secret"),
		}
	}
}

impl FromStr for CredentialKind {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"access_token" => Ok(CredentialKind::AccessToken),
			"client_secret" => Ok(CredentialKind::ClientSecret),
			other => Err(CoreError::InvalidValue {
				field: "credential kind",
				value: other.to_string(),
			}),
		}
	}
}

/// An issued access token or client secret.
///
/// Only the salted fingerprint of the raw secret is kept. `ttl_secs == 0`
/// means the credential never expires on its own; `max_ttl_secs == 0` means
/// renewals have no cumulative ceiling; `uses_limit == 0` means unlimited
/// uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCredential {
	pub id: CredentialId,
	pub owner_id: OwnerId,
	pub kind: CredentialKind,
	#[serde(skip_serializing)]
	pub fingerprint: String,
	pub ttl_secs: u64,
	pub max_ttl_secs: u64,
	pub uses_count: u64,
	pub uses_limit: u64,
	pub last_used_at: Option<DateTime<Utc>>,
	pub last_renewed_at: Option<DateTime<Utc>>,
	pub revoked: bool,
	pub created_at: DateTime<Utc>,
}

impl AuthCredential {
	/// Hard ceiling on the credential's lifetime across all renewals.
	pub fn max_ttl_deadline(&self) -> Option<DateTime<Utc>> {
		(self.max_ttl_secs > 0).then(|| add_secs(self.created_at, self.max_ttl_secs))
	}

	/// Effective expiry: the last renewal (or creation) plus the incremental
	/// TTL, capped by whatever max-TTL budget remains.
	pub fn expires_at(&self) -> Option<DateTime<Utc>> {
		let deadline = self.max_ttl_deadline();
		if self.ttl_secs == 0 {
			return deadline;
		}

		let base = self.last_renewed_at.unwrap_or(self.created_at);
		let expiry = add_secs(base, self.ttl_secs);
		Some(match deadline {
			Some(deadline) => expiry.min(deadline),
			None => expiry,
		})
	}

	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		self.expires_at().is_some_and(|expiry| now >= expiry)
	}

	/// Whether another use would exceed the usage ceiling.
	pub fn uses_exhausted(&self) -> bool {
		self.uses_limit > 0 && self.uses_count >= self.uses_limit
	}
}

/// Longest TTL accepted anywhere in the engine: 100 years.
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

pub(crate) fn secs(value: u64) -> Duration {
	i64::try_from(value)
		.ok()
		.and_then(Duration::try_seconds)
		.unwrap_or(Duration::MAX)
}

/// `base` plus `value` seconds, saturating at the latest representable instant.
pub fn add_secs(base: DateTime<Utc>, value: u64) -> DateTime<Utc> {
	base.checked_add_signed(secs(value))
		.unwrap_or(DateTime::<Utc>::MAX_UTC)
}
