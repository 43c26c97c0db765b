// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dual-slot rotation configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::credential::add_secs;
use crate::error::CoreError;
use crate::ids::RotationId;
use crate::password::PasswordRequirements;

/// Index into the fixed pair of credential slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotIndex {
	Zero,
	One,
}

impl SlotIndex {
	pub fn other(self) -> Self {
		match self {
			SlotIndex::Zero => SlotIndex::One,
			SlotIndex::One => SlotIndex::Zero,
		}
	}

	pub fn as_usize(self) -> usize {
		match self {
			SlotIndex::Zero => 0,
			SlotIndex::One => 1,
		}
	}
}

impl TryFrom<i64> for SlotIndex {
	type Error = CoreError;

	fn try_from(value: i64) -> Result<Self, Self::Error> {
		match value {
			0 => Ok(SlotIndex::Zero),
			1 => Ok(SlotIndex::One),
			other => Err(CoreError::InvalidValue {
				field: "slot index",
				value: other.to_string(),
			}),
		}
	}
}

impl From<SlotIndex> for i64 {
	fn from(value: SlotIndex) -> Self {
		value.as_usize() as i64
	}
}

/// Envelope-encrypted secret value: the value is sealed under a random data
/// key, which is itself sealed under the master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
	pub ciphertext: Vec<u8>,
	pub nonce: Vec<u8>,
	pub wrapped_key: Vec<u8>,
	pub key_nonce: Vec<u8>,
}

/// One of the two identities a configuration alternates between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSlot {
	/// Provider-specific identity at the target system (e.g. a database
	/// username).
	pub identity: String,
	pub sealed_secret: SealedSecret,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStatus {
	Idle,
	Rotating,
	Failed,
}

impl fmt::Display for RotationStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RotationStatus::Idle => write!(f, "idle"),
			RotationStatus::Rotating => write!(f, "rotating"),
			RotationStatus::Failed => write!(f, "failed"),
		}
	}
}

impl FromStr for RotationStatus {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"idle" => Ok(RotationStatus::Idle),
			"rotating" => Ok(RotationStatus::Rotating),
			"failed" => Ok(RotationStatus::Failed),
			other => Err(CoreError::InvalidValue {
				field: "rotation status",
				value: other.to_string(),
			}),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationConfiguration {
	pub id: RotationId,
	pub name: String,
	pub rotation_type: String,
	pub interval_secs: u64,
	/// Provider-specific settings; opaque to the engine.
	pub parameters: serde_json::Value,
	pub generation: PasswordRequirements,
	pub slots: [CredentialSlot; 2],
	pub active_slot: SlotIndex,
	pub status: RotationStatus,
	pub last_rotated_at: Option<DateTime<Utc>>,
	pub last_failure_message: Option<String>,
	/// Bumped on every write; guards the slot flip.
	pub version: i64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl RotationConfiguration {
	pub fn active(&self) -> &CredentialSlot {
		&self.slots[self.active_slot.as_usize()]
	}

	pub fn inactive(&self) -> &CredentialSlot {
		&self.slots[self.active_slot.other().as_usize()]
	}

	pub fn next_rotation_at(&self) -> Option<DateTime<Utc>> {
		self.last_rotated_at
			.map(|last| add_secs(last, self.interval_secs))
	}

	/// Whether the interval has elapsed. Never-rotated configurations are due.
	pub fn is_due(&self, now: DateTime<Utc>) -> bool {
		self.next_rotation_at().map_or(true, |next| now >= next)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	fn slot(identity: &str) -> CredentialSlot {
		CredentialSlot {
			identity: identity.to_string(),
			sealed_secret: SealedSecret {
				ciphertext: vec![1, 2, 3],
				nonce: vec![0; 12],
				wrapped_key: vec![4, 5, 6],
				key_nonce: vec![0; 12],
			},
		}
	}

	fn config(last_rotated_at: Option<DateTime<Utc>>) -> RotationConfiguration {
		let now = Utc::now();
		RotationConfiguration {
			id: RotationId::generate(),
			name: "orders-db".to_string(),
			rotation_type: "sql-password".to_string(),
			interval_secs: 3600,
			parameters: serde_json::json!({"host": "db"}),
			generation: PasswordRequirements::default(),
			slots: [slot("orders_a"), slot("orders_b")],
			active_slot: SlotIndex::Zero,
			status: RotationStatus::Idle,
			last_rotated_at,
			last_failure_message: None,
			version: 1,
			created_at: now,
			updated_at: now,
		}
	}

	#[test]
	fn slot_index_alternates() {
		assert_eq!(SlotIndex::Zero.other(), SlotIndex::One);
		assert_eq!(SlotIndex::One.other().other(), SlotIndex::One);
		assert_eq!(SlotIndex::try_from(1).unwrap(), SlotIndex::One);
		assert!(SlotIndex::try_from(2).is_err());
	}

	#[test]
	fn active_and_inactive_slots() {
		let mut cfg = config(None);
		assert_eq!(cfg.active().identity, "orders_a");
		assert_eq!(cfg.inactive().identity, "orders_b");
		cfg.active_slot = SlotIndex::One;
		assert_eq!(cfg.active().identity, "orders_b");
	}

	#[test]
	fn due_after_interval() {
		let now = Utc::now();
		assert!(config(None).is_due(now));
		assert!(config(Some(now - Duration::seconds(3700))).is_due(now));
		assert!(config(Some(now - Duration::seconds(3600))).is_due(now));
		assert!(!config(Some(now - Duration::seconds(100))).is_due(now));
	}

	#[test]
	fn status_roundtrips() {
		for status in [RotationStatus::Idle, RotationStatus::Rotating, RotationStatus::Failed] {
			assert_eq!(status.to_string().parse::<RotationStatus>().unwrap(), status);
		}
	}
}
