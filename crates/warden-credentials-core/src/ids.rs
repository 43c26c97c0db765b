// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Type-safe identifiers.
//!
//! Each entity gets its own UUID newtype so a lease id can never be passed
//! where a credential id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			/// Create a new ID from a UUID.
			pub fn new(id: Uuid) -> Self {
				Self(id)
			}

			/// Generate a new random ID.
			pub fn generate() -> Self {
				Self(Uuid::new_v4())
			}

			/// Get the inner UUID value.
			pub fn into_inner(self) -> Uuid {
				self.0
			}

			/// Get a reference to the inner UUID.
			pub fn as_uuid(&self) -> &Uuid {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Ok(Self(Uuid::parse_str(s)?))
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}

		impl From<$name> for Uuid {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_id_type!(CredentialId, "Unique identifier for an access token or client secret.");
define_id_type!(OwnerId, "Identity that owns a credential.");
define_id_type!(DynamicSecretId, "Unique identifier for a dynamic secret configuration.");
define_id_type!(LeaseId, "Unique identifier for a dynamic secret lease.");
define_id_type!(RotationId, "Unique identifier for a rotation configuration.");

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_and_parse_roundtrip() {
		let id = LeaseId::generate();
		let parsed: LeaseId = id.to_string().parse().unwrap();
		assert_eq!(id, parsed);
	}

	#[test]
	fn parse_rejects_garbage() {
		assert!("not-a-uuid".parse::<CredentialId>().is_err());
	}

	#[test]
	fn parse_accepts_simple_hex_form() {
		let id = CredentialId::generate();
		let simple = id.as_uuid().simple().to_string();
		assert_eq!(simple.parse::<CredentialId>().unwrap(), id);
	}
}
