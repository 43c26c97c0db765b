// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Warden credential lifecycle engine.
//!
//! This crate holds the entities whose lifetimes the server crates manage:
//!
//! - [`AuthCredential`]: access tokens and client secrets with TTL, max-TTL
//!   and usage ceilings
//! - [`LockoutState`] / [`LockoutPolicy`]: brute-force counters per scope
//! - [`DynamicSecret`] / [`DynamicSecretLease`]: provider-issued ephemeral
//!   credentials
//! - [`RotationConfiguration`]: dual-slot scheduled rotation
//!
//! plus the secret generation policy ([`PasswordRequirements`],
//! [`generate_password`]). Nothing here performs I/O.

pub mod credential;
pub mod error;
pub mod ids;
pub mod lease;
pub mod lockout;
pub mod password;
pub mod provider;
pub mod rotation;

pub use credential::{add_secs, AuthCredential, CredentialKind, MAX_TTL_SECS};
pub use error::{CoreError, Result};
pub use ids::{CredentialId, DynamicSecretId, LeaseId, OwnerId, RotationId};
pub use lease::{DynamicSecret, DynamicSecretLease, LeaseStatus};
pub use lockout::{AttemptOutcome, LockoutDecision, LockoutPolicy, LockoutState};
pub use password::{generate_password, PasswordPolicyError, PasswordRequirements, RequiredCharacters};
pub use provider::{truncate_failure, ProviderError, MAX_FAILURE_MESSAGE_LEN};
pub use rotation::{CredentialSlot, RotationConfiguration, RotationStatus, SealedSecret, SlotIndex};
