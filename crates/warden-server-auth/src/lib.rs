// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bearer credential authentication for Warden.
//!
//! [`CredentialManager`] issues, authenticates, renews and revokes access
//! tokens and client secrets. Every verification goes through the
//! [`LockoutGuard`], which counts failures per `<kind>:<credential-id>` scope
//! and rejects locked scopes before any credential lookup.

mod argon2_config;
pub mod credential;
pub mod error;
pub mod lockout;
pub mod token;

pub use credential::{
	CredentialManager, CredentialRepository, CredentialStore, IssueRequest, IssuedCredential,
};
pub use error::{AuthError, Result};
pub use lockout::{scope_key, LockoutGuard, LockoutRepository, LockoutStore};
