// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Auth Credential Manager: access tokens and client secrets.

mod manager;
mod repository;

pub use manager::{CredentialManager, IssueRequest, IssuedCredential};
pub use repository::{CredentialRepository, CredentialStore};
