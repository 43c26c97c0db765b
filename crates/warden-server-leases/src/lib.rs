// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dynamic secret leases for Warden.
//!
//! A [`DynamicSecret`](warden_credentials_core::DynamicSecret) names a
//! [`LeaseProvider`] and its parameters; [`LeaseManager`] mints bounded
//! leases from it and [`LeaseReaper`] expires them. Leases whose external
//! credential could not be torn down are tracked as orphaned until an
//! operator retries the teardown.

pub mod error;
pub mod manager;
pub mod provider;
pub mod reaper;
pub mod repository;

#[cfg(test)]
mod testing;

pub use error::{LeaseError, Result};
pub use manager::{IssuedLease, LeaseManager, LeaseManagerConfig, NewDynamicSecret, RevokeOutcome};
pub use provider::{ExtendOutcome, LeaseProvider, LeaseProviderRegistry, ProvisionedCredential};
pub use reaper::{LeaseReaper, ReapReport};
pub use repository::{DynamicSecretStore, LeaseRepository, LeaseStore};
