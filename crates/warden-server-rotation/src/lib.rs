// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Dual-slot credential rotation for Warden.
//!
//! Each [`RotationConfiguration`](warden_credentials_core::RotationConfiguration)
//! owns two identities at a target system. A cycle sets a freshly generated
//! secret on the inactive identity and then flips which one is active, so
//! consumers always hold a valid credential while the new one propagates.
//!
//! - [`RotationScheduler`] claims due configurations via single-flight locks.
//! - [`RotationExecutor`] runs one cycle and always releases the lock.
//! - [`RotationService`] is the operator API.

pub mod encryption;
pub mod error;
pub mod executor;
pub mod lock;
pub mod provider;
pub mod repository;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod testing;

pub use encryption::MasterKey;
pub use error::{Result, RotationError};
pub use executor::{RotationExecutor, RotationOutcome};
pub use lock::{RotationLock, RotationLockRepository, RotationLockStore};
pub use provider::{RotationProvider, RotationProviderRegistry};
pub use repository::{RotationRepository, RotationStore};
pub use scheduler::{RotationScheduler, RotationTask, RotationWorker, TickReport};
pub use service::{NewRotation, RotationService, RotationServiceConfig, RotationStatusView};
