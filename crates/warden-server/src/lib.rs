// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Warden server library: wires the credential engines to configuration and
//! the periodic job runner.

pub mod jobs;
pub mod state;

#[cfg(test)]
mod testing;

pub use state::{create_app_state, master_key, AppState, Providers, StartupError};
