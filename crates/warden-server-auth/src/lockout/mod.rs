// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lockout Guard: per-principal failure counters and lock windows.

mod guard;
mod repository;

pub use guard::{scope_key, LockoutGuard};
pub use repository::{LockoutRepository, LockoutStore};
