// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistence plumbing shared by the Warden server crates.

pub mod error;
pub mod int;
pub mod migrations;
pub mod pool;
pub mod testing;
pub mod time;

pub use error::{DbError, Result};
pub use int::{from_db_int, to_db_int};
pub use migrations::run_migrations;
pub use pool::create_pool;
pub use sqlx::sqlite::SqlitePool;
pub use time::{format_optional, format_timestamp, now, parse_optional, parse_timestamp};
