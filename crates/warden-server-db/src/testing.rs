// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pool helpers for tests in this and downstream crates.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::migrations::run_migrations;

/// Single-connection in-memory pool with every migration applied.
///
/// Each `:memory:` connection is its own database, so the pool is capped at
/// one connection.
pub async fn create_test_pool() -> SqlitePool {
	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect(":memory:")
		.await
		.expect("in-memory sqlite");
	run_migrations(&pool).await.expect("migrations");
	pool
}
