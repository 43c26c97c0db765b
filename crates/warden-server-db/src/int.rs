// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite stores integers as i64; domain counters and durations are u64.

pub fn to_db_int(value: u64) -> i64 {
	i64::try_from(value).unwrap_or(i64::MAX)
}

pub fn from_db_int(value: i64) -> u64 {
	u64::try_from(value).unwrap_or(0)
}
