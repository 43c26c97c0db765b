// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Timestamp encoding shared by every repository.
//!
//! Timestamps are stored as RFC 3339 UTC with a fixed microsecond width, so
//! comparing the TEXT columns in SQL orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::DbError;

/// Current time truncated to the stored precision.
pub fn now() -> DateTime<Utc> {
	let now = Utc::now();
	parse_timestamp(&format_timestamp(now)).unwrap_or(now)
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn format_optional(ts: Option<DateTime<Utc>>) -> Option<String> {
	ts.map(format_timestamp)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid timestamp {value:?}: {e}")))
}

pub fn parse_optional(value: Option<&str>) -> Result<Option<DateTime<Utc>>, DbError> {
	value.map(parse_timestamp).transpose()
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, TimeZone};
	use proptest::prelude::*;

	#[test]
	fn fixed_width_encoding() {
		let ts = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
		assert_eq!(format_timestamp(ts), "2025-01-02T03:04:05.000000Z");
	}

	#[test]
	fn rejects_garbage() {
		assert!(parse_timestamp("yesterday").is_err());
	}

	proptest! {
		#[test]
		fn string_order_matches_time_order(a in 0i64..4_000_000_000, b in 0i64..4_000_000_000, micros in 0i64..1_000_000) {
			let base = Utc.timestamp_opt(0, 0).unwrap();
			let ta = base + Duration::seconds(a) + Duration::microseconds(micros);
			let tb = base + Duration::seconds(b);
			prop_assert_eq!(ta.cmp(&tb), format_timestamp(ta).cmp(&format_timestamp(tb)));
			prop_assert_eq!(parse_timestamp(&format_timestamp(ta)).unwrap(), ta);
		}
	}
}
