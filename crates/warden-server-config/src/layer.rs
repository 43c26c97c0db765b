// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

use crate::sections::{
	DatabaseConfigLayer, JobsConfigLayer, LeasesConfigLayer, LockoutConfigLayer,
	LoggingConfigLayer, RotationConfigLayer,
};

/// One partially specified configuration, as read from a single source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub lockout: Option<LockoutConfigLayer>,
	#[serde(default)]
	pub leases: Option<LeasesConfigLayer>,
	#[serde(default)]
	pub rotation: Option<RotationConfigLayer>,
	#[serde(default)]
	pub jobs: Option<JobsConfigLayer>,
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	match (base.as_mut(), other) {
		(Some(existing), Some(incoming)) => merge(existing, incoming),
		(None, Some(incoming)) => *base = Some(incoming),
		(_, None) => {}
	}
}

impl ServerConfigLayer {
	/// Overlays `other` on top of `self`; fields set in `other` win.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_section(&mut self.lockout, other.lockout, LockoutConfigLayer::merge);
		merge_section(&mut self.leases, other.leases, LeasesConfigLayer::merge);
		merge_section(&mut self.rotation, other.rotation, RotationConfigLayer::merge);
		merge_section(&mut self.jobs, other.jobs, JobsConfigLayer::merge);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn later_layer_wins_per_field() {
		let mut base: ServerConfigLayer = toml::from_str(
			r#"
			[database]
			url = "sqlite:/var/lib/warden/warden.db"

			[rotation]
			lock_ttl_secs = 900
			tick_interval_secs = 30
			"#,
		)
		.unwrap();
		let overlay = ServerConfigLayer {
			rotation: Some(RotationConfigLayer {
				tick_interval_secs: Some(15),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(overlay);

		let rotation = base.rotation.unwrap();
		assert_eq!(rotation.tick_interval_secs, Some(15));
		assert_eq!(rotation.lock_ttl_secs, Some(900));
		assert_eq!(
			base.database.unwrap().url.as_deref(),
			Some("sqlite:/var/lib/warden/warden.db")
		);
	}
}
