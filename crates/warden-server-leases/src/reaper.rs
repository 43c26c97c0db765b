// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Serialize;
use warden_credentials_core::LeaseStatus;
use warden_server_db::now;

use crate::error::Result;
use crate::manager::LeaseManager;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReapReport {
	pub expired: u64,
	pub teardown_failures: u64,
}

/// Sweeps active leases past their expiry.
///
/// Each lease is moved to `expired` with a conditional update; only the
/// sweep that wins the update tears the external credential down. Teardown
/// is attempted once: failures are logged and recorded on the lease, never
/// retried here.
#[derive(Clone)]
pub struct LeaseReaper {
	manager: LeaseManager,
}

impl LeaseReaper {
	pub fn new(manager: LeaseManager) -> Self {
		Self { manager }
	}

	#[tracing::instrument(skip(self))]
	pub async fn sweep(&self) -> Result<ReapReport> {
		let batch_size = self.manager.config().reaper_batch_size.max(1);
		let mut report = ReapReport::default();

		loop {
			let now = now();
			let batch = self.manager.leases().list_expired_active(now, batch_size).await?;
			let batch_len = batch.len();

			for lease in batch {
				if !self
					.manager
					.leases()
					.finish_lease(lease.id, LeaseStatus::Expired, now)
					.await?
				{
					continue;
				}
				report.expired += 1;

				match self.manager.teardown(&lease).await {
					Ok(None) => {}
					Ok(Some(_)) => report.teardown_failures += 1,
					Err(e) => {
						tracing::warn!(lease_id = %lease.id, error = %e, "could not record teardown failure");
						report.teardown_failures += 1;
					}
				}
			}

			if batch_len < batch_size as usize {
				break;
			}
		}

		if report.expired > 0 {
			tracing::info!(
				expired = report.expired,
				teardown_failures = report.teardown_failures,
				"lease reaper sweep complete"
			);
		}
		Ok(report)
	}
}
