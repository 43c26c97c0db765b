// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;
use warden_server_db::DbError;

#[derive(Debug, Error)]
pub enum JobError {
	#[error("job not found: {0}")]
	NotFound(String),

	#[error("job failed: {0}")]
	Failed(String),

	#[error("job cancelled")]
	Cancelled,

	#[error(transparent)]
	Database(#[from] DbError),
}

impl From<sqlx::Error> for JobError {
	fn from(e: sqlx::Error) -> Self {
		JobError::Database(DbError::Sqlx(e))
	}
}

pub type Result<T> = std::result::Result<T, JobError>;
