// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for core credential types.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing or validating core types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
	#[error("invalid {field}: {value}")]
	InvalidValue { field: &'static str, value: String },
}
