// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Longest failure detail persisted alongside a lease or rotation.
pub const MAX_FAILURE_MESSAGE_LEN: usize = 255;

/// Failure reported by an external lease or rotation provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
	/// Network failure or timeout. The next natural cycle may succeed.
	#[error("provider unavailable: {0}")]
	Unavailable(String),

	/// The target system refused the request; the message is passed through
	/// verbatim.
	#[error("provider rejected request: {0}")]
	Rejected(String),
}

/// Cuts `message` to [`MAX_FAILURE_MESSAGE_LEN`] characters.
pub fn truncate_failure(message: &str) -> String {
	message.chars().take(MAX_FAILURE_MESSAGE_LEN).collect()
}
