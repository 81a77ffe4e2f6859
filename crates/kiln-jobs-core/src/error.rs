// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for job record payloads.

use thiserror::Error;

/// Result type for record payload operations.
pub type Result<T> = std::result::Result<T, RecordError>;

/// Errors raised while encoding or decoding the payloads carried by a record.
///
/// A stored payload that cannot be decoded is corruption and is always
/// reported here. A result that was never written is not an error: see
/// [`crate::JobRecord::get_result`].
#[derive(Debug, Error)]
pub enum RecordError {
	#[error("corrupt command payload: {0}")]
	CorruptCommand(#[source] serde_json::Error),

	#[error("corrupt result payload: {0}")]
	CorruptResult(#[source] serde_json::Error),

	#[error("corrupt work log line {line}: {source}")]
	CorruptLog {
		line: usize,
		#[source]
		source: serde_json::Error,
	},

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("invalid timestamp '{value}': {message}")]
	InvalidTimestamp { value: String, message: String },

	#[error("invalid tries count {0}")]
	InvalidTries(i64),

	#[error("invalid identifier '{value}': {message}")]
	InvalidId { value: String, message: String },
}
