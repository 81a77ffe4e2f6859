// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use kiln_jobs_core::RecordError;
use kiln_server_db::DbError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum JobError {
	/// The handler gave up. Retryable failures are rescheduled, the rest are
	/// cancelled.
	#[error("Job failed: {message}")]
	Failed { message: String, retryable: bool },

	#[error("Job cancelled")]
	Cancelled,

	#[error("Job exceeded its execution time limit of {}s", .0.as_secs())]
	TimedOut(Duration),

	#[error("Storage error: {0}")]
	Storage(#[from] DbError),

	#[error(transparent)]
	Record(#[from] RecordError),
}

impl JobError {
	pub fn failed(message: impl Into<String>) -> Self {
		JobError::Failed {
			message: message.into(),
			retryable: true,
		}
	}

	pub fn fatal(message: impl Into<String>) -> Self {
		JobError::Failed {
			message: message.into(),
			retryable: false,
		}
	}

	/// Whether running the job again could succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			JobError::Failed { retryable, .. } => *retryable,
			JobError::Record(RecordError::CorruptCommand(_)) => false,
			JobError::Cancelled => false,
			_ => true,
		}
	}
}

pub type Result<T> = std::result::Result<T, JobError>;
