// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

/// Lifecycle state derived from a record's flags and timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum JobState {
	Queued,
	Running,
	Completed,
	Cancelled,
}

impl JobState {
	pub fn as_str(&self) -> &'static str {
		match self {
			JobState::Queued => "queued",
			JobState::Running => "running",
			JobState::Completed => "completed",
			JobState::Cancelled => "cancelled",
		}
	}

	pub fn is_terminal(&self) -> bool {
		matches!(self, JobState::Completed | JobState::Cancelled)
	}
}

impl std::str::FromStr for JobState {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"queued" => Ok(JobState::Queued),
			"running" => Ok(JobState::Running),
			"completed" => Ok(JobState::Completed),
			"cancelled" => Ok(JobState::Cancelled),
			_ => Err(format!("unknown job state: {s}")),
		}
	}
}

impl std::fmt::Display for JobState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}
