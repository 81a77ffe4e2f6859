// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Progress and result envelope stored in a record's result payload.

use serde::{Deserialize, Serialize};

/// Step progress for a job plus its typed result once one exists.
///
/// A present `result` is what callers treat as "finished"; it is set by the
/// job itself and is independent of the record's terminal flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobResult<T> {
	pub current_step: u32,
	pub total_steps: u32,
	#[serde(default)]
	pub current_status: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<T>,
}

impl<T> JobResult<T> {
	pub fn new(total_steps: u32) -> Self {
		Self {
			current_step: 0,
			total_steps,
			current_status: None,
			result: None,
		}
	}

	pub fn with_status(mut self, step: u32, status: impl Into<String>) -> Self {
		self.advance(step, status);
		self
	}

	pub fn advance(&mut self, step: u32, status: impl Into<String>) {
		self.current_step = step;
		self.current_status = Some(status.into());
	}

	/// Sets the final result and moves progress to the last step.
	pub fn finish(&mut self, result: T, status: impl Into<String>) {
		self.result = Some(result);
		self.current_step = self.total_steps;
		self.current_status = Some(status.into());
	}

	pub fn is_complete(&self) -> bool {
		self.result.is_some()
	}
}
