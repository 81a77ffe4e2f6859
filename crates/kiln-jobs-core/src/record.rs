// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The durable representation of one job.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::command::JobCommand;
use crate::envelope::JobResult;
use crate::error::{RecordError, Result};
use crate::ids::{QueueId, TrackingId};
use crate::log::LogEntry;
use crate::state::JobState;

pub const EMPTY_RESULT_JSON: &str = "{}";

/// Full state of one job, identical in the queue and history tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
	pub tracking_id: TrackingId,
	pub queue_id: QueueId,
	pub work_command_json: String,
	pub work_result_json: String,
	pub work_log_json_lines: String,
	pub tries: u32,
	pub execute_after: DateTime<Utc>,
	pub expire_on: DateTime<Utc>,
	pub is_complete: bool,
	pub is_cancelled: bool,
	pub started_on: Option<DateTime<Utc>>,
	pub finished_on: Option<DateTime<Utc>>,
	pub created_on: DateTime<Utc>,
	pub created_by_user_id: Option<String>,
	pub created_by_display_name: Option<String>,
}

impl JobRecord {
	pub fn state(&self) -> JobState {
		if self.is_complete {
			JobState::Completed
		} else if self.is_cancelled {
			JobState::Cancelled
		} else if self.started_on.is_some() {
			JobState::Running
		} else {
			JobState::Queued
		}
	}

	/// Terminal records belong in the history table.
	pub fn is_terminal(&self) -> bool {
		self.is_complete || self.is_cancelled
	}

	pub fn append_log(&mut self, entry: &LogEntry) -> Result<()> {
		self.work_log_json_lines.push_str(&entry.to_line()?);
		Ok(())
	}

	pub fn log_entries(&self) -> Result<Vec<LogEntry>> {
		LogEntry::parse_lines(&self.work_log_json_lines)
	}

	pub fn command<C: JobCommand>(&self) -> Result<C> {
		serde_json::from_str(&self.work_command_json).map_err(RecordError::CorruptCommand)
	}

	pub fn set_result<T: Serialize>(&mut self, result: &JobResult<T>) -> Result<()> {
		self.work_result_json = serde_json::to_string(result)?;
		Ok(())
	}

	/// Decodes the result envelope.
	///
	/// Returns `Ok(None)` when no envelope has been stored yet (an empty
	/// payload, `{}` or `null`) and `Err(RecordError::CorruptResult)` when the
	/// stored payload does not decode as an envelope of `T`.
	pub fn get_result<T: DeserializeOwned>(&self) -> Result<Option<JobResult<T>>> {
		let raw = self.work_result_json.trim();
		if raw.is_empty() {
			return Ok(None);
		}

		let value: serde_json::Value =
			serde_json::from_str(raw).map_err(RecordError::CorruptResult)?;
		let never_written = match &value {
			serde_json::Value::Null => true,
			serde_json::Value::Object(map) => map.is_empty(),
			_ => false,
		};
		if never_written {
			return Ok(None);
		}

		serde_json::from_value(value)
			.map(Some)
			.map_err(RecordError::CorruptResult)
	}

	pub fn mark_complete(&mut self, now: DateTime<Utc>) {
		self.is_complete = true;
		self.is_cancelled = false;
		self.finished_on = Some(now);
	}

	pub fn mark_cancelled(&mut self, now: DateTime<Utc>) {
		self.is_cancelled = true;
		self.finished_on = Some(now);
	}

	/// Returns the record to the queued state after a failed execution.
	pub fn reschedule_after_failure(
		&mut self,
		now: DateTime<Utc>,
		backoff: Duration,
		cause: &str,
	) -> Result<()> {
		self.append_log(&LogEntry::error(
			now,
			format!("Job execution failed with exception: {cause}"),
		))?;
		self.execute_after = now + backoff;
		self.started_on = None;
		self.finished_on = None;
		self.is_cancelled = false;
		self.is_complete = false;
		self.tries += 1;
		Ok(())
	}
}

/// Builder for a record in the queued state.
#[derive(Debug, Clone)]
pub struct NewJob {
	queue_id: QueueId,
	work_command_json: String,
	execute_after: Option<DateTime<Utc>>,
	expire_on: Option<DateTime<Utc>>,
	created_by_user_id: Option<String>,
	created_by_display_name: Option<String>,
}

impl NewJob {
	pub fn for_command<C: JobCommand>(command: &C) -> Result<Self> {
		Ok(Self::new(C::queue_id(), serde_json::to_string(command)?))
	}

	pub fn new(queue_id: QueueId, work_command_json: impl Into<String>) -> Self {
		Self {
			queue_id,
			work_command_json: work_command_json.into(),
			execute_after: None,
			expire_on: None,
			created_by_user_id: None,
			created_by_display_name: None,
		}
	}

	pub fn execute_after(mut self, at: DateTime<Utc>) -> Self {
		self.execute_after = Some(at);
		self
	}

	pub fn expire_on(mut self, at: DateTime<Utc>) -> Self {
		self.expire_on = Some(at);
		self
	}

	pub fn created_by(mut self, user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
		self.created_by_user_id = Some(user_id.into());
		self.created_by_display_name = Some(display_name.into());
		self
	}

	/// Builds the record. Unset schedule fields default to `now` and
	/// `execute_after + default_expiry`.
	///
	/// Timestamps are truncated to microseconds, the precision they are
	/// stored with.
	pub fn into_record(self, now: DateTime<Utc>, default_expiry: Duration) -> JobRecord {
		let now = now.trunc_subsecs(6);
		let execute_after = self.execute_after.unwrap_or(now).trunc_subsecs(6);
		let expire_on = self
			.expire_on
			.unwrap_or(execute_after + default_expiry)
			.trunc_subsecs(6);

		JobRecord {
			tracking_id: TrackingId::new(),
			queue_id: self.queue_id,
			work_command_json: self.work_command_json,
			work_result_json: EMPTY_RESULT_JSON.to_string(),
			work_log_json_lines: String::new(),
			tries: 0,
			execute_after,
			expire_on,
			is_complete: false,
			is_cancelled: false,
			started_on: None,
			finished_on: None,
			created_on: now,
			created_by_user_id: self.created_by_user_id,
			created_by_display_name: self.created_by_display_name,
		}
	}
}
