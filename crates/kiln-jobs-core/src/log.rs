// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Structured entries of a record's newline-delimited work log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RecordError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
	Information,
	Warning,
	Error,
}

impl LogLevel {
	pub fn as_str(&self) -> &'static str {
		match self {
			LogLevel::Information => "Information",
			LogLevel::Warning => "Warning",
			LogLevel::Error => "Error",
		}
	}
}

/// One line of the work log: `{"dtm": ..., "lvl": ..., "msg": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
	pub dtm: DateTime<Utc>,
	pub lvl: LogLevel,
	pub msg: String,
}

impl LogEntry {
	pub fn new(at: DateTime<Utc>, lvl: LogLevel, msg: impl Into<String>) -> Self {
		Self {
			dtm: at,
			lvl,
			msg: msg.into(),
		}
	}

	pub fn info(at: DateTime<Utc>, msg: impl Into<String>) -> Self {
		Self::new(at, LogLevel::Information, msg)
	}

	pub fn error(at: DateTime<Utc>, msg: impl Into<String>) -> Self {
		Self::new(at, LogLevel::Error, msg)
	}

	/// Serialized form including the trailing newline.
	pub fn to_line(&self) -> Result<String> {
		let mut line = serde_json::to_string(self)?;
		line.push('\n');
		Ok(line)
	}

	/// Parses every non-empty line of a work log.
	pub fn parse_lines(log: &str) -> Result<Vec<LogEntry>> {
		log
			.lines()
			.enumerate()
			.filter(|(_, line)| !line.trim().is_empty())
			.map(|(idx, line)| {
				serde_json::from_str(line).map_err(|source| RecordError::CorruptLog {
					line: idx + 1,
					source,
				})
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn line_has_expected_keys_and_newline() {
		let entry = LogEntry::error(Utc::now(), "boom");
		let line = entry.to_line().unwrap();
		assert!(line.ends_with('\n'));

		let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
		assert_eq!(value["lvl"], "Error");
		assert_eq!(value["msg"], "boom");
		assert!(value["dtm"].is_string());
	}

	#[test]
	fn parse_lines_reports_corrupt_line_number() {
		let good = LogEntry::info(Utc::now(), "ok").to_line().unwrap();
		let log = format!("{good}not json\n");
		match LogEntry::parse_lines(&log) {
			Err(RecordError::CorruptLog { line, .. }) => assert_eq!(line, 2),
			other => panic!("expected CorruptLog, got {other:?}"),
		}
	}

	#[test]
	fn parse_lines_skips_blank_lines() {
		assert!(LogEntry::parse_lines("").unwrap().is_empty());
		assert!(LogEntry::parse_lines("\n\n").unwrap().is_empty());
	}

	proptest! {
		#[test]
		fn appended_lines_parse_back_in_order(messages in prop::collection::vec(".*", 0..8)) {
			let now = Utc::now();
			let mut log = String::new();
			for msg in &messages {
				log.push_str(&LogEntry::info(now, msg.clone()).to_line().unwrap());
			}
			let parsed = LogEntry::parse_lines(&log).unwrap();
			let parsed_msgs: Vec<String> = parsed.into_iter().map(|e| e.msg).collect();
			prop_assert_eq!(parsed_msgs, messages);
		}
	}
}
