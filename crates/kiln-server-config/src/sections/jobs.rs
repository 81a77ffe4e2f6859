// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job runner configuration section.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct JobsConfigLayer {
	pub enabled: Option<bool>,
	pub max_concurrency: Option<usize>,
	pub execution_time_limit_secs: Option<u64>,
	pub poll_interval_ms: Option<u64>,
	pub stale_sweep_interval_secs: Option<u64>,
	pub default_expiry_secs: Option<u64>,
	pub retry_backoff_secs: Option<u64>,
	pub max_tries: Option<u32>,
}

impl JobsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.max_concurrency.is_some() {
			self.max_concurrency = other.max_concurrency;
		}
		if other.execution_time_limit_secs.is_some() {
			self.execution_time_limit_secs = other.execution_time_limit_secs;
		}
		if other.poll_interval_ms.is_some() {
			self.poll_interval_ms = other.poll_interval_ms;
		}
		if other.stale_sweep_interval_secs.is_some() {
			self.stale_sweep_interval_secs = other.stale_sweep_interval_secs;
		}
		if other.default_expiry_secs.is_some() {
			self.default_expiry_secs = other.default_expiry_secs;
		}
		if other.retry_backoff_secs.is_some() {
			self.retry_backoff_secs = other.retry_backoff_secs;
		}
		if other.max_tries.is_some() {
			self.max_tries = other.max_tries;
		}
	}

	pub fn finalize(self) -> JobsConfig {
		let defaults = JobsConfig::default();
		JobsConfig {
			enabled: self.enabled.unwrap_or(defaults.enabled),
			max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
			execution_time_limit_secs: self
				.execution_time_limit_secs
				.unwrap_or(defaults.execution_time_limit_secs),
			poll_interval_ms: self.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
			stale_sweep_interval_secs: self
				.stale_sweep_interval_secs
				.unwrap_or(defaults.stale_sweep_interval_secs),
			default_expiry_secs: self.default_expiry_secs.unwrap_or(defaults.default_expiry_secs),
			retry_backoff_secs: self.retry_backoff_secs.unwrap_or(defaults.retry_backoff_secs),
			max_tries: self.max_tries,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsConfig {
	/// Whether this process runs queued jobs. Submission works either way.
	pub enabled: bool,
	pub max_concurrency: usize,
	pub execution_time_limit_secs: u64,
	pub poll_interval_ms: u64,
	pub stale_sweep_interval_secs: u64,
	pub default_expiry_secs: u64,
	pub retry_backoff_secs: u64,
	pub max_tries: Option<u32>,
}

impl Default for JobsConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			max_concurrency: 1,
			execution_time_limit_secs: 3600, // 1 hour
			poll_interval_ms: 1000,
			stale_sweep_interval_secs: 60,
			default_expiry_secs: 14_400, // 4 hours
			retry_backoff_secs: 60,
			max_tries: None,
		}
	}
}

impl JobsConfig {
	pub fn execution_time_limit(&self) -> Duration {
		Duration::from_secs(self.execution_time_limit_secs)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	pub fn stale_sweep_interval(&self) -> Duration {
		Duration::from_secs(self.stale_sweep_interval_secs)
	}

	pub fn default_expiry(&self) -> Duration {
		Duration::from_secs(self.default_expiry_secs)
	}

	pub fn retry_backoff(&self) -> Duration {
		Duration::from_secs(self.retry_backoff_secs)
	}
}
