// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use kiln_server_db::QueueStats;
use serde::Serialize;

const UNHEALTHY_AFTER_FAILURES: u32 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct QueueHealthStatus {
	pub kind: String,
	pub queue_id: String,
	pub status: HealthState,
	pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsHealthStatus {
	pub status: HealthState,
	pub queues: Vec<QueueHealthStatus>,
	/// Absent when the store could not be read.
	pub stats: Option<QueueStats>,
}

pub(crate) fn determine_health_state(consecutive_failures: u32) -> HealthState {
	if consecutive_failures >= UNHEALTHY_AFTER_FAILURES {
		HealthState::Unhealthy
	} else if consecutive_failures >= 1 {
		HealthState::Degraded
	} else {
		HealthState::Healthy
	}
}

pub(crate) fn worst_of(states: impl IntoIterator<Item = HealthState>) -> HealthState {
	let mut worst = HealthState::Healthy;
	for state in states {
		if state == HealthState::Unhealthy {
			return HealthState::Unhealthy;
		}
		if state == HealthState::Degraded {
			worst = HealthState::Degraded;
		}
	}
	worst
}
