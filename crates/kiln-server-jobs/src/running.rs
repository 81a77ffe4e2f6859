// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cancellation tokens of jobs that are executing right now.

use std::collections::HashMap;
use std::sync::Arc;

use kiln_jobs_core::{CancellationToken, TrackingId};
use parking_lot::RwLock;

/// Registry shared by the runner, the queue and trackers so a cancel issued
/// anywhere reaches the handler executing that job.
#[derive(Debug, Clone, Default)]
pub struct RunningJobs {
	tokens: Arc<RwLock<HashMap<TrackingId, CancellationToken>>>,
}

impl RunningJobs {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `token` until the returned guard is dropped.
	pub(crate) fn track(&self, tracking_id: TrackingId, token: CancellationToken) -> RunningGuard {
		self.tokens.write().insert(tracking_id, token);
		RunningGuard {
			jobs: self.clone(),
			tracking_id,
		}
	}

	/// Trips the token of a running job. Returns `false` when the job is not
	/// executing in this process.
	pub fn signal(&self, tracking_id: &TrackingId) -> bool {
		match self.tokens.read().get(tracking_id) {
			Some(token) => {
				token.cancel();
				true
			}
			None => false,
		}
	}

	pub fn contains(&self, tracking_id: &TrackingId) -> bool {
		self.tokens.read().contains_key(tracking_id)
	}

	pub fn len(&self) -> usize {
		self.tokens.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.read().is_empty()
	}
}

pub(crate) struct RunningGuard {
	jobs: RunningJobs,
	tracking_id: TrackingId,
}

impl Drop for RunningGuard {
	fn drop(&mut self) {
		self.jobs.tokens.write().remove(&self.tracking_id);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn signal_trips_tracked_token() {
		let jobs = RunningJobs::new();
		let id = TrackingId::new();
		let token = CancellationToken::new();

		let guard = jobs.track(id, token.clone());
		assert!(jobs.contains(&id));
		assert!(jobs.signal(&id));
		assert!(token.is_cancelled());

		drop(guard);
		assert!(jobs.is_empty());
		assert!(!jobs.signal(&id));
	}

	#[test]
	fn unknown_job_is_not_signalled() {
		let jobs = RunningJobs::new();
		let token = CancellationToken::new();
		let _guard = jobs.track(TrackingId::new(), token.clone());

		assert!(!jobs.signal(&TrackingId::new()));
		assert!(!token.is_cancelled());
		assert_eq!(jobs.len(), 1);
	}
}
