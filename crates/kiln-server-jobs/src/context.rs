// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use kiln_jobs_core::{CancellationToken, TrackingId};

use crate::tracker::JobTracker;

/// What a handler knows about the job it is running.
pub struct JobContext {
	pub tracking_id: TrackingId,
	/// Failed attempts before this one.
	pub tries: u32,
	pub cancellation_token: CancellationToken,
	pub tracker: JobTracker,
}

impl JobContext {
	pub fn is_cancelled(&self) -> bool {
		self.cancellation_token.is_cancelled()
	}
}
