// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Producer side of the job system.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use kiln_jobs_core::{CancellationToken, JobCommand, JobResult, JobState, NewJob, TrackingId};
use kiln_server_db::JobStore;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::Result;
use crate::running::RunningJobs;

pub const DEFAULT_EXPIRY_HOURS: i64 = 4;

/// Scheduling and attribution for a submitted job.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
	/// Earliest time the job may be claimed. Defaults to now.
	pub execute_after: Option<DateTime<Utc>>,
	/// When an unclaimed job is cancelled as stale. Defaults to
	/// `execute_after` plus the queue's default expiry.
	pub expire_on: Option<DateTime<Utc>>,
	/// `(user_id, display_name)` of the submitter.
	pub created_by: Option<(String, String)>,
}

/// What a caller can see about one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView<T> {
	pub tracking_id: TrackingId,
	pub state: JobState,
	pub tries: u32,
	/// `None` until the job first reports progress.
	pub progress: Option<JobResult<T>>,
}

/// A job's status together with its decoded command.
pub struct JobSnapshot<C: JobCommand> {
	pub command: C,
	pub status: JobStatusView<C::Output>,
}

#[derive(Clone)]
pub struct JobQueue {
	store: Arc<dyn JobStore>,
	default_expiry: Duration,
	running: RunningJobs,
}

impl JobQueue {
	pub fn new(store: Arc<dyn JobStore>) -> Self {
		Self {
			store,
			default_expiry: Duration::hours(DEFAULT_EXPIRY_HOURS),
			running: RunningJobs::new(),
		}
	}

	/// Shares the runner's registry so cancels reach executing jobs.
	pub fn with_running_jobs(mut self, running: RunningJobs) -> Self {
		self.running = running;
		self
	}

	pub fn with_default_expiry(mut self, default_expiry: Duration) -> Self {
		self.default_expiry = default_expiry;
		self
	}

	/// Persists `command` as a queued job and returns its tracking id.
	#[instrument(skip(self, command, options), fields(kind = C::KIND))]
	pub async fn submit<C: JobCommand>(&self, command: &C, options: SubmitOptions) -> Result<TrackingId> {
		let mut job = NewJob::for_command(command)?;
		if let Some(at) = options.execute_after {
			job = job.execute_after(at);
		}
		if let Some(at) = options.expire_on {
			job = job.expire_on(at);
		}
		if let Some((user_id, display_name)) = options.created_by {
			job = job.created_by(user_id, display_name);
		}

		let record = job.into_record(Utc::now(), self.default_expiry);
		self.store.persist(&record, &CancellationToken::new()).await?;

		info!(tracking_id = %record.tracking_id, queue_id = %record.queue_id, "job submitted");
		Ok(record.tracking_id)
	}

	/// Looks the job up in either table. `Ok(None)` means the id is unknown.
	#[instrument(skip(self), fields(tracking_id = %tracking_id))]
	pub async fn status<C: JobCommand>(
		&self,
		tracking_id: &TrackingId,
	) -> Result<Option<JobStatusView<C::Output>>> {
		let Some(record) = self.store.get_record(tracking_id).await? else {
			return Ok(None);
		};

		Ok(Some(JobStatusView {
			tracking_id: record.tracking_id,
			state: record.state(),
			tries: record.tries,
			progress: record.get_result()?,
		}))
	}

	/// Like [`JobQueue::status`], plus the command the job was submitted
	/// with, both decoded from one read of the record.
	#[instrument(skip(self), fields(tracking_id = %tracking_id))]
	pub async fn inspect<C: JobCommand>(&self, tracking_id: &TrackingId) -> Result<Option<JobSnapshot<C>>> {
		let Some(record) = self.store.get_record(tracking_id).await? else {
			return Ok(None);
		};

		Ok(Some(JobSnapshot {
			command: record.command()?,
			status: JobStatusView {
				tracking_id: record.tracking_id,
				state: record.state(),
				tries: record.tries,
				progress: record.get_result()?,
			},
		}))
	}

	/// Cancels a job that has not finished. Returns `false` when there was
	/// nothing to cancel.
	///
	/// A job that is executing also has its cancellation token tripped.
	#[instrument(skip(self), fields(tracking_id = %tracking_id))]
	pub async fn cancel(&self, tracking_id: &TrackingId) -> Result<bool> {
		let cancelled = self.store.cancel(tracking_id, &CancellationToken::new()).await?;
		if cancelled && self.running.signal(tracking_id) {
			info!(tracking_id = %tracking_id, "signalled running job to stop");
		}
		Ok(cancelled)
	}

	pub fn typed<C: JobCommand>(&self) -> TypedQueue<C> {
		TypedQueue {
			queue: self.clone(),
			_command: PhantomData,
		}
	}
}

/// A [`JobQueue`] bound to one command kind.
pub struct TypedQueue<C> {
	queue: JobQueue,
	_command: PhantomData<fn() -> C>,
}

impl<C: JobCommand> TypedQueue<C> {
	pub async fn submit(&self, command: &C) -> Result<TrackingId> {
		self.queue.submit(command, SubmitOptions::default()).await
	}

	pub async fn status(&self, tracking_id: &TrackingId) -> Result<Option<JobStatusView<C::Output>>> {
		self.queue.status::<C>(tracking_id).await
	}
}
