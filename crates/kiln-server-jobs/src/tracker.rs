// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Result and cancellation access for running jobs.

use std::sync::Arc;

use kiln_jobs_core::{CancellationToken, JobResult, TrackingId};
use kiln_server_db::JobStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::error::Result;
use crate::running::RunningJobs;

/// Facade over the storage engine handed to job handlers.
///
/// Writes are skipped once the tracker's cancellation token is set. A missing
/// record is logged and otherwise ignored: the job may have been purged.
#[derive(Clone)]
pub struct JobTracker {
	store: Arc<dyn JobStore>,
	cancellation: CancellationToken,
	running: RunningJobs,
}

impl JobTracker {
	pub fn new(store: Arc<dyn JobStore>, cancellation: CancellationToken) -> Self {
		Self {
			store,
			cancellation,
			running: RunningJobs::new(),
		}
	}

	pub fn with_running_jobs(mut self, running: RunningJobs) -> Self {
		self.running = running;
		self
	}

	/// Cancels the stored job, then signals it if it is executing.
	#[instrument(skip(self), fields(tracking_id = %tracking_id))]
	pub async fn cancel(&self, tracking_id: &TrackingId) -> Result<()> {
		if self.store.cancel(tracking_id, &self.cancellation).await? {
			self.running.signal(tracking_id);
		}
		Ok(())
	}

	#[instrument(skip(self, result), fields(tracking_id = %tracking_id))]
	pub async fn store_result<T: Serialize + Sync>(
		&self,
		tracking_id: &TrackingId,
		result: &JobResult<T>,
	) -> Result<()> {
		let Some(mut record) = self.store.get_record(tracking_id).await? else {
			warn!(tracking_id = %tracking_id, "attempted to store result for non-existent job");
			return Ok(());
		};

		record.set_result(result)?;
		self.store.persist(&record, &self.cancellation).await?;
		Ok(())
	}

	#[instrument(skip(self), fields(tracking_id = %tracking_id))]
	pub async fn get_result<T: DeserializeOwned>(
		&self,
		tracking_id: &TrackingId,
	) -> Result<Option<JobResult<T>>> {
		let Some(record) = self.store.get_record(tracking_id).await? else {
			warn!(tracking_id = %tracking_id, "attempted to read result for non-existent job");
			return Ok(None);
		};

		Ok(record.get_result()?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::{Duration, Utc};
	use kiln_jobs_core::{JobState, NewJob, QueueId};
	use kiln_server_db::testing::create_job_queue_test_pool;
	use kiln_server_db::JobStorage;

	async fn setup() -> (Arc<JobStorage>, JobTracker) {
		let storage = Arc::new(JobStorage::new(create_job_queue_test_pool().await));
		let tracker = JobTracker::new(storage.clone(), CancellationToken::new());
		(storage, tracker)
	}

	async fn queued(storage: &JobStorage) -> TrackingId {
		let record = NewJob::new(QueueId::for_kind("tracked"), "{}").into_record(Utc::now(), Duration::hours(1));
		storage.persist(&record, &CancellationToken::new()).await.unwrap();
		record.tracking_id
	}

	#[tokio::test]
	async fn store_then_get_result() {
		let (storage, tracker) = setup().await;
		let id = queued(&storage).await;

		let envelope = JobResult::<Vec<String>>::new(2).with_status(1, "Starting");
		tracker.store_result(&id, &envelope).await.unwrap();

		let read: JobResult<Vec<String>> = tracker.get_result(&id).await.unwrap().unwrap();
		assert_eq!(read, envelope);
	}

	#[tokio::test]
	async fn get_result_before_any_progress_is_none() {
		let (storage, tracker) = setup().await;
		let id = queued(&storage).await;
		assert!(tracker.get_result::<String>(&id).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn missing_job_is_a_noop() {
		let (_storage, tracker) = setup().await;
		let id = TrackingId::new();

		tracker
			.store_result(&id, &JobResult::<String>::new(1))
			.await
			.unwrap();
		assert!(tracker.get_result::<String>(&id).await.unwrap().is_none());
		tracker.cancel(&id).await.unwrap();
	}

	#[tokio::test]
	async fn cancel_delegates_to_storage() {
		let (storage, tracker) = setup().await;
		let id = queued(&storage).await;

		tracker.cancel(&id).await.unwrap();
		let record = storage.get_record(&id).await.unwrap().unwrap();
		assert_eq!(record.state(), JobState::Cancelled);
	}

	#[tokio::test]
	async fn cancel_signals_running_job() {
		let (storage, _) = setup().await;
		let running = RunningJobs::new();
		let tracker = JobTracker::new(storage.clone(), CancellationToken::new())
			.with_running_jobs(running.clone());
		let id = queued(&storage).await;

		let job_token = CancellationToken::new();
		let _guard = running.track(id, job_token.clone());

		tracker.cancel(&id).await.unwrap();
		assert!(job_token.is_cancelled());
	}

	#[tokio::test]
	async fn cancel_of_finished_job_leaves_token_alone() {
		let (storage, _) = setup().await;
		let running = RunningJobs::new();
		let tracker = JobTracker::new(storage.clone(), CancellationToken::new())
			.with_running_jobs(running.clone());
		let id = queued(&storage).await;
		storage.cancel(&id, &CancellationToken::new()).await.unwrap();

		let job_token = CancellationToken::new();
		let _guard = running.track(id, job_token.clone());

		tracker.cancel(&id).await.unwrap();
		assert!(!job_token.is_cancelled());
	}

	#[tokio::test]
	async fn progress_after_cancel_keeps_job_archived() {
		let (storage, tracker) = setup().await;
		let id = queued(&storage).await;
		storage.cancel(&id, &CancellationToken::new()).await.unwrap();

		tracker
			.store_result(&id, &JobResult::<String>::new(3).with_status(2, "Midway"))
			.await
			.unwrap();

		assert!(storage.get_queued_record(&id).await.unwrap().is_none());
		let record = storage.get_record(&id).await.unwrap().unwrap();
		assert_eq!(record.state(), JobState::Cancelled);
	}

	#[tokio::test]
	async fn cancelled_tracker_does_not_write() {
		let (storage, _) = setup().await;
		let token = CancellationToken::new();
		let tracker = JobTracker::new(storage.clone(), token.clone());
		let id = queued(&storage).await;

		token.cancel();
		tracker
			.store_result(&id, &JobResult::<String>::new(3).with_status(2, "Midway"))
			.await
			.unwrap();
		assert!(tracker.get_result::<String>(&id).await.unwrap().is_none());
	}
}
