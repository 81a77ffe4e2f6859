// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Consumer side of the job system.
//!
//! Each registered command kind gets its own poll loop that claims runnable
//! jobs for that kind's queue id and runs them, at most `max_concurrency` at a
//! time. A separate sweeper periodically purges stale work.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use kiln_jobs_core::{CancellationToken, JobRecord, JobResult, JobState, LogEntry, QueueId, TrackingId};
use kiln_server_db::{JobStore, PurgeReport};
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::context::JobContext;
use crate::error::{JobError, Result};
use crate::handler::{CommandHandler, QueueHandler, Typed};
use crate::health::{determine_health_state, worst_of, HealthState, JobsHealthStatus, QueueHealthStatus};
use crate::running::RunningJobs;
use crate::tracker::JobTracker;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
	/// Jobs of one kind running at the same time.
	pub max_concurrency: usize,
	pub execution_time_limit: Duration,
	pub poll_interval: Duration,
	pub stale_sweep_interval: Duration,
}

impl Default for RunnerConfig {
	fn default() -> Self {
		Self {
			max_concurrency: 1,
			execution_time_limit: Duration::from_secs(60 * 60),
			poll_interval: Duration::from_secs(1),
			stale_sweep_interval: Duration::from_secs(60),
		}
	}
}

/// How one execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
	Completed,
	/// Failed and returned to the queue for another attempt.
	Rescheduled,
	Cancelled,
	/// The record was cancelled, finished or purged while the handler ran, so
	/// its outcome was dropped.
	Discarded,
}

struct RegisteredQueue {
	handler: Arc<dyn QueueHandler>,
	consecutive_failures: Arc<AtomicU32>,
}

pub struct JobRunner {
	queues: HashMap<QueueId, RegisteredQueue>,
	store: Arc<dyn JobStore>,
	config: RunnerConfig,
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
	running: RunningJobs,
}

impl JobRunner {
	pub fn new(store: Arc<dyn JobStore>, config: RunnerConfig) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			queues: HashMap::new(),
			store,
			config,
			shutdown_tx,
			handles: Mutex::new(Vec::new()),
			running: RunningJobs::new(),
		}
	}

	/// Tokens of the jobs this runner is executing. Hand it to
	/// [`crate::JobQueue::with_running_jobs`] so cancels reach them.
	pub fn running_jobs(&self) -> RunningJobs {
		self.running.clone()
	}

	pub fn register<H: CommandHandler>(&mut self, handler: Arc<H>) {
		let handler: Arc<dyn QueueHandler> = Arc::new(Typed(handler));
		let queue_id = handler.queue_id();
		let kind = handler.kind();

		let previous = self.queues.insert(
			queue_id.clone(),
			RegisteredQueue {
				handler,
				consecutive_failures: Arc::new(AtomicU32::new(0)),
			},
		);
		if previous.is_some() {
			warn!(kind, queue_id = %queue_id, "replacing previously registered handler");
		}
	}

	pub fn queue_ids(&self) -> Vec<QueueId> {
		self.queues.keys().cloned().collect()
	}

	fn worker(&self, registered: &RegisteredQueue) -> Worker {
		Worker {
			handler: Arc::clone(&registered.handler),
			store: Arc::clone(&self.store),
			consecutive_failures: Arc::clone(&registered.consecutive_failures),
			execution_time_limit: self.config.execution_time_limit,
			running: self.running.clone(),
		}
	}

	/// Spawns one poll loop per registered kind plus the stale sweeper.
	#[instrument(skip(self))]
	pub async fn start(&self) {
		let mut handles = self.handles.lock().await;
		if !handles.is_empty() {
			warn!("job runner already started");
			return;
		}

		for (queue_id, registered) in &self.queues {
			let worker = self.worker(registered);
			let shutdown_rx = self.shutdown_tx.subscribe();
			let config = self.config.clone();
			info!(kind = worker.handler.kind(), queue_id = %queue_id, "starting queue poller");
			handles.push(tokio::spawn(poll_queue(worker, config, shutdown_rx)));
		}

		let store = Arc::clone(&self.store);
		let interval = self.config.stale_sweep_interval;
		let mut shutdown_rx = self.shutdown_tx.subscribe();
		handles.push(tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {
						if let Err(e) = sweep(store.as_ref()).await {
							warn!(error = %e, "stale job sweep failed");
						}
					}
					_ = shutdown_rx.recv() => {
						debug!("shutting down stale job sweeper");
						break;
					}
				}
			}
		}));

		info!(queue_count = self.queues.len(), "job runner started");
	}

	/// Claims and runs one batch for every registered kind, then returns.
	#[instrument(skip(self))]
	pub async fn run_pending(&self) -> Result<Vec<(TrackingId, JobOutcome)>> {
		let limit = self.config.max_concurrency.max(1) as u32;
		let mut outcomes = Vec::new();

		for (queue_id, registered) in &self.queues {
			let claimed = self.store.claim_batch(Some(queue_id), limit, Utc::now()).await?;
			let worker = self.worker(registered);
			let ids: Vec<TrackingId> = claimed.iter().map(|r| r.tracking_id).collect();
			let results = join_all(claimed.into_iter().map(|record| worker.execute(record))).await;
			for (id, result) in ids.into_iter().zip(results) {
				outcomes.push((id, result?));
			}
		}

		Ok(outcomes)
	}

	pub async fn sweep_stale(&self) -> Result<PurgeReport> {
		sweep(self.store.as_ref()).await
	}

	/// Stops polling and waits for in-flight jobs to settle.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}

		info!("job runner shut down");
	}

	#[instrument(skip(self))]
	pub async fn health_status(&self) -> JobsHealthStatus {
		let queues: Vec<QueueHealthStatus> = self
			.queues
			.iter()
			.map(|(queue_id, registered)| {
				let consecutive_failures = registered.consecutive_failures.load(Ordering::SeqCst);
				QueueHealthStatus {
					kind: registered.handler.kind().to_string(),
					queue_id: queue_id.to_string(),
					status: determine_health_state(consecutive_failures),
					consecutive_failures,
				}
			})
			.collect();

		let stats = match self.store.queue_stats().await {
			Ok(stats) => Some(stats),
			Err(e) => {
				warn!(error = %e, "failed to read queue stats");
				None
			}
		};

		let mut status = worst_of(queues.iter().map(|q| q.status));
		if stats.is_none() {
			status = HealthState::Unhealthy;
		}

		JobsHealthStatus {
			status,
			queues,
			stats,
		}
	}
}

async fn sweep(store: &dyn JobStore) -> Result<PurgeReport> {
	Ok(store.purge_stale(Utc::now()).await?)
}

async fn poll_queue(worker: Worker, config: RunnerConfig, mut shutdown_rx: broadcast::Receiver<()>) {
	let queue_id = worker.handler.queue_id();
	let semaphore = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
	let mut in_flight = JoinSet::new();

	loop {
		while let Some(joined) = in_flight.try_join_next() {
			if let Err(e) = joined {
				error!(queue_id = %queue_id, error = %e, "job task failed to join");
			}
		}

		let available = semaphore.available_permits();
		if available > 0 {
			match worker
				.store
				.claim_batch(Some(&queue_id), available as u32, Utc::now())
				.await
			{
				Ok(records) => {
					for record in records {
						let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
							break;
						};
						let worker = worker.clone();
						in_flight.spawn(async move {
							let _permit = permit;
							let tracking_id = record.tracking_id;
							if let Err(e) = worker.execute(record).await {
								error!(tracking_id = %tracking_id, error = %e, "failed to settle job");
							}
						});
					}
				}
				Err(e) => warn!(queue_id = %queue_id, error = %e, "failed to claim jobs"),
			}
		}

		tokio::select! {
			_ = tokio::time::sleep(config.poll_interval) => {}
			_ = shutdown_rx.recv() => {
				info!(queue_id = %queue_id, in_flight = in_flight.len(), "shutting down queue poller");
				break;
			}
		}
	}

	while let Some(joined) = in_flight.join_next().await {
		if let Err(e) = joined {
			error!(queue_id = %queue_id, error = %e, "job task failed to join");
		}
	}
}

#[derive(Clone)]
struct Worker {
	handler: Arc<dyn QueueHandler>,
	store: Arc<dyn JobStore>,
	consecutive_failures: Arc<AtomicU32>,
	execution_time_limit: Duration,
	running: RunningJobs,
}

impl Worker {
	#[instrument(skip(self, record), fields(tracking_id = %record.tracking_id, kind = self.handler.kind()))]
	async fn execute(&self, record: JobRecord) -> Result<JobOutcome> {
		let token = CancellationToken::new();
		let _running = self.running.track(record.tracking_id, token.clone());
		let ctx = JobContext {
			tracking_id: record.tracking_id,
			tries: record.tries,
			cancellation_token: token.clone(),
			tracker: JobTracker::new(Arc::clone(&self.store), token.clone())
				.with_running_jobs(self.running.clone()),
		};

		debug!(tries = record.tries, "running job");
		let limit = self.execution_time_limit;
		let result = tokio::select! {
			result = AssertUnwindSafe(self.handler.run(&record, &ctx)).catch_unwind() => {
				result.unwrap_or_else(|_| Err(JobError::failed("job handler panicked")))
			}
			_ = tokio::time::sleep(limit) => {
				token.cancel();
				Err(JobError::TimedOut(limit))
			}
		};

		self.settle(&record.tracking_id, result).await
	}

	/// Writes the outcome onto the latest stored copy of the record, so
	/// progress the job reported while running is kept.
	async fn settle(
		&self,
		tracking_id: &TrackingId,
		result: Result<JobResult<serde_json::Value>>,
	) -> Result<JobOutcome> {
		let storage_token = CancellationToken::new();

		let Some(mut record) = self.store.get_record(tracking_id).await? else {
			warn!(tracking_id = %tracking_id, "job disappeared while running");
			return Ok(JobOutcome::Discarded);
		};
		if record.is_terminal() {
			info!(tracking_id = %tracking_id, state = %record.state(), "job finished elsewhere while running");
			return Ok(JobOutcome::Discarded);
		}

		match result {
			Ok(envelope) => {
				record.set_result(&envelope)?;
				self.store.complete(&mut record, &storage_token).await?;
				self.consecutive_failures.store(0, Ordering::SeqCst);
				info!(tracking_id = %tracking_id, "job completed");
				Ok(JobOutcome::Completed)
			}
			Err(JobError::Cancelled) => {
				record.mark_cancelled(Utc::now());
				self.store.persist(&record, &storage_token).await?;
				info!(tracking_id = %tracking_id, "job cancelled itself");
				Ok(JobOutcome::Cancelled)
			}
			Err(e) if !e.is_retryable() => {
				let now = Utc::now();
				record.append_log(&LogEntry::error(now, format!("Job abandoned: {}", failure_cause(&e))))?;
				record.mark_cancelled(now);
				self.store.persist(&record, &storage_token).await?;
				self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
				warn!(tracking_id = %tracking_id, error = %e, "job abandoned");
				Ok(JobOutcome::Cancelled)
			}
			Err(e) => {
				let state = self
					.store
					.fail_and_reschedule(&mut record, &failure_cause(&e), &storage_token)
					.await?;
				self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
				Ok(if state == JobState::Cancelled {
					JobOutcome::Cancelled
				} else {
					JobOutcome::Rescheduled
				})
			}
		}
	}
}

fn failure_cause(error: &JobError) -> String {
	match error {
		JobError::Failed { message, .. } => message.clone(),
		other => other.to_string(),
	}
}
