// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Long-running todo list job that reports progress per item.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kiln_jobs_core::{JobCommand, JobResult};
use kiln_server_jobs::{CommandHandler, JobContext, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const STARTING_DELAY: Duration = Duration::from_secs(5);
const ITEM_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoJob {
	pub todo_items: Vec<String>,
	/// Skips the artificial delays.
	#[serde(default)]
	pub skip_wait: Option<bool>,
}

impl TodoJob {
	/// One step for starting plus one per item.
	pub fn total_steps(&self) -> u32 {
		self.todo_items.len() as u32 + 1
	}
}

impl JobCommand for TodoJob {
	const KIND: &'static str = "todo";
	type Output = TodoJobResult;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodoJobResult {
	/// When each item was processed. `None` for items skipped by cancellation.
	pub todo_result: BTreeMap<String, Option<DateTime<Utc>>>,
}

pub struct TodoJobHandler {
	starting_delay: Duration,
	item_delay: Duration,
}

impl Default for TodoJobHandler {
	fn default() -> Self {
		Self {
			starting_delay: STARTING_DELAY,
			item_delay: ITEM_DELAY,
		}
	}
}

#[async_trait]
impl CommandHandler for TodoJobHandler {
	type Command = TodoJob;

	async fn execute(&self, job: TodoJob, ctx: &JobContext) -> Result<JobResult<TodoJobResult>> {
		let skip_wait = job.skip_wait == Some(true);
		info!(
			tracking_id = %ctx.tracking_id,
			items = job.todo_items.len(),
			skip_wait,
			"todo job starting"
		);

		let mut processed: BTreeMap<String, Option<DateTime<Utc>>> =
			job.todo_items.iter().map(|item| (item.clone(), None)).collect();

		let mut progress = JobResult::new(job.total_steps()).with_status(1, "Starting");
		ctx.tracker.store_result(&ctx.tracking_id, &progress).await?;

		if !skip_wait {
			tokio::time::sleep(self.starting_delay).await;
		}

		for (i, item) in job.todo_items.iter().enumerate() {
			if ctx.is_cancelled() {
				warn!(tracking_id = %ctx.tracking_id, "cancellation requested, stopping early");
				break;
			}

			if !skip_wait {
				tokio::time::sleep(self.item_delay).await;
			}

			processed.insert(item.clone(), Some(Utc::now()));
			progress.advance(i as u32 + 1, format!("Processed: {item}"));
			ctx.tracker.store_result(&ctx.tracking_id, &progress).await?;
			info!(
				tracking_id = %ctx.tracking_id,
				item = %item,
				step = progress.current_step,
				total = progress.total_steps,
				"processed todo item"
			);
		}

		progress.finish(
			TodoJobResult {
				todo_result: processed,
			},
			"Complete",
		);
		info!(tracking_id = %ctx.tracking_id, "todo job complete");
		Ok(progress)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use kiln_server_db::testing::create_job_queue_test_pool;
	use kiln_server_db::JobStorage;
	use kiln_server_jobs::{JobOutcome, JobQueue, JobRunner, RunnerConfig, SubmitOptions};
	use std::sync::Arc;

	#[test]
	fn command_uses_camel_case() {
		let job: TodoJob =
			serde_json::from_str(r#"{"todoItems":["a","b"],"skipWait":true}"#).unwrap();
		assert_eq!(job.todo_items, vec!["a", "b"]);
		assert_eq!(job.skip_wait, Some(true));

		let job: TodoJob = serde_json::from_str(r#"{"todoItems":[]}"#).unwrap();
		assert!(job.skip_wait.is_none());
	}

	#[tokio::test]
	async fn processes_every_item() {
		let storage = Arc::new(JobStorage::new(create_job_queue_test_pool().await));
		let mut runner = JobRunner::new(storage.clone(), RunnerConfig::default());
		runner.register(Arc::new(TodoJobHandler::default()));
		let queue = JobQueue::new(storage.clone());

		let id = queue
			.submit(
				&TodoJob {
					todo_items: vec!["milk".to_string(), "eggs".to_string()],
					skip_wait: Some(true),
				},
				SubmitOptions::default(),
			)
			.await
			.unwrap();

		assert_eq!(runner.run_pending().await.unwrap(), vec![(id, JobOutcome::Completed)]);

		let view = queue.status::<TodoJob>(&id).await.unwrap().unwrap();
		let progress = view.progress.unwrap();
		assert_eq!(progress.current_step, 3);
		assert_eq!(progress.total_steps, 3);
		assert_eq!(progress.current_status.as_deref(), Some("Complete"));
		let result = progress.result.unwrap();
		assert_eq!(result.todo_result.len(), 2);
		assert!(result.todo_result.values().all(Option::is_some));
	}

	#[tokio::test]
	async fn cancel_stops_processing_early() {
		let storage = Arc::new(JobStorage::new(create_job_queue_test_pool().await));
		let mut runner = JobRunner::new(storage.clone(), RunnerConfig::default());
		runner.register(Arc::new(TodoJobHandler {
			starting_delay: Duration::ZERO,
			item_delay: Duration::from_millis(40),
		}));
		let queue = JobQueue::new(storage.clone()).with_running_jobs(runner.running_jobs());

		let items: Vec<String> = (0..10).map(|i| format!("item-{i}")).collect();
		let id = queue
			.submit(
				&TodoJob {
					todo_items: items,
					skip_wait: None,
				},
				SubmitOptions::default(),
			)
			.await
			.unwrap();

		let (outcomes, cancelled) = tokio::join!(runner.run_pending(), async {
			tokio::time::sleep(Duration::from_millis(60)).await;
			queue.cancel(&id).await.unwrap()
		});
		assert!(cancelled);
		assert_eq!(outcomes.unwrap(), vec![(id, JobOutcome::Discarded)]);

		let view = queue.status::<TodoJob>(&id).await.unwrap().unwrap();
		assert_eq!(view.state, kiln_jobs_core::JobState::Cancelled);
		let progress = view.progress.unwrap();
		assert!(progress.result.is_none());
		assert!(progress.current_step < progress.total_steps);
	}

}
