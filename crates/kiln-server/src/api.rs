// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router construction.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use kiln_server_config::JobsConfig;
use kiln_server_db::{JobStorage, RetryPolicy};
use kiln_server_jobs::{JobQueue, JobRunner, RunnerConfig};
use sqlx::SqlitePool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ServerError;
use crate::routes;
use crate::workloads::TodoJobHandler;

#[derive(Clone)]
pub struct AppState {
	pub storage: Arc<JobStorage>,
	pub queue: JobQueue,
	pub runner: Arc<JobRunner>,
}

fn chrono_duration(key: &str, duration: std::time::Duration) -> Result<chrono::Duration, ServerError> {
	chrono::Duration::from_std(duration)
		.map_err(|e| ServerError::Internal(format!("jobs.{key} is out of range: {e}")))
}

/// Wires storage, the submission queue and the runner with every workload
/// registered. The runner is not started.
pub fn create_app_state(pool: SqlitePool, jobs: &JobsConfig) -> Result<AppState, ServerError> {
	let retry_policy = RetryPolicy {
		backoff: chrono_duration("retry_backoff_secs", jobs.retry_backoff())?,
		max_tries: jobs.max_tries,
	};
	let storage = Arc::new(JobStorage::new(pool).with_retry_policy(retry_policy));

	let mut runner = JobRunner::new(
		storage.clone(),
		RunnerConfig {
			max_concurrency: jobs.max_concurrency,
			execution_time_limit: jobs.execution_time_limit(),
			poll_interval: jobs.poll_interval(),
			stale_sweep_interval: jobs.stale_sweep_interval(),
		},
	);
	runner.register(Arc::new(TodoJobHandler::default()));

	let queue = JobQueue::new(storage.clone())
		.with_default_expiry(chrono_duration("default_expiry_secs", jobs.default_expiry())?)
		.with_running_jobs(runner.running_jobs());

	Ok(AppState {
		storage,
		queue,
		runner: Arc::new(runner),
	})
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(routes::health::health_check))
		.route("/jobs/simple", post(routes::jobs::run_simple_command))
		.route("/jobs/complex", post(routes::jobs::submit_complex_job))
		.route(
			"/jobs/complex/{tracking_id}",
			get(routes::jobs::get_complex_job_status).delete(routes::jobs::cancel_complex_job),
		)
		.with_state(state)
		.merge(SwaggerUi::new("/api").url("/api/openapi.json", crate::api_docs::ApiDoc::openapi()))
}
