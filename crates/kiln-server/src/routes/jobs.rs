// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job HTTP handlers.
//!
//! `/jobs/simple` runs an echo command inline. `/jobs/complex` queues a todo
//! job and exposes its progress by tracking id.

use axum::{
	extract::{Path, State},
	http::{header, StatusCode},
	response::IntoResponse,
	Json,
};
use kiln_jobs_core::TrackingId;
use kiln_server_jobs::SubmitOptions;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::api::AppState;
use crate::error::{ErrorResponse, ServerError};
use crate::workloads::{EchoCommand, EchoResult, TodoJob, TodoJobResult};

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComplexJobSubmitRequest {
	#[serde(default)]
	pub todo_items: Vec<String>,
	/// Skip the processing delays.
	#[serde(default)]
	pub skip_wait: Option<bool>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComplexJobSubmitResponse {
	pub tracking_id: TrackingId,
	pub message: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComplexJobStatusResponse {
	pub tracking_id: TrackingId,
	pub is_complete: bool,
	pub current_step: u32,
	pub total_steps: u32,
	pub status: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<TodoJobResult>,
}

impl ComplexJobStatusResponse {
	fn pending(tracking_id: TrackingId, total_steps: u32) -> Self {
		Self {
			tracking_id,
			is_complete: false,
			current_step: 0,
			total_steps,
			status: "Pending".to_string(),
			result: None,
		}
	}
}

/// Unparseable ids cannot name a job, so they are reported like unknown ones.
fn parse_tracking_id(raw: &str) -> Result<TrackingId, ServerError> {
	raw.parse()
		.map_err(|_| ServerError::NotFound(format!("job {raw} not found")))
}

#[utoipa::path(
	post,
	path = "/jobs/simple",
	request_body = EchoCommand,
	responses(
		(status = 200, description = "Message echoed", body = EchoResult),
	),
	tag = "jobs"
)]
/// POST /jobs/simple - Echo a message synchronously.
pub async fn run_simple_command(Json(command): Json<EchoCommand>) -> Json<EchoResult> {
	Json(command.execute())
}

#[utoipa::path(
	post,
	path = "/jobs/complex",
	request_body = ComplexJobSubmitRequest,
	responses(
		(status = 201, description = "Job queued", body = ComplexJobSubmitResponse),
		(status = 400, description = "No todo items supplied", body = ErrorResponse),
		(status = 500, description = "Job could not be stored", body = ErrorResponse),
	),
	tag = "jobs"
)]
/// POST /jobs/complex - Queue a todo job.
#[instrument(skip_all)]
pub async fn submit_complex_job(
	State(state): State<AppState>,
	Json(request): Json<ComplexJobSubmitRequest>,
) -> Result<impl IntoResponse, ServerError> {
	if request.todo_items.is_empty() {
		return Err(ServerError::BadRequest(
			"At least one todo item is required".to_string(),
		));
	}

	let item_count = request.todo_items.len();
	let tracking_id = state
		.queue
		.submit(
			&TodoJob {
				todo_items: request.todo_items,
				skip_wait: request.skip_wait,
			},
			SubmitOptions::default(),
		)
		.await?;

	info!(tracking_id = %tracking_id, items = item_count, "queued complex job");

	Ok((
		StatusCode::CREATED,
		[(header::LOCATION, format!("/jobs/complex/{tracking_id}"))],
		Json(ComplexJobSubmitResponse {
			tracking_id,
			message: format!("Job queued successfully with {item_count} items to process"),
		}),
	))
}

#[utoipa::path(
	get,
	path = "/jobs/complex/{tracking_id}",
	params(
		("tracking_id" = String, Path, description = "Tracking id returned on submission"),
	),
	responses(
		(status = 200, description = "Current job progress", body = ComplexJobStatusResponse),
		(status = 404, description = "Unknown tracking id", body = ErrorResponse),
	),
	tag = "jobs"
)]
/// GET /jobs/complex/{tracking_id} - Report a todo job's progress.
#[instrument(skip_all)]
pub async fn get_complex_job_status(
	State(state): State<AppState>,
	Path(tracking_id): Path<String>,
) -> Result<Json<ComplexJobStatusResponse>, ServerError> {
	let tracking_id = parse_tracking_id(&tracking_id)?;

	let Some(snapshot) = state.queue.inspect::<TodoJob>(&tracking_id).await? else {
		debug!(tracking_id = %tracking_id, "job not found");
		return Err(ServerError::NotFound(format!("job {tracking_id} not found")));
	};

	let Some(progress) = snapshot.status.progress else {
		debug!(tracking_id = %tracking_id, "job has not started reporting yet");
		return Ok(Json(ComplexJobStatusResponse::pending(
			tracking_id,
			snapshot.command.total_steps(),
		)));
	};

	Ok(Json(ComplexJobStatusResponse {
		tracking_id,
		is_complete: progress.is_complete(),
		current_step: progress.current_step,
		total_steps: progress.total_steps,
		status: progress
			.current_status
			.unwrap_or_else(|| "Processing".to_string()),
		result: progress.result,
	}))
}

#[utoipa::path(
	delete,
	path = "/jobs/complex/{tracking_id}",
	params(
		("tracking_id" = String, Path, description = "Tracking id returned on submission"),
	),
	responses(
		(status = 202, description = "Job cancelled"),
		(status = 404, description = "No unfinished job with this id", body = ErrorResponse),
	),
	tag = "jobs"
)]
/// DELETE /jobs/complex/{tracking_id} - Cancel an unfinished todo job.
#[instrument(skip_all)]
pub async fn cancel_complex_job(
	State(state): State<AppState>,
	Path(tracking_id): Path<String>,
) -> Result<StatusCode, ServerError> {
	let tracking_id = parse_tracking_id(&tracking_id)?;

	if state.queue.cancel(&tracking_id).await? {
		Ok(StatusCode::ACCEPTED)
	} else {
		Err(ServerError::NotFound(format!(
			"job {tracking_id} is not waiting or running"
		)))
	}
}
