// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health HTTP handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use kiln_server_jobs::{HealthState, JobsHealthStatus};
use serde::Serialize;
use tokio::time::Instant;

use crate::api::AppState;
use crate::version::VERSION;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ComponentHealth {
	#[schema(value_type = String, example = "healthy")]
	pub status: HealthState,
	pub latency_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
	#[schema(value_type = String, example = "healthy")]
	pub status: HealthState,
	pub timestamp: String,
	pub version: String,
	pub duration_ms: u64,
	pub database: ComponentHealth,
	#[schema(value_type = Object)]
	pub jobs: JobsHealthStatus,
}

async fn check_database(state: &AppState) -> ComponentHealth {
	let start = Instant::now();
	let result = state.storage.ping().await;
	let latency_ms = start.elapsed().as_millis() as u64;

	match result {
		Ok(()) => ComponentHealth {
			status: HealthState::Healthy,
			latency_ms,
			error: None,
		},
		Err(e) => {
			tracing::warn!(error = %e, "database health check failed");
			ComponentHealth {
				status: HealthState::Unhealthy,
				latency_ms,
				error: Some(e.to_string()),
			}
		}
	}
}

fn aggregate_status(database: &ComponentHealth, jobs: &JobsHealthStatus) -> HealthState {
	match (database.status, jobs.status) {
		(HealthState::Unhealthy, _) | (_, HealthState::Unhealthy) => HealthState::Unhealthy,
		(HealthState::Degraded, _) | (_, HealthState::Degraded) => HealthState::Degraded,
		_ => HealthState::Healthy,
	}
}

#[utoipa::path(
	get,
	path = "/health",
	responses(
		(status = 200, description = "System is healthy or degraded", body = HealthResponse),
		(status = 503, description = "System is unhealthy", body = HealthResponse)
	),
	tag = "health"
)]
/// GET /health - Database and job runner health.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
	let overall_start = Instant::now();

	let (database, jobs) = tokio::join!(check_database(&state), state.runner.health_status());
	let status = aggregate_status(&database, &jobs);

	let response = HealthResponse {
		status,
		timestamp: chrono::Utc::now().to_rfc3339(),
		version: VERSION.to_string(),
		duration_ms: overall_start.elapsed().as_millis() as u64,
		database,
		jobs,
	};

	let http_status = match status {
		HealthState::Healthy | HealthState::Degraded => StatusCode::OK,
		HealthState::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
	};

	(http_status, Json(response))
}
