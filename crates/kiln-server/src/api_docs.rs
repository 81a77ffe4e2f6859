// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::routes::health::{ComponentHealth, HealthResponse};
use crate::routes::jobs::{ComplexJobStatusResponse, ComplexJobSubmitRequest, ComplexJobSubmitResponse};
use crate::workloads::{EchoCommand, EchoResult, TodoJobResult};

#[derive(OpenApi)]
#[openapi(
	info(
		title = "Kiln",
		description = "Persistent background job queue"
	),
	paths(
		crate::routes::health::health_check,
		crate::routes::jobs::run_simple_command,
		crate::routes::jobs::submit_complex_job,
		crate::routes::jobs::get_complex_job_status,
		crate::routes::jobs::cancel_complex_job,
	),
	components(schemas(
		ErrorResponse,
		HealthResponse,
		ComponentHealth,
		EchoCommand,
		EchoResult,
		ComplexJobSubmitRequest,
		ComplexJobSubmitResponse,
		ComplexJobStatusResponse,
		TodoJobResult,
	)),
	tags(
		(name = "health", description = "Service health"),
		(name = "jobs", description = "Job submission and tracking")
	)
)]
pub struct ApiDoc;
