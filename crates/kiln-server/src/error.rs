// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kiln_server_db::DbError;
use kiln_server_jobs::JobError;
use serde::Serialize;

/// Error body shared by every endpoint.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("internal error: {0}")]
	Internal(String),

	#[error(transparent)]
	Jobs(#[from] JobError),

	#[error(transparent)]
	Database(#[from] DbError),
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let (status, error, message) = match &self {
			ServerError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
			ServerError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
			ServerError::Internal(_) | ServerError::Jobs(_) | ServerError::Database(_) => {
				tracing::error!(error = %self, "request failed");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					"internal_error",
					"An internal error occurred".to_string(),
				)
			}
		};

		(
			status,
			Json(ErrorResponse {
				error: error.to_string(),
				message,
			}),
		)
			.into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn maps_variants_to_status_codes() {
		assert_eq!(
			ServerError::NotFound("x".into()).into_response().status(),
			StatusCode::NOT_FOUND
		);
		assert_eq!(
			ServerError::BadRequest("x".into()).into_response().status(),
			StatusCode::BAD_REQUEST
		);
		assert_eq!(
			ServerError::Database(DbError::Internal("boom".into()))
				.into_response()
				.status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}
}
