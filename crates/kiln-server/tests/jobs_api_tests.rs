// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Integration tests for the job routes.
//!
//! Tests cover:
//! - Synchronous echo
//! - Todo job submission validation
//! - Progress reporting before and after the runner processes a job
//! - Cancellation and unknown tracking ids
//! - Health and OpenAPI endpoints

use axum::{
	body::Body,
	http::{header, Request, StatusCode},
	Router,
};
use kiln_jobs_core::JobState;
use kiln_server::api::{create_app_state, create_router, AppState};
use kiln_server::ServerConfig;
use kiln_server_jobs::JobOutcome;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::tempdir;
use tower::ServiceExt;

/// Creates a test app backed by a throwaway database file. The runner is not
/// started; tests drive it with `run_pending`.
async fn setup_test_app() -> (Router, AppState, SqlitePool, tempfile::TempDir) {
	let dir = tempdir().unwrap();
	let db_path = dir.path().join("test_jobs.db");
	let db_url = format!("sqlite:{}", db_path.display());
	let pool = kiln_server_db::create_pool(&db_url, 2).await.unwrap();
	kiln_server_db::run_migrations(&pool).await.unwrap();
	let config = ServerConfig::default();
	let state = create_app_state(pool.clone(), &config.jobs).unwrap();
	(create_router(state.clone()), state, pool, dir)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
	Request::builder()
		.method("POST")
		.uri(uri)
		.header(header::CONTENT_TYPE, "application/json")
		.body(Body::from(body.to_string()))
		.unwrap()
}

fn get(uri: &str) -> Request<Body> {
	Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
	Request::builder()
		.method("DELETE")
		.uri(uri)
		.body(Body::empty())
		.unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
	let body = axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap();
	serde_json::from_slice(&body).unwrap()
}

async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
	let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
		.fetch_one(pool)
		.await
		.unwrap();
	count
}

async fn submit_todo(app: &Router, items: &[&str]) -> String {
	let response = app
		.clone()
		.oneshot(post_json(
			"/jobs/complex",
			json!({ "todoItems": items, "skipWait": true }),
		))
		.await
		.unwrap();
	assert_eq!(response.status(), StatusCode::CREATED);
	let body = json_body(response).await;
	body["trackingId"].as_str().unwrap().to_string()
}

// ============================================================================
// Echo
// ============================================================================

#[tokio::test]
async fn test_simple_command_echoes_message() {
	let (app, _state, _pool, _dir) = setup_test_app().await;

	let response = app
		.oneshot(post_json("/jobs/simple", json!({ "message": "hello" })))
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(json_body(response).await, json!({ "echo": "hello" }));
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn test_submit_without_items_returns_400() {
	let (app, _state, pool, _dir) = setup_test_app().await;

	for body in [json!({ "todoItems": [] }), json!({})] {
		let response = app
			.clone()
			.oneshot(post_json("/jobs/complex", body))
			.await
			.unwrap();
		assert_eq!(response.status(), StatusCode::BAD_REQUEST);
		let body = json_body(response).await;
		assert_eq!(body["error"], "bad_request");
		assert_eq!(body["message"], "At least one todo item is required");
	}

	assert_eq!(count_rows(&pool, "job_queue").await, 0);
}

#[tokio::test]
async fn test_submit_returns_location_and_message() {
	let (app, _state, pool, _dir) = setup_test_app().await;

	let response = app
		.oneshot(post_json(
			"/jobs/complex",
			json!({ "todoItems": ["a", "b"] }),
		))
		.await
		.unwrap();

	assert_eq!(response.status(), StatusCode::CREATED);
	let location = response
		.headers()
		.get(header::LOCATION)
		.unwrap()
		.to_str()
		.unwrap()
		.to_string();
	let body = json_body(response).await;
	let tracking_id = body["trackingId"].as_str().unwrap();
	assert_eq!(location, format!("/jobs/complex/{tracking_id}"));
	assert_eq!(
		body["message"],
		"Job queued successfully with 2 items to process"
	);
	assert_eq!(count_rows(&pool, "job_queue").await, 1);
}

// ============================================================================
// Progress
// ============================================================================

#[tokio::test]
async fn test_todo_job_reports_pending_then_complete() {
	let (app, state, pool, _dir) = setup_test_app().await;
	let tracking_id = submit_todo(&app, &["milk", "eggs", "bread"]).await;
	let status_uri = format!("/jobs/complex/{tracking_id}");

	let response = app.clone().oneshot(get(&status_uri)).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = json_body(response).await;
	assert_eq!(body["trackingId"], tracking_id.as_str());
	assert_eq!(body["isComplete"], false);
	assert_eq!(body["currentStep"], 0);
	assert_eq!(body["totalSteps"], 4);
	assert_eq!(body["status"], "Pending");
	assert!(body.get("result").is_none());

	let outcomes = state.runner.run_pending().await.unwrap();
	assert_eq!(outcomes.len(), 1);
	assert_eq!(outcomes[0].0.to_string(), tracking_id);
	assert_eq!(outcomes[0].1, JobOutcome::Completed);

	let response = app.clone().oneshot(get(&status_uri)).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = json_body(response).await;
	assert_eq!(body["isComplete"], true);
	assert_eq!(body["currentStep"], 4);
	assert_eq!(body["totalSteps"], 4);
	assert_eq!(body["status"], "Complete");

	let todo_result = body["result"]["todoResult"].as_object().unwrap();
	assert_eq!(todo_result.len(), 3);
	for item in ["milk", "eggs", "bread"] {
		assert!(todo_result[item].is_string(), "{item} has no timestamp");
	}

	assert_eq!(count_rows(&pool, "job_queue").await, 0);
	assert_eq!(count_rows(&pool, "job_history").await, 1);
}

#[tokio::test]
async fn test_status_for_unknown_or_malformed_id_returns_404() {
	let (app, _state, _pool, _dir) = setup_test_app().await;

	let unknown = format!("/jobs/complex/{}", kiln_jobs_core::TrackingId::new());
	for uri in [unknown.as_str(), "/jobs/complex/not-a-uuid"] {
		let response = app.clone().oneshot(get(uri)).await.unwrap();
		assert_eq!(response.status(), StatusCode::NOT_FOUND);
		let body = json_body(response).await;
		assert_eq!(body["error"], "not_found");
	}
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_delete_cancels_once() {
	let (app, state, pool, _dir) = setup_test_app().await;
	let tracking_id = submit_todo(&app, &["a"]).await;
	let uri = format!("/jobs/complex/{tracking_id}");

	let response = app.clone().oneshot(delete(&uri)).await.unwrap();
	assert_eq!(response.status(), StatusCode::ACCEPTED);

	let response = app.clone().oneshot(delete(&uri)).await.unwrap();
	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	assert_eq!(count_rows(&pool, "job_queue").await, 0);
	assert_eq!(count_rows(&pool, "job_history").await, 1);

	let view = state
		.queue
		.status::<kiln_server::workloads::TodoJob>(&tracking_id.parse().unwrap())
		.await
		.unwrap()
		.unwrap();
	assert_eq!(view.state, JobState::Cancelled);

	// A cancelled job is never picked up.
	assert!(state.runner.run_pending().await.unwrap().is_empty());

	let response = app.oneshot(get(&uri)).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);
	let body = json_body(response).await;
	assert_eq!(body["status"], "Pending");
	assert_eq!(body["currentStep"], 0);
	assert_eq!(body["totalSteps"], 2);
}

#[tokio::test]
async fn test_delete_unknown_id_returns_404() {
	let (app, _state, _pool, _dir) = setup_test_app().await;

	let uri = format!("/jobs/complex/{}", kiln_jobs_core::TrackingId::new());
	let response = app.oneshot(delete(&uri)).await.unwrap();
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Health and docs
// ============================================================================

#[tokio::test]
async fn test_health_reports_healthy() {
	let (app, _state, _pool, _dir) = setup_test_app().await;

	let response = app.oneshot(get("/health")).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);

	let body = json_body(response).await;
	assert_eq!(body["status"], "healthy");
	assert_eq!(body["database"]["status"], "healthy");
	assert_eq!(body["jobs"]["status"], "healthy");
	assert_eq!(body["jobs"]["queues"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_openapi_document_lists_job_routes() {
	let (app, _state, _pool, _dir) = setup_test_app().await;

	let response = app.oneshot(get("/api/openapi.json")).await.unwrap();
	assert_eq!(response.status(), StatusCode::OK);

	let body = json_body(response).await;
	let paths = body["paths"].as_object().unwrap();
	assert!(paths.contains_key("/jobs/simple"));
	assert!(paths.contains_key("/jobs/complex"));
	assert!(paths.contains_key("/jobs/complex/{tracking_id}"));
	assert!(paths.contains_key("/health"));
}
