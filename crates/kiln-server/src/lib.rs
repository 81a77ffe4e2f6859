// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Kiln job queue server.
//!
//! This crate exposes the job queue over HTTP and runs the registered
//! workloads in the background against a SQLite database.

pub mod api;
pub mod api_docs;
pub mod error;
pub mod routes;
pub mod version;
pub mod workloads;

pub use api::{create_app_state, create_router, AppState};
pub use api_docs::ApiDoc;
pub use error::ServerError;
pub use kiln_server_config::ServerConfig;
