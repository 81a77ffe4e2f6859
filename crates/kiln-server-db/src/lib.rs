// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite storage engine for the Kiln job queue.
//!
//! Jobs live in two tables with identical columns: `job_queue` holds the
//! active working set and `job_history` the archive. [`JobStorage`] owns every
//! transition between them.

pub mod error;
pub mod pool;
pub mod schema;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{DbError, Result};
pub use pool::create_pool;
pub use schema::run_migrations;
pub use storage::{JobStorage, JobStore, JobTable, PurgeReport, QueueStats, RetryPolicy};
