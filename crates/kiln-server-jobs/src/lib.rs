// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job submission, tracking and execution for Kiln server.
//!
//! [`JobQueue`] is what request handlers use to submit work and poll it.
//! [`JobRunner`] claims queued work per job kind and drives each job through a
//! registered [`CommandHandler`]. Handlers report progress through the
//! [`JobTracker`] in their [`JobContext`]. A [`RunningJobs`] registry shared
//! between them carries cancels to jobs that are already executing.

pub mod context;
pub mod error;
pub mod handler;
pub mod health;
pub mod queue;
pub mod runner;
pub mod running;
pub mod tracker;

pub use context::JobContext;
pub use error::{JobError, Result};
pub use handler::CommandHandler;
pub use health::{HealthState, JobsHealthStatus, QueueHealthStatus};
pub use kiln_jobs_core::CancellationToken;
pub use queue::{JobQueue, JobSnapshot, JobStatusView, SubmitOptions, TypedQueue};
pub use runner::{JobOutcome, JobRunner, RunnerConfig};
pub use running::RunningJobs;
pub use tracker::JobTracker;
