// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Kiln persistent job queue.
//!
//! This crate holds everything that describes a job independently of where it
//! is stored:
//! - [`JobRecord`]: the full durable state of one job
//! - [`JobResult`]: the progress/result envelope carried in a record's result payload
//! - [`LogEntry`]: one line of a record's newline-delimited work log
//! - [`TrackingId`] and [`QueueId`]: instance and job-kind identifiers
//! - [`JobCommand`]: the trait a command type implements to be queued

pub mod cancellation;
pub mod command;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod log;
pub mod record;
pub mod state;

pub use cancellation::CancellationToken;
pub use command::JobCommand;
pub use envelope::JobResult;
pub use error::{RecordError, Result};
pub use ids::{QueueId, TrackingId};
pub use log::{LogEntry, LogLevel};
pub use record::{JobRecord, NewJob};
pub use state::JobState;
