// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use kiln_jobs_core::{JobCommand, JobRecord, JobResult, QueueId, RecordError};

use crate::context::JobContext;
use crate::error::Result;

/// Executes one kind of command.
///
/// A handler is registered once per command kind and may be invoked
/// concurrently for different jobs of that kind.
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
	type Command: JobCommand;

	async fn execute(
		&self,
		command: Self::Command,
		ctx: &JobContext,
	) -> Result<JobResult<<Self::Command as JobCommand>::Output>>;
}

/// Object-safe view of a handler used by the runner.
#[async_trait]
pub(crate) trait QueueHandler: Send + Sync {
	fn kind(&self) -> &'static str;

	fn queue_id(&self) -> QueueId;

	async fn run(&self, record: &JobRecord, ctx: &JobContext) -> Result<JobResult<serde_json::Value>>;
}

pub(crate) struct Typed<H>(pub Arc<H>);

#[async_trait]
impl<H: CommandHandler> QueueHandler for Typed<H> {
	fn kind(&self) -> &'static str {
		<H::Command as JobCommand>::KIND
	}

	fn queue_id(&self) -> QueueId {
		<H::Command as JobCommand>::queue_id()
	}

	async fn run(&self, record: &JobRecord, ctx: &JobContext) -> Result<JobResult<serde_json::Value>> {
		let command = record.command::<H::Command>()?;
		let output = self.0.execute(command, ctx).await?;

		let result = match output.result {
			Some(value) => Some(serde_json::to_value(value).map_err(RecordError::from)?),
			None => None,
		};
		Ok(JobResult {
			current_step: output.current_step,
			total_steps: output.total_steps,
			current_status: output.current_status,
			result,
		})
	}
}
