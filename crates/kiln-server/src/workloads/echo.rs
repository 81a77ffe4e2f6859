// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

/// Runs inline on the request; never queued.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
pub struct EchoCommand {
	#[serde(default)]
	pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct EchoResult {
	pub echo: String,
}

impl EchoCommand {
	pub fn execute(self) -> EchoResult {
		tracing::info!(message = %self.message, "echo command received");
		EchoResult { echo: self.message }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn echoes_message() {
		let result = EchoCommand {
			message: "hello".to_string(),
		}
		.execute();
		assert_eq!(result.echo, "hello");
	}

	#[test]
	fn missing_message_echoes_empty() {
		let command: EchoCommand = serde_json::from_str("{}").unwrap();
		assert_eq!(command.execute().echo, "");
	}
}
