// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ids::QueueId;

/// A command that can be queued and executed later.
///
/// `KIND` names the job kind and must stay stable across releases because the
/// queue id of every stored record is derived from it.
pub trait JobCommand: Serialize + DeserializeOwned + Send + Sync + 'static {
	const KIND: &'static str;

	/// Payload carried in the `Result` field of the job's envelope.
	type Output: Serialize + DeserializeOwned + Send + Sync + 'static;

	fn queue_id() -> QueueId {
		QueueId::for_kind(Self::KIND)
	}
}
