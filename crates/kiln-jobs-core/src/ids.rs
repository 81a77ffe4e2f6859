// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Job identifiers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::RecordError;

/// Caller-visible identifier for one job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TrackingId(pub Uuid);

impl TrackingId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for TrackingId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for TrackingId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for TrackingId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

const QUEUE_ID_LEN: usize = 32;

/// Identifier shared by every record of one job kind.
///
/// Derived from the kind name, so every process that knows the kind computes
/// the same id: the first 32 lowercase hex characters of its SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueId(String);

impl QueueId {
	pub fn for_kind(kind: &str) -> Self {
		let digest = Sha256::digest(kind.as_bytes());
		let mut id = hex::encode(digest);
		id.truncate(QUEUE_ID_LEN);
		Self(id)
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for QueueId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for QueueId {
	type Err = RecordError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let valid = s.len() == QUEUE_ID_LEN
			&& s
				.chars()
				.all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
		if !valid {
			return Err(RecordError::InvalidId {
				value: s.to_string(),
				message: format!("expected {QUEUE_ID_LEN} lowercase hex characters"),
			});
		}
		Ok(Self(s.to_string()))
	}
}

impl TryFrom<String> for QueueId {
	type Error = RecordError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<QueueId> for String {
	fn from(id: QueueId) -> Self {
		id.0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn queue_id_is_stable_per_kind() {
		assert_eq!(QueueId::for_kind("todo"), QueueId::for_kind("todo"));
		assert_ne!(QueueId::for_kind("todo"), QueueId::for_kind("echo"));
	}

	#[test]
	fn queue_id_rejects_malformed_input() {
		assert!("not-hex".parse::<QueueId>().is_err());
		assert!("ABCDEF0123456789ABCDEF0123456789".parse::<QueueId>().is_err());
		assert!("abcdef0123456789abcdef0123456789".parse::<QueueId>().is_ok());
	}

	#[test]
	fn tracking_id_parses_its_display_form() {
		let id = TrackingId::new();
		let parsed: TrackingId = id.to_string().parse().unwrap();
		assert_eq!(id, parsed);
	}

	proptest! {
		#[test]
		fn queue_id_is_32_lowercase_hex(kind in ".*") {
			let id = QueueId::for_kind(&kind);
			prop_assert_eq!(id.as_str().len(), 32);
			prop_assert!(id.as_str().chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
			prop_assert!(id.as_str().parse::<QueueId>().is_ok());
		}
	}
}
