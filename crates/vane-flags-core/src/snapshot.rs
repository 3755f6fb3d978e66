// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Immutable point-in-time copies of a scope's flags, and the store contract
//! that produces them.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::flag::Flag;

/// A project + environment pair that a snapshot covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotScope {
	pub project_key: String,
	pub environment_key: String,
}

impl SnapshotScope {
	pub fn new(project_key: impl Into<String>, environment_key: impl Into<String>) -> Self {
		Self {
			project_key: project_key.into(),
			environment_key: environment_key.into(),
		}
	}
}

impl std::fmt::Display for SnapshotScope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}/{}", self.project_key, self.environment_key)
	}
}

/// An immutable, versioned copy of every flag in one scope.
///
/// Snapshots are never mutated after construction; a newer one replaces them
/// wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
	pub scope: SnapshotScope,
	/// Scope revision at the time of the pull. Strictly increases with every
	/// store mutation that touches the scope.
	pub version: u64,
	pub fetched_at: DateTime<Utc>,
	flags: HashMap<String, Flag>,
}

impl Snapshot {
	pub fn new(scope: SnapshotScope, version: u64, flags: impl IntoIterator<Item = Flag>) -> Self {
		Self {
			scope,
			version,
			fetched_at: Utc::now(),
			flags: flags.into_iter().map(|f| (f.key.clone(), f)).collect(),
		}
	}

	/// An empty snapshot, used before a scope has any flags.
	pub fn empty(scope: SnapshotScope) -> Self {
		Self::new(scope, 0, std::iter::empty())
	}

	pub fn environment(&self) -> &str {
		&self.scope.environment_key
	}

	pub fn get(&self, flag_key: &str) -> Option<&Flag> {
		self.flags.get(flag_key)
	}

	pub fn len(&self) -> usize {
		self.flags.len()
	}

	pub fn is_empty(&self) -> bool {
		self.flags.is_empty()
	}

	/// Flag keys in sorted order.
	pub fn keys(&self) -> Vec<&str> {
		let mut keys: Vec<&str> = self.flags.keys().map(String::as_str).collect();
		keys.sort_unstable();
		keys
	}

	pub fn flags(&self) -> impl Iterator<Item = &Flag> {
		self.flags.values()
	}
}

/// Result of a conditional snapshot fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
	Modified(Snapshot),
	/// The scope has not changed since the version the caller holds.
	NotModified,
}

/// Source of authoritative snapshots.
///
/// Implemented by the flag store itself and by remote clients of it.
#[async_trait]
pub trait FlagStore: Send + Sync {
	/// Pulls a consistent snapshot of `scope`.
	///
	/// When `if_version_newer_than` is set and the scope revision is not newer
	/// than it, returns [`FetchOutcome::NotModified`] without building a
	/// snapshot.
	async fn fetch_snapshot(
		&self,
		scope: &SnapshotScope,
		if_version_newer_than: Option<u64>,
	) -> Result<FetchOutcome, FetchError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_snapshot_lookup_and_keys() {
		let scope = SnapshotScope::new("shop", "prod");
		let snapshot = Snapshot::new(
			scope.clone(),
			3,
			vec![Flag::boolean("b-flag"), Flag::boolean("a-flag")],
		);

		assert_eq!(snapshot.version, 3);
		assert_eq!(snapshot.environment(), "prod");
		assert_eq!(snapshot.len(), 2);
		assert_eq!(snapshot.keys(), vec!["a-flag", "b-flag"]);
		assert!(snapshot.get("a-flag").is_some());
		assert!(snapshot.get("missing").is_none());
		assert_eq!(scope.to_string(), "shop/prod");
	}

	#[test]
	fn test_empty_snapshot() {
		let snapshot = Snapshot::empty(SnapshotScope::new("shop", "dev"));
		assert!(snapshot.is_empty());
		assert_eq!(snapshot.version, 0);
	}

	#[test]
	fn test_snapshot_serde_shape() {
		let snapshot = Snapshot::new(SnapshotScope::new("shop", "prod"), 1, vec![Flag::boolean("x")]);
		let json = serde_json::to_value(&snapshot).unwrap();
		assert_eq!(json["scope"]["projectKey"], "shop");
		assert_eq!(json["version"], 1);
		assert!(json["flags"]["x"].is_object());
		let back: Snapshot = serde_json::from_value(json).unwrap();
		assert_eq!(back, snapshot);
	}
}
