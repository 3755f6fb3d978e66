// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::context::EvaluationContext;
use crate::evaluation::{evaluate, EvaluationResult};
use crate::flag::VariantValue;
use crate::snapshot::Snapshot;

/// Results of evaluating many flags against one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEvaluationResult {
	pub results: HashMap<String, EvaluationResult>,
	/// Version of the snapshot every result was computed from.
	pub snapshot_version: u64,
}

impl BulkEvaluationResult {
	pub fn get(&self, flag_key: &str) -> Option<&EvaluationResult> {
		self.results.get(flag_key)
	}

	pub fn len(&self) -> usize {
		self.results.len()
	}

	pub fn is_empty(&self) -> bool {
		self.results.is_empty()
	}
}

/// Evaluates each key against the same snapshot and context.
///
/// Equivalent to calling [`evaluate`] once per key with a `null` default.
/// Duplicate keys collapse to one entry.
pub fn evaluate_all<I, K>(snapshot: &Snapshot, flag_keys: I, context: &EvaluationContext) -> BulkEvaluationResult
where
	I: IntoIterator<Item = K>,
	K: AsRef<str>,
{
	let results = flag_keys
		.into_iter()
		.map(|key| {
			let key = key.as_ref();
			(key.to_string(), evaluate(snapshot, key, context, VariantValue::null()))
		})
		.collect();

	BulkEvaluationResult {
		results,
		snapshot_version: snapshot.version,
	}
}

/// Evaluates every flag present in the snapshot.
pub fn evaluate_snapshot(snapshot: &Snapshot, context: &EvaluationContext) -> BulkEvaluationResult {
	evaluate_all(snapshot, snapshot.keys(), context)
}
