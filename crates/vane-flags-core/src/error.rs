// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Definition errors raised when a flag is written.

use thiserror::Error;

/// Result type for flag definition operations.
pub type Result<T> = std::result::Result<T, FlagsError>;

/// A flag definition that must not reach a snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlagsError {
	#[error("invalid flag key: {0}")]
	InvalidFlagKey(String),

	#[error("invalid environment name: {0}")]
	InvalidEnvironmentName(String),

	#[error("flag {flag_key} has no variants")]
	EmptyVariants { flag_key: String },

	#[error("variant {index} of flag {flag_key} does not match flag type {expected}")]
	VariantTypeMismatch {
		flag_key: String,
		index: usize,
		expected: String,
	},

	#[error("variation index {index} out of range ({len} variants) in {location}")]
	VariationOutOfRange {
		location: String,
		index: usize,
		len: usize,
	},

	#[error("rollout in {location} is empty")]
	EmptyRollout { location: String },

	#[error("rollout weights in {location} sum to {actual}, expected 100.00")]
	RolloutWeightSum { location: String, actual: String },

	#[error("invalid rollout weight in {location}: {reason}")]
	InvalidWeight { location: String, reason: String },

	#[error("unsupported operator in {location}")]
	UnsupportedOperator { location: String },

	#[error("invalid operand for {operator} in {location}: {reason}")]
	InvalidOperand {
		location: String,
		operator: String,
		reason: String,
	},

	#[error("invalid regex {pattern:?} in {location}: {reason}")]
	InvalidRegex {
		location: String,
		pattern: String,
		reason: String,
	},

	#[error("rule in environment {environment} has an empty id")]
	EmptyRuleId { environment: String },

	#[error("duplicate rule id {rule_id} in environment {environment}")]
	DuplicateRuleId {
		environment: String,
		rule_id: String,
	},
}

/// Failure to pull a snapshot from a flag store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
	#[error("unknown scope: {0}")]
	ScopeNotFound(String),

	#[error("flag store unavailable: {0}")]
	Unavailable(String),

	#[error("invalid snapshot payload: {0}")]
	InvalidPayload(String),
}
