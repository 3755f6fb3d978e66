// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for flag store operations.

use thiserror::Error;
use vane_flags_core::{FetchError, FlagsError};

/// Result type for flag store operations.
pub type Result<T> = std::result::Result<T, FlagsServerError>;

/// Errors that can occur in flag store operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FlagsServerError {
	#[error("invalid flag definition: {0}")]
	InvalidDefinition(#[from] FlagsError),

	#[error("flag not found: {0}")]
	FlagNotFound(String),

	#[error("duplicate flag key: {0}")]
	DuplicateFlagKey(String),

	#[error("environment not found: {project_key}/{environment_key}")]
	EnvironmentNotFound {
		project_key: String,
		environment_key: String,
	},

	#[error("duplicate environment: {0}")]
	DuplicateEnvironment(String),

	#[error("version conflict on {flag_key} in {environment_key}: expected {expected}, found {actual}")]
	VersionConflict {
		flag_key: String,
		environment_key: String,
		expected: u64,
		actual: u64,
	},
}

impl From<FlagsServerError> for FetchError {
	fn from(err: FlagsServerError) -> Self {
		match err {
			FlagsServerError::EnvironmentNotFound {
				project_key,
				environment_key,
			} => FetchError::ScopeNotFound(format!("{project_key}/{environment_key}")),
			other => FetchError::Unavailable(other.to_string()),
		}
	}
}
