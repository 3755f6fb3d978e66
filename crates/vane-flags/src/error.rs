// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the flags SDK.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;
use vane_common_http::RetryableError;
use vane_flags_core::FetchError;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, FlagsClientError>;

/// Errors that can occur in the flags SDK.
///
/// None of these ever reach an evaluation call; evaluation folds failures
/// into the result's reason instead.
#[derive(Debug, Error)]
pub enum FlagsClientError {
	/// A required configuration value is missing.
	#[error("missing configuration: {0}")]
	MissingConfig(&'static str),

	/// A configuration value is present but unusable.
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),

	/// Config file could not be read.
	#[error("failed to read config file {path}: {source}")]
	ConfigFileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// Config file is not valid TOML for the client layer.
	#[error("failed to parse config file {path}: {source}")]
	ConfigParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// Server returned an error.
	#[error("server error (status {status}): {message}")]
	ServerError {
		/// HTTP status code.
		status: u16,
		/// Error message from server.
		message: String,
	},

	/// Rate limited by server.
	#[error("rate limited, retry after {retry_after_secs:?} seconds")]
	RateLimited {
		/// Optional retry-after header value.
		retry_after_secs: Option<u64>,
	},

	/// The project or environment does not exist on the server.
	#[error("unknown scope: {0}")]
	ScopeNotFound(String),

	/// Snapshot payload could not be decoded.
	#[error("invalid snapshot payload: {0}")]
	InvalidPayload(#[from] serde_json::Error),

	/// The flag store reported a failure.
	#[error("flag store error: {0}")]
	Fetch(#[from] FetchError),
}

impl RetryableError for FlagsClientError {
	fn is_retryable(&self) -> bool {
		match self {
			Self::RequestFailed(e) => e.is_retryable(),
			Self::ServerError { status, .. } => StatusCode::from_u16(*status)
				.map(|s| {
					matches!(
						s,
						StatusCode::REQUEST_TIMEOUT
							| StatusCode::INTERNAL_SERVER_ERROR
							| StatusCode::BAD_GATEWAY
							| StatusCode::SERVICE_UNAVAILABLE
							| StatusCode::GATEWAY_TIMEOUT
					)
				})
				.unwrap_or(false),
			Self::RateLimited { .. } => true,
			Self::Fetch(FetchError::Unavailable(_)) => true,
			_ => false,
		}
	}
}

impl From<FlagsClientError> for FetchError {
	fn from(err: FlagsClientError) -> Self {
		match err {
			FlagsClientError::Fetch(inner) => inner,
			FlagsClientError::ScopeNotFound(scope) => FetchError::ScopeNotFound(scope),
			FlagsClientError::InvalidPayload(e) => FetchError::InvalidPayload(e.to_string()),
			other => FetchError::Unavailable(other.to_string()),
		}
	}
}
