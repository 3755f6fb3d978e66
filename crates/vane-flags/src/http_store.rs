// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remote flag store reached over HTTP.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, ETAG, IF_NONE_MATCH, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};
use vane_common_http::RetryConfig;
use vane_flags_core::{FetchError, FetchOutcome, Flag, FlagStore, Snapshot, SnapshotScope};

use crate::config::ClientConfig;
use crate::error::{FlagsClientError, Result};

/// Body of a snapshot response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
	pub version: u64,
	pub flags: Vec<Flag>,
}

impl SnapshotPayload {
	pub fn from_snapshot(snapshot: &Snapshot) -> Self {
		let mut flags: Vec<Flag> = snapshot.flags().cloned().collect();
		flags.sort_by(|a, b| a.key.cmp(&b.key));
		Self {
			version: snapshot.version,
			flags,
		}
	}

	/// Builds a snapshot. A flag key listed twice rejects the whole payload.
	pub fn into_snapshot(self, scope: SnapshotScope) -> Result<Snapshot> {
		{
			let mut seen = HashSet::with_capacity(self.flags.len());
			for flag in &self.flags {
				if !seen.insert(flag.key.as_str()) {
					warn!(flag_key = %flag.key, version = self.version, "duplicate flag key in snapshot payload");
					return Err(FlagsClientError::Fetch(FetchError::InvalidPayload(format!(
						"duplicate flag key `{}`",
						flag.key
					))));
				}
			}
		}
		Ok(Snapshot::new(scope, self.version, self.flags))
	}
}

/// Formats a snapshot version as a strong entity tag.
pub fn etag_for(version: u64) -> String {
	format!("\"{version}\"")
}

/// [`FlagStore`] backed by the flag service's snapshot endpoint.
///
/// `GET {base_url}/api/flags/projects/{project}/environments/{environment}/snapshot`
/// with a bearer SDK key. A known version is sent as `If-None-Match` so an
/// unchanged scope costs a `304` and no payload.
#[derive(Debug, Clone)]
pub struct HttpFlagStore {
	http_client: Client,
	base_url: String,
	sdk_key: String,
	retry_config: RetryConfig,
}

impl HttpFlagStore {
	pub fn new(
		base_url: impl Into<String>,
		sdk_key: impl Into<String>,
		http_client: Client,
		retry_config: RetryConfig,
	) -> Self {
		Self {
			http_client,
			base_url: base_url.into().trim_end_matches('/').to_string(),
			sdk_key: sdk_key.into(),
			retry_config,
		}
	}

	/// Builds a store from resolved client configuration.
	pub fn from_config(config: &ClientConfig) -> Result<Self> {
		let base_url = config
			.base_url
			.clone()
			.ok_or(FlagsClientError::MissingConfig("base_url"))?;
		let sdk_key = config
			.sdk_key
			.clone()
			.ok_or(FlagsClientError::MissingConfig("sdk_key"))?;
		let http_client = vane_common_http::new_client_with_timeout(config.request_timeout)
			.map_err(FlagsClientError::RequestFailed)?;

		Ok(Self::new(
			base_url,
			sdk_key,
			http_client,
			config.retry_config.clone(),
		))
	}

	pub fn snapshot_url(&self, scope: &SnapshotScope) -> String {
		format!(
			"{}/api/flags/projects/{}/environments/{}/snapshot",
			self.base_url, scope.project_key, scope.environment_key
		)
	}

	#[instrument(skip(self), fields(scope = %scope))]
	pub async fn fetch(
		&self,
		scope: &SnapshotScope,
		if_version_newer_than: Option<u64>,
	) -> Result<FetchOutcome> {
		let url = self.snapshot_url(scope);
		debug!(url = %url, known_version = ?if_version_newer_than, "Fetching snapshot");

		let response = vane_common_http::retry(&self.retry_config, || async {
			let mut request = self
				.http_client
				.get(&url)
				.header(AUTHORIZATION, format!("Bearer {}", self.sdk_key));
			if let Some(version) = if_version_newer_than {
				request = request.header(IF_NONE_MATCH, etag_for(version));
			}
			let response = request.send().await?;
			self.check_status(response).await
		})
		.await?;

		if response.status() == StatusCode::NOT_MODIFIED {
			debug!("Snapshot not modified");
			return Ok(FetchOutcome::NotModified);
		}

		let etag = response
			.headers()
			.get(ETAG)
			.and_then(|v| v.to_str().ok())
			.map(str::to_string);
		let body = response.bytes().await?;
		let payload: SnapshotPayload = serde_json::from_slice(&body)?;

		if let Some(etag) = etag {
			if etag != etag_for(payload.version) {
				debug!(etag = %etag, version = payload.version, "ETag does not match payload version");
			}
		}

		debug!(
			version = payload.version,
			flags = payload.flags.len(),
			"Snapshot received"
		);
		Ok(FetchOutcome::Modified(payload.into_snapshot(scope.clone())?))
	}

	/// Maps non-success statuses to errors; retryable ones are retried by the caller.
	async fn check_status(&self, response: Response) -> Result<Response> {
		let status = response.status();
		if status.is_success() || status == StatusCode::NOT_MODIFIED {
			return Ok(response);
		}

		if status == StatusCode::NOT_FOUND {
			return Err(FlagsClientError::ScopeNotFound(
				response.url().path().to_string(),
			));
		}

		if status == StatusCode::TOO_MANY_REQUESTS {
			let retry_after = response
				.headers()
				.get(RETRY_AFTER)
				.and_then(|v| v.to_str().ok())
				.and_then(|s| s.parse().ok());
			return Err(FlagsClientError::RateLimited {
				retry_after_secs: retry_after,
			});
		}

		let message = response.text().await.unwrap_or_default();
		if self.retry_config.is_retryable_status(status) {
			debug!(status = status.as_u16(), "Retryable snapshot status");
		} else {
			error!(status = status.as_u16(), message = %message, "Failed to fetch snapshot");
		}
		Err(FlagsClientError::ServerError {
			status: status.as_u16(),
			message,
		})
	}
}

#[async_trait]
impl FlagStore for HttpFlagStore {
	async fn fetch_snapshot(
		&self,
		scope: &SnapshotScope,
		if_version_newer_than: Option<u64>,
	) -> std::result::Result<FetchOutcome, FetchError> {
		self.fetch(scope, if_version_newer_than)
			.await
			.map_err(FetchError::from)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;
	use vane_flags_core::{FlagEnvironmentState, VariationOrRollout};
	use wiremock::matchers::{header, header_exists, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const SNAPSHOT_PATH: &str = "/api/flags/projects/shop/environments/prod/snapshot";

	fn scope() -> SnapshotScope {
		SnapshotScope::new("shop", "prod")
	}

	fn store(server: &MockServer) -> HttpFlagStore {
		HttpFlagStore::new(
			server.uri(),
			"sdk-test-key",
			vane_common_http::new_client().unwrap(),
			RetryConfig {
				max_attempts: 2,
				base_delay: Duration::from_millis(1),
				max_delay: Duration::from_millis(5),
				jitter: false,
				..RetryConfig::default()
			},
		)
	}

	fn payload(version: u64) -> SnapshotPayload {
		let flag = Flag::boolean("new-checkout").with_environment(
			"prod",
			FlagEnvironmentState::new(VariationOrRollout::Variation(0), 1).with_enabled(true),
		);
		SnapshotPayload {
			version,
			flags: vec![flag],
		}
	}

	#[tokio::test]
	async fn test_fetch_full_snapshot() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path(SNAPSHOT_PATH))
			.and(header("authorization", "Bearer sdk-test-key"))
			.respond_with(
				ResponseTemplate::new(200)
					.insert_header("etag", "\"4\"")
					.set_body_json(payload(4)),
			)
			.expect(1)
			.mount(&server)
			.await;

		let outcome = store(&server).fetch(&scope(), None).await.unwrap();
		let FetchOutcome::Modified(snapshot) = outcome else {
			panic!("expected a snapshot");
		};
		assert_eq!(snapshot.version, 4);
		assert_eq!(snapshot.scope, scope());
		assert!(snapshot.get("new-checkout").is_some());
	}

	#[tokio::test]
	async fn test_conditional_fetch_not_modified() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path(SNAPSHOT_PATH))
			.and(header("if-none-match", "\"4\""))
			.respond_with(ResponseTemplate::new(304))
			.expect(1)
			.mount(&server)
			.await;

		let outcome = store(&server).fetch(&scope(), Some(4)).await.unwrap();
		assert_eq!(outcome, FetchOutcome::NotModified);
	}

	#[tokio::test]
	async fn test_first_fetch_sends_no_etag() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(header_exists("if-none-match"))
			.respond_with(ResponseTemplate::new(500))
			.expect(0)
			.mount(&server)
			.await;
		Mock::given(method("GET"))
			.and(path(SNAPSHOT_PATH))
			.respond_with(ResponseTemplate::new(200).set_body_json(payload(1)))
			.mount(&server)
			.await;

		assert!(store(&server).fetch(&scope(), None).await.is_ok());
	}

	#[tokio::test]
	async fn test_server_error_is_retried_then_reported() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.and(path(SNAPSHOT_PATH))
			.respond_with(ResponseTemplate::new(503).set_body_string("down"))
			.expect(2)
			.mount(&server)
			.await;

		let err = store(&server).fetch(&scope(), None).await.unwrap_err();
		assert!(matches!(
			err,
			FlagsClientError::ServerError { status: 503, .. }
		));
	}

	#[tokio::test]
	async fn test_not_found_maps_to_scope_not_found() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(404))
			.expect(1)
			.mount(&server)
			.await;

		let err = store(&server)
			.fetch_snapshot(&scope(), None)
			.await
			.unwrap_err();
		assert!(matches!(err, FetchError::ScopeNotFound(_)));
	}

	#[tokio::test]
	async fn test_rate_limited_reads_retry_after() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
			.mount(&server)
			.await;

		let err = store(&server).fetch(&scope(), None).await.unwrap_err();
		assert!(matches!(
			err,
			FlagsClientError::RateLimited {
				retry_after_secs: Some(30)
			}
		));
	}

	#[tokio::test]
	async fn test_garbage_payload_is_invalid() {
		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
			.mount(&server)
			.await;

		let err = store(&server)
			.fetch_snapshot(&scope(), None)
			.await
			.unwrap_err();
		assert!(matches!(err, FetchError::InvalidPayload(_)));
	}

	#[tokio::test]
	async fn test_duplicate_flag_key_is_invalid() {
		let mut doubled = payload(5);
		let mut second = doubled.flags[0].clone();
		second.variants.reverse();
		doubled.flags.push(second);

		let server = MockServer::start().await;
		Mock::given(method("GET"))
			.respond_with(ResponseTemplate::new(200).set_body_json(&doubled))
			.mount(&server)
			.await;

		let err = store(&server)
			.fetch_snapshot(&scope(), None)
			.await
			.unwrap_err();
		assert!(matches!(err, FetchError::InvalidPayload(ref m) if m.contains("new-checkout")));
	}

	#[test]
	fn test_payload_round_trips_snapshot() {
		let snapshot = payload(9).into_snapshot(scope()).unwrap();
		let back = SnapshotPayload::from_snapshot(&snapshot);
		assert_eq!(back, payload(9));
		assert_eq!(etag_for(9), "\"9\"");
	}
}
