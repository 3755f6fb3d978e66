// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Feature flags Rust SDK for Vane.
//!
//! The client keeps an immutable snapshot of one project + environment in
//! memory and evaluates flags against it locally. A background task pulls
//! newer snapshots from the flag service; when the service is unreachable
//! the last good snapshot keeps serving and the staleness shows up in
//! [`FlagsClient::status`].
//!
//! # Features
//!
//! - **Local evaluation**: no network call on the evaluation path
//! - **Conditional refresh**: `If-None-Match` on the snapshot version
//! - **Single-flight refresh**: concurrent refreshes coalesce
//! - **Layered configuration**: defaults, TOML file, `VANE_FLAGS_*` variables, builder
//! - **Exposure hook**: observe every served value
//!
//! # Example
//!
//! ```ignore
//! use vane_flags::{EvaluationContext, FlagsClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FlagsClient::builder()
//!         .base_url("https://flags.example.com")
//!         .sdk_key("sdk-prod-xxx")
//!         .project("shop")
//!         .environment("prod")
//!         .build()
//!         .await?;
//!
//!     let context = EvaluationContext::new("user-42").with_attribute("country", "US");
//!     let enabled = client.get_bool("new-checkout", &context, false);
//!     let everything = client.all_flags(&context);
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

mod cache;
mod client;
mod config;
mod error;
mod exposure;
mod http_store;

pub use cache::{CacheMetrics, CacheState, CacheStatus, RefreshOutcome, SnapshotCache};
pub use client::{FlagsClient, FlagsClientBuilder};
pub use config::{
	load_layers, ClientConfig, ClientConfigLayer, ConfigSource, DefaultsSource,
	EnvSource, LayerSource, Precedence, TomlSource, DEFAULT_INIT_TIMEOUT,
	DEFAULT_REFRESH_INTERVAL, DEFAULT_REQUEST_TIMEOUT, ENV_PREFIX,
};
pub use error::{FlagsClientError, Result};
pub use exposure::{ExposureHook, FlagExposure, NoOpExposureHook, SharedExposureHook};
pub use http_store::{etag_for, HttpFlagStore, SnapshotPayload};

pub use vane_common_http::RetryConfig;

// Re-export core types for convenience
pub use vane_flags_core::{
	BulkEvaluationResult, EvaluationContext, EvaluationErrorKind, EvaluationReason,
	EvaluationResult, FetchError, FetchOutcome, Flag, FlagStore, Snapshot, SnapshotScope,
	VariantValue,
};
