// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flags client: evaluation over a locally cached snapshot, kept fresh by a
//! background refresh task.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use vane_common_http::RetryConfig;
use vane_flags_core::{
	evaluate, evaluate_snapshot, BulkEvaluationResult, EvaluationContext, EvaluationResult,
	FlagStore, SnapshotScope, VariantValue,
};

use crate::cache::{CacheMetrics, CacheStatus, RefreshOutcome, SnapshotCache};
use crate::config::{
	load_layers, ClientConfig, ClientConfigLayer, ConfigSource, DefaultsSource, EnvSource,
	LayerSource, TomlSource,
};
use crate::error::{FlagsClientError, Result};
use crate::exposure::{ExposureHook, FlagExposure, NoOpExposureHook, SharedExposureHook};
use crate::http_store::HttpFlagStore;

/// How long `close()` waits for the refresh task before aborting it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Builder for constructing a [`FlagsClient`].
pub struct FlagsClientBuilder {
	overrides: ClientConfigLayer,
	config_file: Option<PathBuf>,
	use_env: bool,
	refresh_interval: Option<Duration>,
	request_timeout: Option<Duration>,
	init_timeout: Option<Duration>,
	retry_config: Option<RetryConfig>,
	store: Option<Arc<dyn FlagStore>>,
	exposure_hook: SharedExposureHook,
}

impl Default for FlagsClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl FlagsClientBuilder {
	/// Creates a builder that reads `VANE_FLAGS_*` variables and no config file.
	pub fn new() -> Self {
		Self {
			overrides: ClientConfigLayer::default(),
			config_file: None,
			use_env: true,
			refresh_interval: None,
			request_timeout: None,
			init_timeout: None,
			retry_config: None,
			store: None,
			exposure_hook: Arc::new(NoOpExposureHook),
		}
	}

	/// Sets the flag service base URL.
	///
	/// Example: `https://flags.example.com`
	pub fn base_url(mut self, url: impl Into<String>) -> Self {
		self.overrides.base_url = Some(url.into());
		self
	}

	/// Sets the SDK key sent as a bearer token.
	pub fn sdk_key(mut self, key: impl Into<String>) -> Self {
		self.overrides.sdk_key = Some(key.into());
		self
	}

	pub fn project(mut self, project: impl Into<String>) -> Self {
		self.overrides.project = Some(project.into());
		self
	}

	pub fn environment(mut self, environment: impl Into<String>) -> Self {
		self.overrides.environment = Some(environment.into());
		self
	}

	/// Sets how often the background task refreshes the snapshot.
	pub fn refresh_interval(mut self, interval: Duration) -> Self {
		self.refresh_interval = Some(interval);
		self
	}

	/// Sets the HTTP request timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.request_timeout = Some(timeout);
		self
	}

	/// Sets how long `build()` waits for the first snapshot.
	pub fn init_timeout(mut self, timeout: Duration) -> Self {
		self.init_timeout = Some(timeout);
		self
	}

	/// Loads settings from a TOML file. A missing file is ignored.
	pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
		self.config_file = Some(path.into());
		self
	}

	/// Enables or disables reading `VANE_FLAGS_*` environment variables.
	pub fn env_vars(mut self, enabled: bool) -> Self {
		self.use_env = enabled;
		self
	}

	/// Sets the retry configuration for HTTP requests.
	pub fn retry_config(mut self, config: RetryConfig) -> Self {
		self.retry_config = Some(config);
		self
	}

	/// Uses `store` instead of the HTTP snapshot endpoint.
	///
	/// With a store set, `base_url` and `sdk_key` are not required.
	pub fn store(mut self, store: Arc<dyn FlagStore>) -> Self {
		self.store = Some(store);
		self
	}

	pub fn exposure_hook(mut self, hook: impl ExposureHook) -> Self {
		self.exposure_hook = Arc::new(hook);
		self
	}

	pub fn shared_exposure_hook(mut self, hook: SharedExposureHook) -> Self {
		self.exposure_hook = hook;
		self
	}

	/// Resolves configuration without starting a client.
	pub fn resolve_config(&self) -> Result<ClientConfig> {
		let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource)];
		if let Some(path) = &self.config_file {
			sources.push(Box::new(TomlSource::new(path.clone())));
		}
		if self.use_env {
			sources.push(Box::new(EnvSource));
		}
		sources.push(Box::new(LayerSource::overrides(self.overrides.clone())));

		let mut config = load_layers(sources)?.finalize()?;

		if let Some(interval) = self.refresh_interval {
			if interval.is_zero() {
				return Err(FlagsClientError::InvalidConfig(
					"refresh interval must be greater than zero".to_string(),
				));
			}
			config.refresh_interval = interval;
		}
		if let Some(timeout) = self.request_timeout {
			config.request_timeout = timeout;
		}
		if let Some(timeout) = self.init_timeout {
			config.init_timeout = timeout;
		}
		if let Some(retry) = &self.retry_config {
			config.retry_config = retry.clone();
		}
		Ok(config)
	}

	/// Builds the client, waits up to `init_timeout` for the first snapshot
	/// and starts the background refresh task.
	///
	/// A failed or slow first fetch does not fail the build: the client starts
	/// uninitialized and keeps retrying in the background.
	pub async fn build(self) -> Result<FlagsClient> {
		let config = self.resolve_config()?;

		let store: Arc<dyn FlagStore> = match self.store {
			Some(store) => store,
			None => Arc::new(HttpFlagStore::from_config(&config)?),
		};

		Ok(FlagsClient::start(config, store, self.exposure_hook).await)
	}
}

struct ClientInner {
	config: ClientConfig,
	cache: Arc<SnapshotCache>,
	exposure_hook: SharedExposureHook,
	shutdown_tx: mpsc::Sender<()>,
	refresh_task: Mutex<Option<JoinHandle<()>>>,
	shutdown: OnceCell<()>,
}

impl Drop for ClientInner {
	fn drop(&mut self) {
		if let Ok(task) = self.refresh_task.get_mut() {
			if let Some(handle) = task.take() {
				handle.abort();
			}
		}
	}
}

/// Feature flags client.
///
/// Cheap to clone; clones share one snapshot cache and one refresh task.
/// Evaluation never touches the network and never fails: problems are
/// reported through the result's reason and the caller's default is served.
#[derive(Clone)]
pub struct FlagsClient {
	inner: Arc<ClientInner>,
}

impl std::fmt::Debug for FlagsClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FlagsClient")
			.field("scope", &self.inner.config.scope)
			.field("cache", &self.inner.cache)
			.finish()
	}
}

impl FlagsClient {
	pub fn builder() -> FlagsClientBuilder {
		FlagsClientBuilder::new()
	}

	#[instrument(skip_all, fields(scope = %config.scope))]
	async fn start(
		config: ClientConfig,
		store: Arc<dyn FlagStore>,
		exposure_hook: SharedExposureHook,
	) -> Self {
		let cache = Arc::new(SnapshotCache::new(
			config.scope.clone(),
			store,
			config.refresh_interval,
		));

		match tokio::time::timeout(config.init_timeout, cache.refresh(true)).await {
			Ok(outcome) if outcome.is_success() => {
				info!(version = ?cache.snapshot_version(), "flags client ready");
			}
			Ok(outcome) => {
				warn!(outcome = ?outcome, "initial snapshot fetch failed, starting uninitialized");
			}
			Err(_) => {
				cache.record_failure("initial snapshot fetch timed out");
			}
		}

		let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
		let handle = tokio::spawn(run_refresh_loop(
			Arc::clone(&cache),
			config.refresh_interval,
			shutdown_rx,
		));

		Self {
			inner: Arc::new(ClientInner {
				config,
				cache,
				exposure_hook,
				shutdown_tx,
				refresh_task: Mutex::new(Some(handle)),
				shutdown: OnceCell::new(),
			}),
		}
	}

	pub fn config(&self) -> &ClientConfig {
		&self.inner.config
	}

	pub fn scope(&self) -> &SnapshotScope {
		&self.inner.config.scope
	}

	/// Evaluates one flag against the current snapshot.
	pub fn evaluate(
		&self,
		flag_key: &str,
		context: &EvaluationContext,
		default: impl Into<VariantValue>,
	) -> EvaluationResult {
		let default = default.into();
		let (result, version) = self.inner.cache.with_snapshot(|snapshot| match snapshot {
			Ok(snapshot) => (
				evaluate(snapshot, flag_key, context, default),
				Some(snapshot.version),
			),
			Err(kind) => (EvaluationResult::error(flag_key, default, kind), None),
		});
		self.record_exposure(&result, context, version);
		result
	}

	/// Evaluates each key against one snapshot. Every result carries a `null`
	/// default.
	pub fn evaluate_all<I, K>(&self, flag_keys: I, context: &EvaluationContext) -> BulkEvaluationResult
	where
		I: IntoIterator<Item = K>,
		K: AsRef<str>,
	{
		let bulk = self.inner.cache.evaluate_all(flag_keys, context);
		self.record_bulk_exposures(&bulk, context);
		bulk
	}

	/// Evaluates every flag in the current snapshot.
	pub fn all_flags(&self, context: &EvaluationContext) -> BulkEvaluationResult {
		let bulk = self.inner.cache.with_snapshot(|snapshot| match snapshot {
			Ok(snapshot) => evaluate_snapshot(snapshot, context),
			Err(_) => BulkEvaluationResult {
				results: Default::default(),
				snapshot_version: 0,
			},
		});
		self.record_bulk_exposures(&bulk, context);
		bulk
	}

	/// Evaluates a boolean flag. A non-boolean value yields `default`.
	pub fn get_bool(&self, flag_key: &str, context: &EvaluationContext, default: bool) -> bool {
		self.evaluate(flag_key, context, default)
			.value
			.as_bool()
			.unwrap_or(default)
	}

	/// Evaluates a string flag. A non-string value yields `default`.
	pub fn get_string(&self, flag_key: &str, context: &EvaluationContext, default: &str) -> String {
		let result = self.evaluate(flag_key, context, default);
		match result.value {
			VariantValue::String(value) => value,
			_ => default.to_string(),
		}
	}

	/// Evaluates a number flag. A non-number value yields `default`.
	pub fn get_number(&self, flag_key: &str, context: &EvaluationContext, default: f64) -> f64 {
		self.evaluate(flag_key, context, default)
			.value
			.as_f64()
			.unwrap_or(default)
	}

	/// Evaluates a flag of any type and returns its value as JSON.
	pub fn get_json(
		&self,
		flag_key: &str,
		context: &EvaluationContext,
		default: serde_json::Value,
	) -> serde_json::Value {
		self.evaluate(flag_key, context, VariantValue::Json(default))
			.value
			.to_json()
	}

	/// Refreshes now. `force` bypasses the refresh interval.
	pub async fn refresh(&self, force: bool) -> RefreshOutcome {
		self.inner.cache.refresh(force).await
	}

	/// Stops the refresh task and the cache. Later evaluations return the
	/// caller default with a `client_closed` error.
	///
	/// A refresh still waiting on the store is cancelled. Concurrent calls
	/// share one shutdown and all return once it has finished.
	pub async fn close(&self) {
		self.inner.shutdown.get_or_init(|| self.shutdown()).await;
	}

	async fn shutdown(&self) {
		let handle = self
			.inner
			.refresh_task
			.lock()
			.ok()
			.and_then(|mut task| task.take());

		if let Some(mut handle) = handle {
			let _ = self.inner.shutdown_tx.try_send(());
			if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
				warn!("refresh task did not stop in time, aborting");
				handle.abort();
			}
		}

		self.inner.cache.close().await;
	}

	pub fn status(&self) -> CacheStatus {
		self.inner.cache.status()
	}

	/// Subscribes to status changes (the staleness signal).
	pub fn subscribe_status(&self) -> watch::Receiver<CacheStatus> {
		self.inner.cache.subscribe()
	}

	pub fn metrics(&self) -> CacheMetrics {
		self.inner.cache.metrics()
	}

	pub fn snapshot_version(&self) -> Option<u64> {
		self.inner.cache.snapshot_version()
	}

	pub fn is_ready(&self) -> bool {
		!self.is_closed() && self.inner.cache.snapshot_version().is_some()
	}

	pub fn is_closed(&self) -> bool {
		self.inner.cache.is_closed()
	}

	fn record_exposure(
		&self,
		result: &EvaluationResult,
		context: &EvaluationContext,
		snapshot_version: Option<u64>,
	) {
		let exposure = FlagExposure::from_result(result, context.key.clone(), snapshot_version);
		self.inner.exposure_hook.on_flag_evaluated(&exposure);
	}

	fn record_bulk_exposures(&self, bulk: &BulkEvaluationResult, context: &EvaluationContext) {
		let version = (bulk.snapshot_version > 0).then_some(bulk.snapshot_version);
		for result in bulk.results.values() {
			self.record_exposure(result, context, version);
		}
	}
}

async fn run_refresh_loop(
	cache: Arc<SnapshotCache>,
	interval: Duration,
	mut shutdown_rx: mpsc::Receiver<()>,
) {
	let mut ticker = tokio::time::interval(interval);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	// The first tick completes immediately; the initial fetch already ran.
	ticker.tick().await;

	loop {
		tokio::select! {
			_ = shutdown_rx.recv() => {
				debug!(scope = %cache.scope(), "refresh loop shutting down");
				break;
			}
			_ = ticker.tick() => {
				match cache.refresh(true).await {
					RefreshOutcome::Closed => break,
					outcome => debug!(scope = %cache.scope(), outcome = ?outcome, "scheduled refresh"),
				}
			}
		}
	}
}
