// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side snapshot cache.
//!
//! Readers load the current [`Snapshot`] through an [`ArcSwapOption`] and
//! never wait on the network. Refreshes are single-flight: a refresh that
//! finds another one running returns [`RefreshOutcome::AlreadyInFlight`]
//! instead of queueing behind it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vane_flags_core::{
	evaluate, evaluate_all, BulkEvaluationResult, EvaluationContext, EvaluationErrorKind,
	EvaluationResult, FetchOutcome, FlagStore, Snapshot, SnapshotScope, VariantValue,
};

/// Lifecycle of a [`SnapshotCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
	/// No snapshot has been loaded yet.
	Uninitialized,
	/// A fetch is running.
	Fetching,
	/// A snapshot is being served.
	Ready,
	/// Shut down; nothing is served.
	Closed,
}

/// Staleness signal published after every refresh attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
	pub state: CacheState,
	pub snapshot_version: Option<u64>,
	pub last_success_at: Option<DateTime<Utc>>,
	pub last_attempt_at: Option<DateTime<Utc>>,
	pub last_error: Option<String>,
	pub consecutive_failures: u32,
}

impl Default for CacheStatus {
	fn default() -> Self {
		Self {
			state: CacheState::Uninitialized,
			snapshot_version: None,
			last_success_at: None,
			last_attempt_at: None,
			last_error: None,
			consecutive_failures: 0,
		}
	}
}

impl CacheStatus {
	/// Time since the last successful fetch, or `None` if there never was one.
	pub fn staleness(&self) -> Option<chrono::Duration> {
		self.last_success_at.map(|at| Utc::now() - at)
	}

	pub fn is_ready(&self) -> bool {
		self.state == CacheState::Ready
			|| (self.state == CacheState::Fetching && self.snapshot_version.is_some())
	}
}

/// Result of one call to [`SnapshotCache::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// A newer snapshot was installed.
	Updated { version: u64 },
	/// The store confirmed the held snapshot is current.
	NotModified { version: u64 },
	/// A non-forced refresh arrived inside the minimum interval.
	Skipped,
	/// Another refresh was running; this one was coalesced into it.
	AlreadyInFlight,
	/// The fetch failed; the previous snapshot keeps serving.
	Failed(String),
	Closed,
}

impl RefreshOutcome {
	pub fn is_success(&self) -> bool {
		matches!(self, Self::Updated { .. } | Self::NotModified { .. })
	}
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
	pub refresh_attempts: u64,
	pub refresh_failures: u64,
	pub coalesced_refreshes: u64,
	pub snapshot_swaps: u64,
}

#[derive(Debug, Default)]
struct RefreshState {
	last_attempt: Option<Instant>,
}

/// Holds the current snapshot for one scope and refreshes it from a [`FlagStore`].
pub struct SnapshotCache {
	scope: SnapshotScope,
	store: Arc<dyn FlagStore>,
	current: ArcSwapOption<Snapshot>,
	refresh_lock: Mutex<RefreshState>,
	status_tx: watch::Sender<CacheStatus>,
	closed: AtomicBool,
	shutdown: CancellationToken,
	min_interval: Duration,
	refresh_attempts: AtomicU64,
	refresh_failures: AtomicU64,
	coalesced_refreshes: AtomicU64,
	snapshot_swaps: AtomicU64,
}

impl std::fmt::Debug for SnapshotCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SnapshotCache")
			.field("scope", &self.scope)
			.field("snapshot_version", &self.snapshot_version())
			.field("closed", &self.is_closed())
			.finish()
	}
}

impl SnapshotCache {
	/// Creates an empty cache. `min_interval` bounds how often a non-forced
	/// refresh may reach the store.
	pub fn new(scope: SnapshotScope, store: Arc<dyn FlagStore>, min_interval: Duration) -> Self {
		let (status_tx, _) = watch::channel(CacheStatus::default());
		Self {
			scope,
			store,
			current: ArcSwapOption::empty(),
			refresh_lock: Mutex::new(RefreshState::default()),
			status_tx,
			closed: AtomicBool::new(false),
			shutdown: CancellationToken::new(),
			min_interval,
			refresh_attempts: AtomicU64::new(0),
			refresh_failures: AtomicU64::new(0),
			coalesced_refreshes: AtomicU64::new(0),
			snapshot_swaps: AtomicU64::new(0),
		}
	}

	pub fn scope(&self) -> &SnapshotScope {
		&self.scope
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// The snapshot currently served, if any.
	pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
		self.current.load_full()
	}

	pub fn snapshot_version(&self) -> Option<u64> {
		match &*self.current.load() {
			Some(snapshot) => Some(snapshot.version),
			None => None,
		}
	}

	pub fn status(&self) -> CacheStatus {
		self.status_tx.borrow().clone()
	}

	pub fn subscribe(&self) -> watch::Receiver<CacheStatus> {
		self.status_tx.subscribe()
	}

	pub fn metrics(&self) -> CacheMetrics {
		CacheMetrics {
			refresh_attempts: self.refresh_attempts.load(Ordering::Relaxed),
			refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
			coalesced_refreshes: self.coalesced_refreshes.load(Ordering::Relaxed),
			snapshot_swaps: self.snapshot_swaps.load(Ordering::Relaxed),
		}
	}

	/// Runs `f` against the current snapshot.
	///
	/// Passes the error kind an evaluation should report when there is no
	/// snapshot to read.
	pub fn with_snapshot<R>(&self, f: impl FnOnce(Result<&Snapshot, EvaluationErrorKind>) -> R) -> R {
		if self.is_closed() {
			return f(Err(EvaluationErrorKind::ClientClosed));
		}
		let guard = self.current.load();
		match &*guard {
			Some(snapshot) => f(Ok(snapshot.as_ref())),
			None if self.is_closed() => f(Err(EvaluationErrorKind::ClientClosed)),
			None => f(Err(EvaluationErrorKind::ClientNotReady)),
		}
	}

	pub fn evaluate(
		&self,
		flag_key: &str,
		context: &EvaluationContext,
		default: VariantValue,
	) -> EvaluationResult {
		self.with_snapshot(|snapshot| match snapshot {
			Ok(snapshot) => evaluate(snapshot, flag_key, context, default),
			Err(kind) => EvaluationResult::error(flag_key, default, kind),
		})
	}

	/// Evaluates every key against one snapshot.
	///
	/// Without a snapshot each key gets an error result and the bulk version is 0.
	pub fn evaluate_all<I, K>(&self, flag_keys: I, context: &EvaluationContext) -> BulkEvaluationResult
	where
		I: IntoIterator<Item = K>,
		K: AsRef<str>,
	{
		self.with_snapshot(|snapshot| match snapshot {
			Ok(snapshot) => evaluate_all(snapshot, flag_keys, context),
			Err(kind) => BulkEvaluationResult {
				results: flag_keys
					.into_iter()
					.map(|key| {
						let key = key.as_ref();
						(
							key.to_string(),
							EvaluationResult::error(key, VariantValue::null(), kind),
						)
					})
					.collect(),
				snapshot_version: 0,
			},
		})
	}

	/// Pulls from the store and installs any newer snapshot.
	///
	/// A failed pull leaves the current snapshot in place. `force` bypasses the
	/// minimum interval but never the single-flight guard.
	pub async fn refresh(&self, force: bool) -> RefreshOutcome {
		if self.is_closed() {
			return RefreshOutcome::Closed;
		}

		let Ok(mut guard) = self.refresh_lock.try_lock() else {
			self.coalesced_refreshes.fetch_add(1, Ordering::Relaxed);
			debug!(scope = %self.scope, "refresh already in flight");
			return RefreshOutcome::AlreadyInFlight;
		};
		if self.is_closed() {
			return RefreshOutcome::Closed;
		}

		if !force {
			if let Some(last) = guard.last_attempt {
				if last.elapsed() < self.min_interval {
					return RefreshOutcome::Skipped;
				}
			}
		}
		guard.last_attempt = Some(Instant::now());
		self.refresh_attempts.fetch_add(1, Ordering::Relaxed);

		let known = self.snapshot_version();
		self.status_tx.send_modify(|status| {
			status.state = CacheState::Fetching;
			status.last_attempt_at = Some(Utc::now());
		});
		let _settle = SettleOnDrop { cache: self };

		let result = tokio::select! {
			result = self.store.fetch_snapshot(&self.scope, known) => result,
			_ = self.shutdown.cancelled() => {
				debug!(scope = %self.scope, "cache closed during fetch, cancelling it");
				return RefreshOutcome::Closed;
			}
		};

		if self.is_closed() {
			debug!(scope = %self.scope, "cache closed during fetch, discarding result");
			return RefreshOutcome::Closed;
		}

		match result {
			Ok(FetchOutcome::Modified(snapshot)) => {
				let version = snapshot.version;
				match known {
					Some(held) if version < held => {
						warn!(
							scope = %self.scope,
							held,
							received = version,
							"store returned an older snapshot, keeping current"
						);
						self.record_success(held);
						RefreshOutcome::NotModified { version: held }
					}
					_ => {
						let flags = snapshot.len();
						self.current.store(Some(Arc::new(snapshot)));
						self.snapshot_swaps.fetch_add(1, Ordering::Relaxed);
						info!(scope = %self.scope, version, flags, "installed flag snapshot");
						self.record_success(version);
						RefreshOutcome::Updated { version }
					}
				}
			}
			Ok(FetchOutcome::NotModified) => match known {
				Some(version) => {
					debug!(scope = %self.scope, version, "snapshot not modified");
					self.record_success(version);
					RefreshOutcome::NotModified { version }
				}
				None => {
					let message = "store reported not modified with no snapshot held".to_string();
					self.record_failure(&message);
					RefreshOutcome::Failed(message)
				}
			},
			Err(e) => {
				let message = e.to_string();
				self.record_failure(&message);
				RefreshOutcome::Failed(message)
			}
		}
	}

	fn record_success(&self, version: u64) {
		self.status_tx.send_modify(|status| {
			status.state = CacheState::Ready;
			status.snapshot_version = Some(version);
			status.last_success_at = Some(Utc::now());
			status.last_error = None;
			status.consecutive_failures = 0;
		});
	}

	/// Records a failed attempt without touching the served snapshot.
	pub(crate) fn record_failure(&self, message: &str) {
		self.refresh_failures.fetch_add(1, Ordering::Relaxed);
		let held = self.snapshot_version();
		let mut failures = 0;
		self.status_tx.send_modify(|status| {
			status.state = if held.is_some() {
				CacheState::Ready
			} else {
				CacheState::Uninitialized
			};
			status.snapshot_version = held;
			status.last_error = Some(message.to_string());
			status.consecutive_failures = status.consecutive_failures.saturating_add(1);
			failures = status.consecutive_failures;
		});
		warn!(
			scope = %self.scope,
			held_version = ?held,
			consecutive_failures = failures,
			error = %message,
			"snapshot refresh failed"
		);
	}

	/// Stops serving. An in-flight fetch is cancelled and its result dropped.
	///
	/// Concurrent callers all return once the cache is fully closed.
	pub async fn close(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			let mut status = self.status_tx.subscribe();
			let _ = status
				.wait_for(|status| status.state == CacheState::Closed)
				.await;
			return;
		}
		self.shutdown.cancel();
		let _guard = self.refresh_lock.lock().await;
		self.current.store(None);
		self.status_tx.send_modify(|status| {
			status.state = CacheState::Closed;
		});
		info!(scope = %self.scope, "snapshot cache closed");
	}
}

/// Settles a `Fetching` status when a refresh ends without recording an
/// outcome, including when the caller drops the refresh future.
struct SettleOnDrop<'a> {
	cache: &'a SnapshotCache,
}

impl Drop for SettleOnDrop<'_> {
	fn drop(&mut self) {
		let held = self.cache.snapshot_version();
		self.cache.status_tx.send_if_modified(|status| {
			if status.state != CacheState::Fetching {
				return false;
			}
			status.state = if held.is_some() {
				CacheState::Ready
			} else {
				CacheState::Uninitialized
			};
			status.snapshot_version = held;
			true
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use async_trait::async_trait;
	use std::collections::VecDeque;
	use std::sync::Mutex as StdMutex;
	use tokio::sync::Notify;
	use vane_flags_core::{
		EvaluationReason, FetchError, Flag, FlagEnvironmentState, VariationOrRollout,
	};

	fn scope() -> SnapshotScope {
		SnapshotScope::new("shop", "prod")
	}

	fn snapshot(version: u64, on: bool) -> Snapshot {
		let flag = Flag::boolean("dark-mode").with_environment(
			"prod",
			FlagEnvironmentState::new(VariationOrRollout::Variation(0), 1).with_enabled(on),
		);
		Snapshot::new(scope(), version, vec![flag])
	}

	/// Replays scripted outcomes and records the known version of each call.
	#[derive(Default)]
	struct ScriptedStore {
		outcomes: StdMutex<VecDeque<Result<FetchOutcome, FetchError>>>,
		calls: StdMutex<Vec<Option<u64>>>,
	}

	impl ScriptedStore {
		fn new(outcomes: Vec<Result<FetchOutcome, FetchError>>) -> Arc<Self> {
			Arc::new(Self {
				outcomes: StdMutex::new(outcomes.into()),
				calls: StdMutex::default(),
			})
		}

		fn calls(&self) -> Vec<Option<u64>> {
			self.calls.lock().unwrap().clone()
		}
	}

	#[async_trait]
	impl FlagStore for ScriptedStore {
		async fn fetch_snapshot(
			&self,
			_scope: &SnapshotScope,
			if_version_newer_than: Option<u64>,
		) -> Result<FetchOutcome, FetchError> {
			self.calls.lock().unwrap().push(if_version_newer_than);
			self.outcomes
				.lock()
				.unwrap()
				.pop_front()
				.unwrap_or_else(|| Err(FetchError::Unavailable("script exhausted".into())))
		}
	}

	/// Blocks every fetch until released.
	#[derive(Default)]
	struct GatedStore {
		entered: Notify,
		release: Notify,
	}

	#[async_trait]
	impl FlagStore for GatedStore {
		async fn fetch_snapshot(
			&self,
			_scope: &SnapshotScope,
			_if_version_newer_than: Option<u64>,
		) -> Result<FetchOutcome, FetchError> {
			self.entered.notify_one();
			self.release.notified().await;
			Ok(FetchOutcome::Modified(snapshot(1, true)))
		}
	}

	/// Serves one snapshot, then never answers again.
	#[derive(Default)]
	struct StallAfterFirst {
		served: AtomicBool,
	}

	#[async_trait]
	impl FlagStore for StallAfterFirst {
		async fn fetch_snapshot(
			&self,
			_scope: &SnapshotScope,
			_if_version_newer_than: Option<u64>,
		) -> Result<FetchOutcome, FetchError> {
			if !self.served.swap(true, Ordering::SeqCst) {
				return Ok(FetchOutcome::Modified(snapshot(4, true)));
			}
			std::future::pending().await
		}
	}

	fn cache(store: Arc<dyn FlagStore>) -> SnapshotCache {
		SnapshotCache::new(scope(), store, Duration::from_secs(60))
	}

	#[tokio::test]
	async fn test_uninitialized_cache_reports_not_ready() {
		let cache = cache(ScriptedStore::new(vec![]));
		let result = cache.evaluate("dark-mode", &EvaluationContext::new("u"), false.into());
		assert_eq!(result.reason, EvaluationReason::Error);
		assert_eq!(result.error_kind, Some(EvaluationErrorKind::ClientNotReady));
		assert_eq!(result.value, VariantValue::Boolean(false));
		assert_eq!(cache.status().state, CacheState::Uninitialized);
	}

	#[tokio::test]
	async fn test_refresh_installs_snapshot_then_sends_known_version() {
		let store = ScriptedStore::new(vec![
			Ok(FetchOutcome::Modified(snapshot(3, true))),
			Ok(FetchOutcome::NotModified),
		]);
		let cache = cache(store.clone());

		assert_eq!(cache.refresh(true).await, RefreshOutcome::Updated { version: 3 });
		assert_eq!(
			cache.refresh(true).await,
			RefreshOutcome::NotModified { version: 3 }
		);
		assert_eq!(store.calls(), vec![None, Some(3)]);

		let status = cache.status();
		assert_eq!(status.state, CacheState::Ready);
		assert_eq!(status.snapshot_version, Some(3));
		assert!(status.staleness().is_some());

		let result = cache.evaluate("dark-mode", &EvaluationContext::new("u"), false.into());
		assert_eq!(result.value, VariantValue::Boolean(true));
		assert_eq!(result.reason, EvaluationReason::Fallthrough);
	}

	#[tokio::test]
	async fn test_failure_keeps_previous_snapshot() {
		let store = ScriptedStore::new(vec![
			Ok(FetchOutcome::Modified(snapshot(1, true))),
			Err(FetchError::Unavailable("connection refused".into())),
			Err(FetchError::Unavailable("connection refused".into())),
		]);
		let cache = cache(store);
		let ctx = EvaluationContext::new("u");

		cache.refresh(true).await;
		let before = cache.evaluate("dark-mode", &ctx, false.into());

		assert!(matches!(cache.refresh(true).await, RefreshOutcome::Failed(_)));
		assert!(matches!(cache.refresh(true).await, RefreshOutcome::Failed(_)));

		assert_eq!(cache.evaluate("dark-mode", &ctx, false.into()), before);
		let status = cache.status();
		assert_eq!(status.state, CacheState::Ready);
		assert_eq!(status.snapshot_version, Some(1));
		assert_eq!(status.consecutive_failures, 2);
		assert!(status.last_error.unwrap().contains("connection refused"));
		assert_eq!(cache.metrics().refresh_failures, 2);
	}

	#[tokio::test]
	async fn test_success_clears_failure_count() {
		let store = ScriptedStore::new(vec![
			Err(FetchError::Unavailable("down".into())),
			Ok(FetchOutcome::Modified(snapshot(2, false))),
		]);
		let cache = cache(store);

		assert!(matches!(cache.refresh(true).await, RefreshOutcome::Failed(_)));
		assert_eq!(cache.status().state, CacheState::Uninitialized);
		assert_eq!(cache.status().consecutive_failures, 1);

		cache.refresh(true).await;
		let status = cache.status();
		assert_eq!(status.state, CacheState::Ready);
		assert_eq!(status.consecutive_failures, 0);
		assert!(status.last_error.is_none());
	}

	#[tokio::test]
	async fn test_older_snapshot_is_not_installed() {
		let store = ScriptedStore::new(vec![
			Ok(FetchOutcome::Modified(snapshot(5, true))),
			Ok(FetchOutcome::Modified(snapshot(4, false))),
		]);
		let cache = cache(store);

		cache.refresh(true).await;
		assert_eq!(
			cache.refresh(true).await,
			RefreshOutcome::NotModified { version: 5 }
		);
		assert_eq!(cache.snapshot_version(), Some(5));
		assert_eq!(cache.metrics().snapshot_swaps, 1);
	}

	#[tokio::test]
	async fn test_not_modified_without_snapshot_is_a_failure() {
		let cache = cache(ScriptedStore::new(vec![Ok(FetchOutcome::NotModified)]));
		assert!(matches!(cache.refresh(true).await, RefreshOutcome::Failed(_)));
		assert_eq!(cache.status().state, CacheState::Uninitialized);
	}

	#[tokio::test]
	async fn test_unforced_refresh_respects_interval() {
		let store = ScriptedStore::new(vec![
			Ok(FetchOutcome::Modified(snapshot(1, true))),
			Ok(FetchOutcome::NotModified),
		]);
		let cache = cache(store.clone());

		cache.refresh(false).await;
		assert_eq!(cache.refresh(false).await, RefreshOutcome::Skipped);
		assert_eq!(
			cache.refresh(true).await,
			RefreshOutcome::NotModified { version: 1 }
		);
		assert_eq!(store.calls().len(), 2);
	}

	#[tokio::test]
	async fn test_concurrent_refresh_is_single_flight() {
		let store = Arc::new(GatedStore::default());
		let cache = Arc::new(cache(store.clone()));

		let first = tokio::spawn({
			let cache = Arc::clone(&cache);
			async move { cache.refresh(true).await }
		});
		store.entered.notified().await;
		assert_eq!(cache.status().state, CacheState::Fetching);

		assert_eq!(cache.refresh(true).await, RefreshOutcome::AlreadyInFlight);
		assert_eq!(cache.refresh(false).await, RefreshOutcome::AlreadyInFlight);

		store.release.notify_one();
		assert_eq!(first.await.unwrap(), RefreshOutcome::Updated { version: 1 });

		let metrics = cache.metrics();
		assert_eq!(metrics.refresh_attempts, 1);
		assert_eq!(metrics.coalesced_refreshes, 2);
	}

	#[tokio::test]
	async fn test_close_cancels_in_flight_fetch() {
		let store = Arc::new(GatedStore::default());
		let cache = Arc::new(cache(store.clone()));

		let refresh = tokio::spawn({
			let cache = Arc::clone(&cache);
			async move { cache.refresh(true).await }
		});
		store.entered.notified().await;

		// The gate is never released; close must not wait for it.
		tokio::time::timeout(Duration::from_secs(5), cache.close())
			.await
			.expect("close returned");
		assert_eq!(refresh.await.unwrap(), RefreshOutcome::Closed);

		assert!(cache.snapshot().is_none());
		assert_eq!(cache.status().state, CacheState::Closed);
		assert_eq!(cache.refresh(true).await, RefreshOutcome::Closed);

		let result = cache.evaluate("dark-mode", &EvaluationContext::new("u"), true.into());
		assert_eq!(result.error_kind, Some(EvaluationErrorKind::ClientClosed));
		assert_eq!(result.value, VariantValue::Boolean(true));
	}

	#[tokio::test]
	async fn test_concurrent_close_waits_for_teardown() {
		let store = Arc::new(GatedStore::default());
		let cache = Arc::new(cache(store.clone()));

		let refresh = tokio::spawn({
			let cache = Arc::clone(&cache);
			async move { cache.refresh(true).await }
		});
		store.entered.notified().await;

		let closers: Vec<_> = (0..4)
			.map(|_| {
				let cache = Arc::clone(&cache);
				tokio::spawn(async move {
					cache.close().await;
					cache.status().state
				})
			})
			.collect();
		for closer in closers {
			assert_eq!(closer.await.unwrap(), CacheState::Closed);
		}
		assert_eq!(refresh.await.unwrap(), RefreshOutcome::Closed);
	}

	#[tokio::test]
	async fn test_dropped_refresh_settles_status() {
		let store = Arc::new(GatedStore::default());
		let cache = cache(store.clone());

		let outcome = tokio::time::timeout(Duration::from_millis(50), cache.refresh(true)).await;
		assert!(outcome.is_err());

		let status = cache.status();
		assert_eq!(status.state, CacheState::Uninitialized);
		assert_eq!(status.snapshot_version, None);

		// The lock went with the dropped future, so the next refresh runs.
		let next = tokio::spawn({
			let store = Arc::clone(&store);
			async move {
				store.entered.notified().await;
				store.release.notify_one();
			}
		});
		assert_eq!(cache.refresh(true).await, RefreshOutcome::Updated { version: 1 });
		next.await.unwrap();
	}

	#[tokio::test]
	async fn test_dropped_refresh_keeps_ready_with_snapshot() {
		let cache = cache(Arc::new(StallAfterFirst::default()));
		assert_eq!(cache.refresh(true).await, RefreshOutcome::Updated { version: 4 });

		let outcome = tokio::time::timeout(Duration::from_millis(50), cache.refresh(true)).await;
		assert!(outcome.is_err());

		let status = cache.status();
		assert_eq!(status.state, CacheState::Ready);
		assert_eq!(status.snapshot_version, Some(4));
		assert!(status.is_ready());
	}

	#[tokio::test]
	async fn test_status_subscribers_see_updates() {
		let cache = cache(ScriptedStore::new(vec![Ok(FetchOutcome::Modified(snapshot(
			9, true,
		)))]));
		let mut rx = cache.subscribe();

		cache.refresh(true).await;
		assert!(rx.has_changed().unwrap());
		let status = rx.borrow_and_update().clone();
		assert_eq!(status.snapshot_version, Some(9));
		assert!(status.is_ready());
	}

	#[tokio::test]
	async fn test_bulk_without_snapshot() {
		let cache = cache(ScriptedStore::new(vec![]));
		let bulk = cache.evaluate_all(["a", "b"], &EvaluationContext::new("u"));
		assert_eq!(bulk.len(), 2);
		assert_eq!(bulk.snapshot_version, 0);
		assert_eq!(
			bulk.get("a").unwrap().error_kind,
			Some(EvaluationErrorKind::ClientNotReady)
		);
	}
}
