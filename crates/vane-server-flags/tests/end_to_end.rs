// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Store-to-client tests: definitions written to the repository are served by
//! an SDK client pulling from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use vane_flags::{
	CacheState, EvaluationContext, EvaluationReason, FlagsClient, RefreshOutcome, SnapshotPayload,
	VariantValue,
};
use vane_flags_core::{
	Clause, FetchError, FetchOutcome, Flag, FlagEnvironmentState, FlagStore, Rollout, Rule,
	SnapshotScope, VariationOrRollout, Weight, WeightedVariation,
};
use vane_server_flags::{FlagsRepository, InMemoryFlagsRepository};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn prod() -> SnapshotScope {
	SnapshotScope::new("shop", "prod")
}

fn new_checkout() -> Flag {
	let state = FlagEnvironmentState::new(
		VariationOrRollout::Rollout(Rollout::new(vec![
			WeightedVariation::new(0, Weight::percent(25)),
			WeightedVariation::new(1, Weight::percent(75)),
		])),
		1,
	)
	.with_enabled(true)
	.with_rule(
		Rule::new("us-users", VariationOrRollout::Variation(0))
			.with_clause(Clause::equals("country", "US")),
	);
	Flag::boolean("new-checkout").with_environment("prod", state)
}

async fn seeded_repo() -> Arc<InMemoryFlagsRepository> {
	let repo = Arc::new(InMemoryFlagsRepository::new());
	repo.create_environment("shop", "dev").await.unwrap();
	repo.create_environment("shop", "prod").await.unwrap();
	repo.create_flag("shop", new_checkout()).await.unwrap();
	repo
}

async fn client_for(store: Arc<dyn FlagStore>) -> FlagsClient {
	FlagsClient::builder()
		.project("shop")
		.environment("prod")
		.env_vars(false)
		.refresh_interval(Duration::from_secs(3600))
		.store(store)
		.build()
		.await
		.unwrap()
}

/// Forwards to an inner store unless switched offline.
struct FlakyStore {
	inner: Arc<dyn FlagStore>,
	offline: AtomicBool,
}

#[async_trait]
impl FlagStore for FlakyStore {
	async fn fetch_snapshot(
		&self,
		scope: &SnapshotScope,
		if_version_newer_than: Option<u64>,
	) -> Result<FetchOutcome, FetchError> {
		if self.offline.load(Ordering::SeqCst) {
			return Err(FetchError::Unavailable("connection refused".into()));
		}
		self.inner.fetch_snapshot(scope, if_version_newer_than).await
	}
}

#[tokio::test]
async fn test_client_serves_store_definitions() {
	let repo = seeded_repo().await;
	let client = client_for(repo.clone()).await;

	let us = EvaluationContext::new("user-42").with_attribute("country", "US");
	let result = client.evaluate("new-checkout", &us, false);
	assert_eq!(result.value, VariantValue::Boolean(true));
	assert_eq!(result.reason, EvaluationReason::RuleMatch);

	let elsewhere = EvaluationContext::new("user-7");
	let first = client.evaluate("new-checkout", &elsewhere, false);
	assert_eq!(first.reason, EvaluationReason::Fallthrough);
	for _ in 0..10 {
		assert_eq!(client.evaluate("new-checkout", &elsewhere, false), first);
	}

	assert_eq!(client.snapshot_version(), repo.revision(&prod()).await);
	client.close().await;
}

#[tokio::test]
async fn test_store_writes_reach_client_on_refresh() {
	let repo = seeded_repo().await;
	let client = client_for(repo.clone()).await;
	let ctx = EvaluationContext::new("user-42").with_attribute("country", "US");
	let before = client.snapshot_version().unwrap();

	repo.set_enabled("shop", "new-checkout", "prod", false)
		.await
		.unwrap();
	let outcome = client.refresh(true).await;
	let RefreshOutcome::Updated { version } = outcome else {
		panic!("expected an update, got {outcome:?}");
	};
	assert!(version > before);

	let result = client.evaluate("new-checkout", &ctx, true);
	assert_eq!(result.reason, EvaluationReason::FlagOff);
	assert_eq!(result.value, VariantValue::Boolean(false));

	// Writes to another environment leave the prod snapshot untouched.
	repo.create_flag(
		"shop",
		Flag::boolean("dev-only").with_environment(
			"dev",
			FlagEnvironmentState::new(VariationOrRollout::Variation(0), 1),
		),
	)
	.await
	.unwrap();
	assert_eq!(
		client.refresh(true).await,
		RefreshOutcome::NotModified { version }
	);
	assert_eq!(
		client.evaluate("dev-only", &ctx, false).reason,
		EvaluationReason::FlagNotFound
	);
}

#[tokio::test]
async fn test_unreachable_store_serves_previous_results() {
	let repo = seeded_repo().await;
	let flaky = Arc::new(FlakyStore {
		inner: repo.clone(),
		offline: AtomicBool::new(false),
	});
	let client = client_for(flaky.clone()).await;

	let contexts: Vec<EvaluationContext> = (0..50)
		.map(|i| EvaluationContext::new(format!("user-{i}")))
		.collect();
	let before: Vec<_> = contexts
		.iter()
		.map(|ctx| client.evaluate("new-checkout", ctx, false))
		.collect();

	flaky.offline.store(true, Ordering::SeqCst);
	repo.set_enabled("shop", "new-checkout", "prod", false)
		.await
		.unwrap();
	assert!(matches!(client.refresh(true).await, RefreshOutcome::Failed(_)));

	let after: Vec<_> = contexts
		.iter()
		.map(|ctx| client.evaluate("new-checkout", ctx, false))
		.collect();
	assert_eq!(before, after);

	let status = client.status();
	assert_eq!(status.state, CacheState::Ready);
	assert_eq!(status.consecutive_failures, 1);
	assert!(status.last_error.is_some());

	flaky.offline.store(false, Ordering::SeqCst);
	assert!(client.refresh(true).await.is_success());
	assert_eq!(
		client.evaluate("new-checkout", &contexts[0], true).reason,
		EvaluationReason::FlagOff
	);
}

#[tokio::test]
async fn test_http_client_reads_store_snapshot() {
	let repo = seeded_repo().await;
	let snapshot = repo.snapshot(&prod()).await.unwrap();
	let payload = SnapshotPayload::from_snapshot(&snapshot);

	let server = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/api/flags/projects/shop/environments/prod/snapshot"))
		.respond_with(ResponseTemplate::new(200).set_body_json(&payload))
		.mount(&server)
		.await;

	let client = FlagsClient::builder()
		.base_url(server.uri())
		.sdk_key("sdk-test")
		.project("shop")
		.environment("prod")
		.env_vars(false)
		.refresh_interval(Duration::from_secs(3600))
		.build()
		.await
		.unwrap();

	let direct = client_for(repo.clone()).await;
	let ctx = EvaluationContext::new("user-7");
	assert_eq!(client.snapshot_version(), Some(snapshot.version));
	assert_eq!(
		client.evaluate("new-checkout", &ctx, false),
		direct.evaluate("new-checkout", &ctx, false)
	);
}
