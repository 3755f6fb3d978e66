// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Polls one flag and prints every change.
//!
//! ```text
//! VANE_FLAGS_BASE_URL=http://localhost:8080 VANE_FLAGS_SDK_KEY=sdk-dev \
//! VANE_FLAGS_PROJECT=shop VANE_FLAGS_ENVIRONMENT=dev \
//! RUST_LOG=vane_flags=debug cargo run -p vane-flags --example poll -- new-checkout user-42
//! ```

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use vane_flags::{EvaluationContext, FlagsClient, VariantValue};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::registry()
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.with(tracing_subscriber::fmt::layer())
		.init();

	let mut args = std::env::args().skip(1);
	let flag_key = args.next().unwrap_or_else(|| "new-checkout".to_string());
	let context_key = args.next().unwrap_or_else(|| "anonymous".to_string());

	let client = FlagsClient::builder()
		.config_file("vane-flags.toml")
		.build()
		.await?;
	let context = EvaluationContext::new(context_key);

	let mut ticker = tokio::time::interval(Duration::from_secs(1));
	let mut last = None;
	loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => break,
			_ = ticker.tick() => {
				let result = client.evaluate(&flag_key, &context, VariantValue::null());
				let seen = (result.value.clone(), result.reason);
				if last.as_ref() != Some(&seen) {
					tracing::info!(
						flag_key = %flag_key,
						value = %result.value,
						reason = %result.reason,
						snapshot_version = ?client.snapshot_version(),
						"flag changed"
					);
					last = Some(seen);
				}
			}
		}
	}

	let status = client.status();
	tracing::info!(
		state = ?status.state,
		consecutive_failures = status.consecutive_failures,
		"shutting down"
	);
	client.close().await;
	Ok(())
}
