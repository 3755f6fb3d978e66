// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

/// Errors that know whether another attempt could succeed.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() {
			return true;
		}
		self.status().is_some_and(|status| {
			RetryConfig::default_retryable_statuses().contains(&status)
		})
	}
}

/// Backoff policy for [`retry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Total attempts including the first one.
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	/// Randomize each delay within `[delay / 2, delay]`.
	pub jitter: bool,
	pub retryable_statuses: Vec<StatusCode>,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(5),
			backoff_factor: 2.0,
			jitter: true,
			retryable_statuses: Self::default_retryable_statuses(),
		}
	}
}

impl RetryConfig {
	pub fn default_retryable_statuses() -> Vec<StatusCode> {
		vec![
			StatusCode::TOO_MANY_REQUESTS,
			StatusCode::REQUEST_TIMEOUT,
			StatusCode::INTERNAL_SERVER_ERROR,
			StatusCode::BAD_GATEWAY,
			StatusCode::SERVICE_UNAVAILABLE,
			StatusCode::GATEWAY_TIMEOUT,
		]
	}

	/// A policy that makes exactly one attempt.
	pub fn no_retry() -> Self {
		Self {
			max_attempts: 1,
			..Self::default()
		}
	}

	pub fn is_retryable_status(&self, status: StatusCode) -> bool {
		self.retryable_statuses.contains(&status)
	}

	/// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(16) as i32;
		let raw = self.base_delay.as_nanos() as f64 * self.backoff_factor.max(1.0).powi(exponent);
		let capped = raw.min(self.max_delay.as_nanos() as f64);
		let delay = if self.jitter {
			capped * (0.5 + fastrand::f64() * 0.5)
		} else {
			capped
		};
		Duration::from_nanos(delay.round() as u64)
	}
}

/// Runs `operation` until it succeeds, returns a non-retryable error, or
/// `config.max_attempts` is exhausted.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let max_attempts = config.max_attempts.max(1);
	let mut attempt = 1;

	loop {
		match operation().await {
			Ok(value) => return Ok(value),
			Err(e) if attempt < max_attempts && e.is_retryable() => {
				let delay = config.delay_for(attempt);
				warn!(
					attempt,
					max_attempts,
					delay_ms = delay.as_millis() as u64,
					error = %e,
					"request failed, retrying"
				);
				tokio::time::sleep(delay).await;
				attempt += 1;
			}
			Err(e) => {
				debug!(attempt, error = %e, "giving up on request");
				return Err(e);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicU32, Ordering};

	#[derive(Debug)]
	struct TestError {
		retryable: bool,
	}

	impl std::fmt::Display for TestError {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "test error (retryable: {})", self.retryable)
		}
	}

	impl RetryableError for TestError {
		fn is_retryable(&self) -> bool {
			self.retryable
		}
	}

	fn fast() -> RetryConfig {
		RetryConfig {
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(2),
			jitter: false,
			..RetryConfig::default()
		}
	}

	#[tokio::test]
	async fn retries_until_success() {
		let calls = AtomicU32::new(0);
		let result: Result<u32, TestError> = retry(&fast(), || async {
			let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
			if n < 3 {
				Err(TestError { retryable: true })
			} else {
				Ok(n)
			}
		})
		.await;

		assert_eq!(result.unwrap(), 3);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn stops_on_non_retryable_error() {
		let calls = AtomicU32::new(0);
		let result: Result<(), TestError> = retry(&fast(), || async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(TestError { retryable: false })
		})
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn gives_up_after_max_attempts() {
		let calls = AtomicU32::new(0);
		let result: Result<(), TestError> = retry(&fast(), || async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(TestError { retryable: true })
		})
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[test]
	fn delay_grows_and_is_capped() {
		let config = RetryConfig {
			base_delay: Duration::from_millis(100),
			max_delay: Duration::from_millis(350),
			jitter: false,
			..RetryConfig::default()
		};
		assert_eq!(config.delay_for(1), Duration::from_millis(100));
		assert_eq!(config.delay_for(2), Duration::from_millis(200));
		assert_eq!(config.delay_for(3), Duration::from_millis(350));
	}

	#[test]
	fn jitter_stays_within_bounds() {
		let config = RetryConfig {
			base_delay: Duration::from_millis(100),
			jitter: true,
			..RetryConfig::default()
		};
		for _ in 0..100 {
			let delay = config.delay_for(1);
			assert!(delay >= Duration::from_millis(50) && delay <= Duration::from_millis(100));
		}
	}

	#[test]
	fn no_retry_makes_one_attempt() {
		let result: Result<(), TestError> = tokio_test::block_on(retry(&RetryConfig::no_retry(), || async {
			Err(TestError { retryable: true })
		}));
		assert!(result.is_err());
	}
}
