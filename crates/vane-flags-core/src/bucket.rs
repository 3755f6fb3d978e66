// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Deterministic percentage bucketing.
//!
//! # Hash
//!
//! The bucket for a context is computed as:
//!
//! 1. Build the UTF-8 byte string `flag_key ":" context_key`, or
//!    `flag_key ":" salt ":" context_key` when the rollout carries a salt.
//! 2. Take its SHA-256 digest.
//! 3. Read the first 8 bytes of the digest as a big-endian `u64`.
//! 4. Reduce modulo [`BUCKET_SPACE`] (100 000).
//!
//! This procedure is part of the public contract: changing any step reassigns
//! users between variations.
//!
//! # Ranges
//!
//! Weights are fixed-point hundredths of a percent (`10_000` = 100.00%), so
//! one hundredth is exactly [`BUCKET_SPACE`] / 10 000 = 10 buckets and no
//! floating point is involved. Weights are laid out as cumulative ranges in
//! rollout order. Each range is lower-bound inclusive and upper-bound
//! exclusive; a zero weight yields an empty range that is never selected.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Size of the bucket space: buckets are in `[0, BUCKET_SPACE)`.
pub const BUCKET_SPACE: u32 = 100_000;

/// Total weight of a well-formed rollout, in hundredths of a percent.
pub const TOTAL_WEIGHT: u32 = 10_000;

const BUCKETS_PER_HUNDREDTH: u64 = (BUCKET_SPACE / TOTAL_WEIGHT) as u64;

/// Computes the bucket of `context_key` for `flag_key`.
pub fn bucket(flag_key: &str, context_key: &str, salt: Option<&str>) -> u32 {
	let mut hasher = Sha256::new();
	hasher.update(flag_key.as_bytes());
	hasher.update(b":");
	if let Some(salt) = salt {
		hasher.update(salt.as_bytes());
		hasher.update(b":");
	}
	hasher.update(context_key.as_bytes());
	let digest = hasher.finalize();

	let mut prefix = [0u8; 8];
	prefix.copy_from_slice(&digest[..8]);
	(u64::from_be_bytes(prefix) % u64::from(BUCKET_SPACE)) as u32
}

/// A rollout weight in hundredths of a percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Weight(u32);

impl Weight {
	pub const fn from_hundredths(hundredths: u32) -> Self {
		Self(hundredths)
	}

	/// Whole percent, e.g. `Weight::percent(10)` is 10.00%.
	pub const fn percent(percent: u32) -> Self {
		Self(percent.saturating_mul(100))
	}

	/// Converts a decimal percentage with at most two decimal places.
	///
	/// Returns `None` for negative, non-finite or over-precise input.
	pub fn from_percent(percent: f64) -> Option<Self> {
		if !percent.is_finite() || percent < 0.0 {
			return None;
		}
		let scaled = percent * 100.0;
		let rounded = scaled.round();
		if (scaled - rounded).abs() > 1e-6 || rounded > f64::from(u32::MAX) {
			return None;
		}
		Some(Self(rounded as u32))
	}

	pub const fn hundredths(self) -> u32 {
		self.0
	}

	pub fn as_percent(self) -> f64 {
		f64::from(self.0) / 100.0
	}
}

impl fmt::Display for Weight {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
	}
}

impl Serialize for Weight {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_f64(self.as_percent())
	}
}

impl<'de> Deserialize<'de> for Weight {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let percent = f64::deserialize(deserializer)?;
		Self::from_percent(percent).ok_or_else(|| {
			serde::de::Error::custom(format!(
				"rollout weight must be a non-negative percentage with at most two decimals, got {percent}"
			))
		})
	}
}

/// One `(variation, weight)` entry of a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedVariation {
	pub variation: usize,
	pub weight: Weight,
}

impl WeightedVariation {
	pub fn new(variation: usize, weight: Weight) -> Self {
		Self { variation, weight }
	}
}

/// A weighted split of traffic across variations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollout {
	pub variations: Vec<WeightedVariation>,
	/// Decorrelates this rollout's buckets from other rollouts of the same flag.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub salt: Option<String>,
}

/// Outcome of placing a bucket within a rollout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloutSelection {
	pub variation: usize,
	/// The bucket fell outside every range and was clamped.
	pub clamped: bool,
}

impl Rollout {
	pub fn new(variations: Vec<WeightedVariation>) -> Self {
		Self {
			variations,
			salt: None,
		}
	}

	pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
		self.salt = Some(salt.into());
		self
	}

	/// Sum of all weights, in hundredths of a percent.
	pub fn total_weight(&self) -> u64 {
		self
			.variations
			.iter()
			.map(|v| u64::from(v.weight.hundredths()))
			.sum()
	}

	/// Computes the bucket for this rollout and selects a variation.
	pub fn resolve(&self, flag_key: &str, context_key: &str) -> Option<RolloutSelection> {
		self.select(bucket(flag_key, context_key, self.salt.as_deref()))
	}

	/// Selects the first range containing `bucket`.
	///
	/// A bucket past the last range (weights summing below 100%) is clamped
	/// into the last non-empty range. Returns `None` only for an empty rollout.
	pub fn select(&self, bucket: u32) -> Option<RolloutSelection> {
		let bucket = u64::from(bucket);
		let mut upper = 0u64;
		for entry in &self.variations {
			upper += u64::from(entry.weight.hundredths()) * BUCKETS_PER_HUNDREDTH;
			if bucket < upper {
				return Some(RolloutSelection {
					variation: entry.variation,
					clamped: false,
				});
			}
		}

		self
			.variations
			.iter()
			.rev()
			.find(|v| v.weight.hundredths() > 0)
			.or_else(|| self.variations.first())
			.map(|entry| RolloutSelection {
				variation: entry.variation,
				clamped: true,
			})
	}
}
