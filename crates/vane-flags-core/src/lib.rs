// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Vane feature flags system.
//!
//! This crate holds the flag data model and the pure evaluation path: rule
//! matching, rollout bucketing, single and batch evaluation over an immutable
//! [`Snapshot`]. It is shared by the flag store (`vane-server-flags`) and the
//! client SDK (`vane-flags`).
//!
//! # Overview
//!
//! - Typed flags (boolean, string, number, json) with ordered variants
//! - Per-environment state: enabled switch, ordered rules, fallthrough, off variation
//! - Percentage rollouts bucketed by SHA-256 over `flag_key:context_key`
//! - Write-time validation so malformed definitions never reach a snapshot
//!
//! # Example
//!
//! ```
//! use vane_flags_core::{
//!     evaluate, Clause, EvaluationContext, EvaluationReason, Flag, FlagEnvironmentState,
//!     Rule, Snapshot, SnapshotScope, VariantValue, VariationOrRollout,
//! };
//!
//! let state = FlagEnvironmentState::new(VariationOrRollout::Variation(1), 1)
//!     .with_enabled(true)
//!     .with_rule(
//!         Rule::new("us", VariationOrRollout::Variation(0))
//!             .with_clause(Clause::equals("country", "US")),
//!     );
//! let flag = Flag::boolean("new-checkout").with_environment("prod", state);
//! let snapshot = Snapshot::new(SnapshotScope::new("shop", "prod"), 1, vec![flag]);
//!
//! let ctx = EvaluationContext::new("user-42").with_attribute("country", "US");
//! let result = evaluate(&snapshot, "new-checkout", &ctx, VariantValue::Boolean(false));
//!
//! assert_eq!(result.value, VariantValue::Boolean(true));
//! assert_eq!(result.reason, EvaluationReason::RuleMatch);
//! ```

pub mod batch;
pub mod bucket;
pub mod context;
pub mod environment;
pub mod error;
pub mod evaluation;
pub mod flag;
pub mod rule;
pub mod snapshot;
pub mod validation;

pub use batch::{evaluate_all, evaluate_snapshot, BulkEvaluationResult};
pub use bucket::{bucket, Rollout, RolloutSelection, Weight, WeightedVariation, BUCKET_SPACE};
pub use context::{EvaluationContext, Scalar};
pub use environment::Environment;
pub use error::{FetchError, FlagsError, Result};
pub use evaluation::{
	evaluate, evaluate_flag, EvaluationErrorKind, EvaluationReason, EvaluationResult,
};
pub use flag::{Flag, FlagEnvironmentState, FlagType, VariantValue, VariationOrRollout};
pub use rule::{matches, Clause, Operator, Rule};
pub use snapshot::{FetchOutcome, FlagStore, Snapshot, SnapshotScope};

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#[test]
		fn flag_key_starts_with_lowercase(s in "[a-z][a-z0-9_.-]{0,99}") {
			prop_assert!(Flag::validate_key(&s));
		}

		#[test]
		fn flag_key_rejects_uppercase(s in "[A-Z][a-z0-9_]{0,99}") {
			prop_assert!(!Flag::validate_key(&s));
		}

		#[test]
		fn flag_key_rejects_too_long(s in "[a-z]{101,120}") {
			prop_assert!(!Flag::validate_key(&s));
		}

		#[test]
		fn flag_key_with_dots_valid(domain in "[a-z][a-z0-9_]{1,10}", feature in "[a-z][a-z0-9_]{1,10}") {
			let key = format!("{}.{}", domain, feature);
			prop_assert!(Flag::validate_key(&key));
		}
	}

	// Evaluation never panics and always reports a coherent result.
	proptest! {
		#[test]
		fn evaluation_is_total(
			key in "[a-z0-9-]{0,20}",
			country in prop::option::of("[A-Z]{2}"),
			weight in 0u32..=10_000,
			enabled: bool,
		) {
			let rollout = Rollout::new(vec![
				WeightedVariation::new(0, Weight::from_hundredths(weight)),
				WeightedVariation::new(1, Weight::from_hundredths(10_000 - weight)),
			]);
			let state = FlagEnvironmentState::new(VariationOrRollout::Rollout(rollout), 1)
				.with_enabled(enabled)
				.with_rule(
					Rule::new("us", VariationOrRollout::Variation(0))
						.with_clause(Clause::equals("country", "US")),
				);
			let snapshot = Snapshot::new(
				SnapshotScope::new("shop", "prod"),
				1,
				vec![Flag::boolean("prop-flag").with_environment("prod", state)],
			);

			let mut ctx = EvaluationContext::new(key);
			if let Some(country) = country {
				ctx = ctx.with_attribute("country", country);
			}

			let result = evaluate(&snapshot, "prop-flag", &ctx, VariantValue::Boolean(false));
			match result.reason {
				EvaluationReason::Error => {
					prop_assert_eq!(result.error_kind, Some(EvaluationErrorKind::MissingContextKey));
					prop_assert!(result.variation_index.is_none());
				}
				EvaluationReason::FlagOff => prop_assert_eq!(result.variation_index, Some(1)),
				_ => prop_assert!(result.variation_index.is_some()),
			}
			prop_assert_eq!(
				&evaluate(&snapshot, "prop-flag", &ctx, VariantValue::Boolean(false)),
				&result
			);
		}
	}
}
