// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The evaluation engine.
//!
//! Evaluation is a pure function of a [`Snapshot`], a flag key and an
//! [`EvaluationContext`]. It never fails: every problem is folded into
//! [`EvaluationReason::Error`] or [`EvaluationReason::FlagNotFound`] and the
//! caller's default value is served.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::context::EvaluationContext;
use crate::flag::{Flag, VariantValue, VariationOrRollout};
use crate::snapshot::Snapshot;

/// Why a particular value was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationReason {
	/// The flag is disabled in this environment; the off variation is served.
	FlagOff,
	/// A targeting rule matched.
	RuleMatch,
	/// No rule matched; the fallthrough was served.
	Fallthrough,
	/// The flag is not in the snapshot; the caller default is served.
	FlagNotFound,
	/// Evaluation could not complete; the caller default is served.
	Error,
}

impl std::fmt::Display for EvaluationReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			EvaluationReason::FlagOff => "flag_off",
			EvaluationReason::RuleMatch => "rule_match",
			EvaluationReason::Fallthrough => "fallthrough",
			EvaluationReason::FlagNotFound => "flag_not_found",
			EvaluationReason::Error => "error",
		};
		f.write_str(name)
	}
}

/// Detail for [`EvaluationReason::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationErrorKind {
	/// A rollout was reached but the context has no key to bucket by.
	MissingContextKey,
	/// The flag definition in the snapshot is inconsistent.
	MalformedFlag,
	/// The client has not loaded its first snapshot yet.
	ClientNotReady,
	/// The client has been closed.
	ClientClosed,
}

/// The outcome of evaluating one flag for one context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
	pub flag_key: String,
	pub value: VariantValue,
	/// Index into the flag's variants; `None` when the default was served.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variation_index: Option<usize>,
	pub reason: EvaluationReason,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub rule_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error_kind: Option<EvaluationErrorKind>,
}

impl EvaluationResult {
	pub fn not_found(flag_key: impl Into<String>, default: VariantValue) -> Self {
		Self {
			flag_key: flag_key.into(),
			value: default,
			variation_index: None,
			reason: EvaluationReason::FlagNotFound,
			rule_id: None,
			error_kind: None,
		}
	}

	pub fn error(
		flag_key: impl Into<String>,
		default: VariantValue,
		kind: EvaluationErrorKind,
	) -> Self {
		Self {
			flag_key: flag_key.into(),
			value: default,
			variation_index: None,
			reason: EvaluationReason::Error,
			rule_id: None,
			error_kind: Some(kind),
		}
	}

	/// Whether the value came from the flag rather than the caller default.
	pub fn is_served_by_flag(&self) -> bool {
		self.variation_index.is_some()
	}
}

/// Evaluates `flag_key` in `snapshot` for `context`.
///
/// 1. An absent flag yields `flag_not_found` with `default`.
/// 2. A disabled flag yields its off variation with `flag_off`.
/// 3. The first rule whose clauses all match yields `rule_match`.
/// 4. Otherwise the fallthrough yields `fallthrough`.
pub fn evaluate(
	snapshot: &Snapshot,
	flag_key: &str,
	context: &EvaluationContext,
	default: VariantValue,
) -> EvaluationResult {
	match snapshot.get(flag_key) {
		Some(flag) => evaluate_flag(flag, snapshot.environment(), context, default),
		None => EvaluationResult::not_found(flag_key, default),
	}
}

/// Evaluates a single flag definition in `environment`.
pub fn evaluate_flag(
	flag: &Flag,
	environment: &str,
	context: &EvaluationContext,
	default: VariantValue,
) -> EvaluationResult {
	let Some(state) = flag.environment(environment) else {
		error!(
			flag_key = %flag.key,
			environment = %environment,
			"flag has no state for snapshot environment"
		);
		return EvaluationResult::error(&flag.key, default, EvaluationErrorKind::MalformedFlag);
	};

	if !state.enabled {
		return serve(
			flag,
			state.off_variation,
			EvaluationReason::FlagOff,
			None,
			default,
		);
	}

	if let Some(rule) = state.rules.iter().find(|rule| rule.matches(context)) {
		return resolve(
			flag,
			&rule.variation_or_rollout,
			context,
			EvaluationReason::RuleMatch,
			Some(&rule.id),
			default,
		);
	}

	resolve(
		flag,
		&state.fallthrough,
		context,
		EvaluationReason::Fallthrough,
		None,
		default,
	)
}

fn resolve(
	flag: &Flag,
	target: &VariationOrRollout,
	context: &EvaluationContext,
	reason: EvaluationReason,
	rule_id: Option<&str>,
	default: VariantValue,
) -> EvaluationResult {
	let index = match target {
		VariationOrRollout::Variation(index) => *index,
		VariationOrRollout::Rollout(rollout) => {
			if !context.has_key() {
				warn!(flag_key = %flag.key, "rollout reached with an empty context key");
				return EvaluationResult::error(
					&flag.key,
					default,
					EvaluationErrorKind::MissingContextKey,
				);
			}

			match rollout.resolve(&flag.key, &context.key) {
				Some(selection) => {
					if selection.clamped {
						error!(
							flag_key = %flag.key,
							rule_id = ?rule_id,
							total_weight = rollout.total_weight(),
							"rollout weights do not cover the bucket space; bucket clamped (should be unreachable)"
						);
					}
					selection.variation
				}
				None => {
					error!(flag_key = %flag.key, rule_id = ?rule_id, "empty rollout reached evaluation");
					return EvaluationResult::error(
						&flag.key,
						default,
						EvaluationErrorKind::MalformedFlag,
					);
				}
			}
		}
	};

	serve(flag, index, reason, rule_id, default)
}

fn serve(
	flag: &Flag,
	index: usize,
	reason: EvaluationReason,
	rule_id: Option<&str>,
	default: VariantValue,
) -> EvaluationResult {
	match flag.variant(index) {
		Some(value) => EvaluationResult {
			flag_key: flag.key.clone(),
			value: value.clone(),
			variation_index: Some(index),
			reason,
			rule_id: rule_id.map(str::to_string),
			error_kind: None,
		},
		None => {
			error!(
				flag_key = %flag.key,
				index,
				variants = flag.variants.len(),
				"variation index out of range"
			);
			EvaluationResult::error(&flag.key, default, EvaluationErrorKind::MalformedFlag)
		}
	}
}
