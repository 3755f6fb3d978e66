// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Write-time checks that keep malformed definitions out of snapshots.

use std::collections::HashSet;

use regex::Regex;

use crate::bucket::{Rollout, TOTAL_WEIGHT};
use crate::environment::Environment;
use crate::error::{FlagsError, Result};
use crate::flag::{Flag, FlagEnvironmentState, VariationOrRollout};
use crate::rule::{Clause, Operator};

impl Flag {
	/// Validates the whole definition, every environment included.
	pub fn validate(&self) -> Result<()> {
		if !Flag::validate_key(&self.key) {
			return Err(FlagsError::InvalidFlagKey(self.key.clone()));
		}

		if self.variants.is_empty() {
			return Err(FlagsError::EmptyVariants {
				flag_key: self.key.clone(),
			});
		}

		for (index, variant) in self.variants.iter().enumerate() {
			if !variant.matches_type(self.flag_type) {
				return Err(FlagsError::VariantTypeMismatch {
					flag_key: self.key.clone(),
					index,
					expected: self.flag_type.to_string(),
				});
			}
		}

		for (environment, state) in &self.environments {
			if !Environment::validate_name(environment) {
				return Err(FlagsError::InvalidEnvironmentName(environment.clone()));
			}
			self.validate_state(environment, state)?;
		}

		Ok(())
	}

	/// Validates one environment's targeting against this flag's variants.
	pub fn validate_state(&self, environment: &str, state: &FlagEnvironmentState) -> Result<()> {
		let variants = self.variants.len();

		check_index(
			state.off_variation,
			variants,
			format!("{environment}.offVariation"),
		)?;
		check_target(
			&state.fallthrough,
			variants,
			&format!("{environment}.fallthrough"),
		)?;

		let mut seen = HashSet::new();
		for (position, rule) in state.rules.iter().enumerate() {
			if rule.id.trim().is_empty() {
				return Err(FlagsError::EmptyRuleId {
					environment: environment.to_string(),
				});
			}
			if !seen.insert(rule.id.as_str()) {
				return Err(FlagsError::DuplicateRuleId {
					environment: environment.to_string(),
					rule_id: rule.id.clone(),
				});
			}

			let location = format!("{environment}.rules[{position}]");
			for (index, clause) in rule.clauses.iter().enumerate() {
				validate_clause(clause, &format!("{location}.clauses[{index}]"))?;
			}
			check_target(&rule.variation_or_rollout, variants, &location)?;
		}

		Ok(())
	}
}

fn check_index(index: usize, len: usize, location: String) -> Result<()> {
	if index >= len {
		return Err(FlagsError::VariationOutOfRange {
			location,
			index,
			len,
		});
	}
	Ok(())
}

fn check_target(target: &VariationOrRollout, variants: usize, location: &str) -> Result<()> {
	match target {
		VariationOrRollout::Variation(index) => check_index(*index, variants, location.to_string()),
		VariationOrRollout::Rollout(rollout) => validate_rollout(rollout, variants, location),
	}
}

fn validate_rollout(rollout: &Rollout, variants: usize, location: &str) -> Result<()> {
	if rollout.variations.is_empty() {
		return Err(FlagsError::EmptyRollout {
			location: location.to_string(),
		});
	}

	for entry in &rollout.variations {
		check_index(entry.variation, variants, format!("{location}.rollout"))?;
	}

	if rollout.salt.as_deref().is_some_and(str::is_empty) {
		return Err(FlagsError::InvalidWeight {
			location: location.to_string(),
			reason: "rollout salt must not be empty".to_string(),
		});
	}

	let total = rollout.total_weight();
	if total != u64::from(TOTAL_WEIGHT) {
		return Err(FlagsError::RolloutWeightSum {
			location: location.to_string(),
			actual: format!("{}.{:02}", total / 100, total % 100),
		});
	}

	Ok(())
}

fn validate_clause(clause: &Clause, location: &str) -> Result<()> {
	let invalid = |reason: &str| FlagsError::InvalidOperand {
		location: location.to_string(),
		operator: clause.operator.to_string(),
		reason: reason.to_string(),
	};

	if clause.attribute.is_empty() {
		return Err(invalid("attribute name is empty"));
	}

	match clause.operator {
		Operator::Unsupported => {
			return Err(FlagsError::UnsupportedOperator {
				location: location.to_string(),
			})
		}
		Operator::Equals | Operator::GreaterThan | Operator::LessThan => {
			if clause.values.len() != 1 {
				return Err(invalid("expected exactly one operand"));
			}
		}
		Operator::In | Operator::NotIn | Operator::Contains | Operator::MatchesRegex => {
			if clause.values.is_empty() {
				return Err(invalid("expected at least one operand"));
			}
		}
	}

	match clause.operator {
		Operator::Equals | Operator::In | Operator::NotIn => {
			if clause.values.iter().any(|v| v.is_array() || v.is_object()) {
				return Err(invalid("operands must be scalars"));
			}
		}
		Operator::GreaterThan | Operator::LessThan => {
			if clause.values.iter().any(|v| !v.is_number()) {
				return Err(invalid("operand must be a number"));
			}
		}
		Operator::Contains => {
			if clause.values.iter().any(|v| !v.is_string()) {
				return Err(invalid("operands must be strings"));
			}
		}
		Operator::MatchesRegex => {
			for value in &clause.values {
				let Some(pattern) = value.as_str() else {
					return Err(invalid("operands must be strings"));
				};
				if let Err(e) = Regex::new(pattern) {
					return Err(FlagsError::InvalidRegex {
						location: location.to_string(),
						pattern: pattern.to_string(),
						reason: e.to_string(),
					});
				}
			}
		}
		Operator::Unsupported => {}
	}

	Ok(())
}
