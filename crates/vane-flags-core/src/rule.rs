// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Targeting rules and the clause matcher.
//!
//! A rule matches when every one of its clauses matches (logical AND); a rule
//! with no clauses matches every context. Clause matching is type-aware and
//! fails closed: a missing or `null` attribute never matches, numeric
//! operators only compare numbers, and regexes only run against strings.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::context::{EvaluationContext, Scalar};
use crate::flag::VariationOrRollout;

/// Comparison applied between a context attribute and a clause's operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
	/// Attribute equals the single operand.
	Equals,
	/// Attribute equals any operand.
	In,
	/// String attribute contains any operand as a substring.
	Contains,
	/// Numeric attribute is greater than the operand.
	GreaterThan,
	/// Numeric attribute is less than the operand.
	LessThan,
	/// String attribute matches any operand regex.
	MatchesRegex,
	/// Attribute is present and equals none of the operands.
	#[serde(alias = "negateOfAny")]
	NotIn,
	/// Anything the engine does not understand. Rejected at write time.
	#[serde(other)]
	Unsupported,
}

impl fmt::Display for Operator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Operator::Equals => "equals",
			Operator::In => "in",
			Operator::Contains => "contains",
			Operator::GreaterThan => "greaterThan",
			Operator::LessThan => "lessThan",
			Operator::MatchesRegex => "matchesRegex",
			Operator::NotIn => "notIn",
			Operator::Unsupported => "unsupported",
		};
		f.write_str(name)
	}
}

/// One condition of a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
	pub attribute: String,
	pub operator: Operator,
	pub values: Vec<serde_json::Value>,
	/// Compiled `MatchesRegex` operands, built on first use.
	#[serde(skip)]
	patterns: OnceLock<Vec<Regex>>,
}

impl PartialEq for Clause {
	fn eq(&self, other: &Self) -> bool {
		self.attribute == other.attribute
			&& self.operator == other.operator
			&& self.values == other.values
	}
}

impl Clause {
	pub fn new(
		attribute: impl Into<String>,
		operator: Operator,
		values: Vec<serde_json::Value>,
	) -> Self {
		Self {
			attribute: attribute.into(),
			operator,
			values,
			patterns: OnceLock::new(),
		}
	}

	pub fn equals(attribute: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		Self::new(attribute, Operator::Equals, vec![value.into()])
	}

	/// Evaluates this clause against a context.
	pub fn matches(&self, context: &EvaluationContext) -> bool {
		let actual = match context.attribute(&self.attribute) {
			Some(Scalar::Null) | None => return false,
			Some(actual) => actual,
		};

		match self.operator {
			Operator::Equals | Operator::In => self.any_operand_equals(&actual),
			Operator::NotIn => !self.any_operand_equals(&actual),
			Operator::Contains => match actual.as_str() {
				Some(haystack) => self
					.values
					.iter()
					.filter_map(|v| v.as_str())
					.any(|needle| haystack.contains(needle)),
				None => false,
			},
			Operator::GreaterThan => self.compare_numeric(&actual, |a, b| a > b),
			Operator::LessThan => self.compare_numeric(&actual, |a, b| a < b),
			Operator::MatchesRegex => match actual.as_str() {
				Some(s) => self.patterns().iter().any(|re| re.is_match(s)),
				None => false,
			},
			Operator::Unsupported => {
				error!(
					attribute = %self.attribute,
					"unsupported operator reached evaluation; clause treated as non-matching"
				);
				false
			}
		}
	}

	fn any_operand_equals(&self, actual: &Scalar<'_>) -> bool {
		self
			.values
			.iter()
			.any(|v| Scalar::from_json(v).same_as(actual))
	}

	fn compare_numeric(&self, actual: &Scalar<'_>, cmp: impl Fn(f64, f64) -> bool) -> bool {
		let Some(actual) = actual.as_number() else {
			return false;
		};
		self
			.values
			.iter()
			.filter_map(|v| v.as_f64())
			.any(|operand| cmp(actual, operand))
	}

	fn patterns(&self) -> &[Regex] {
		self.patterns.get_or_init(|| {
			self
				.values
				.iter()
				.filter_map(|v| v.as_str())
				.filter_map(|pattern| match Regex::new(pattern) {
					Ok(re) => Some(re),
					Err(e) => {
						error!(
							attribute = %self.attribute,
							pattern = %pattern,
							error = %e,
							"invalid regex reached evaluation; operand ignored"
						);
						None
					}
				})
				.collect()
		})
	}
}

/// An ordered, conditional override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
	pub id: String,
	#[serde(default)]
	pub clauses: Vec<Clause>,
	pub variation_or_rollout: VariationOrRollout,
}

impl Rule {
	pub fn new(id: impl Into<String>, variation_or_rollout: VariationOrRollout) -> Self {
		Self {
			id: id.into(),
			clauses: Vec::new(),
			variation_or_rollout,
		}
	}

	pub fn with_clause(mut self, clause: Clause) -> Self {
		self.clauses.push(clause);
		self
	}

	/// True when every clause matches. An empty clause list matches everything.
	pub fn matches(&self, context: &EvaluationContext) -> bool {
		self.clauses.iter().all(|c| c.matches(context))
	}
}

/// Evaluates one rule's clauses against a context.
pub fn matches(rule: &Rule, context: &EvaluationContext) -> bool {
	rule.matches(context)
}


#[cfg(test)]
mod proptest_tests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#[test]
		fn not_in_is_negation_of_in_when_present(
			actual in "[a-z]{1,5}",
			operands in prop::collection::vec("[a-z]{1,5}", 0..5),
		) {
			let ctx = EvaluationContext::new("k").with_attribute("attr", actual);
			let values: Vec<serde_json::Value> = operands.into_iter().map(serde_json::Value::from).collect();
			let is_in = Clause::new("attr", Operator::In, values.clone()).matches(&ctx);
			let not_in = Clause::new("attr", Operator::NotIn, values).matches(&ctx);
			prop_assert_eq!(is_in, !not_in);
		}

		#[test]
		fn greater_and_less_are_exclusive(a: i32, b: i32) {
			let ctx = EvaluationContext::new("k").with_attribute("n", a);
			let gt = Clause::new("n", Operator::GreaterThan, vec![serde_json::json!(b)]).matches(&ctx);
			let lt = Clause::new("n", Operator::LessThan, vec![serde_json::json!(b)]).matches(&ctx);
			prop_assert!(!(gt && lt));
			prop_assert_eq!(gt || lt, a != b);
		}
	}
}
