// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bucket::Rollout;
use crate::rule::Rule;

/// The declared type of a flag's variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
	Boolean,
	String,
	Number,
	Json,
}

impl fmt::Display for FlagType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			FlagType::Boolean => "boolean",
			FlagType::String => "string",
			FlagType::Number => "number",
			FlagType::Json => "json",
		};
		f.write_str(name)
	}
}

/// A value a flag can serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
	Boolean(bool),
	Number(f64),
	String(String),
	Json(serde_json::Value),
}

impl VariantValue {
	/// The value served when a batch call has no caller default.
	pub fn null() -> Self {
		VariantValue::Json(serde_json::Value::Null)
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			VariantValue::Boolean(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			VariantValue::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			VariantValue::Number(n) => Some(*n),
			_ => None,
		}
	}

	/// Returns the value as JSON, whatever its variant.
	pub fn to_json(&self) -> serde_json::Value {
		match self {
			VariantValue::Boolean(b) => serde_json::Value::Bool(*b),
			VariantValue::Number(n) => serde_json::Number::from_f64(*n)
				.map(serde_json::Value::Number)
				.unwrap_or(serde_json::Value::Null),
			VariantValue::String(s) => serde_json::Value::String(s.clone()),
			VariantValue::Json(v) => v.clone(),
		}
	}

	/// Whether this value may be served by a flag of the given type.
	///
	/// JSON flags accept any value.
	pub fn matches_type(&self, flag_type: FlagType) -> bool {
		matches!(
			(flag_type, self),
			(FlagType::Boolean, VariantValue::Boolean(_))
				| (FlagType::String, VariantValue::String(_))
				| (FlagType::Number, VariantValue::Number(_))
				| (FlagType::Json, _)
		)
	}
}

impl fmt::Display for VariantValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			VariantValue::Boolean(b) => write!(f, "{b}"),
			VariantValue::Number(n) => write!(f, "{n}"),
			VariantValue::String(s) => f.write_str(s),
			VariantValue::Json(v) => write!(f, "{v}"),
		}
	}
}

impl From<bool> for VariantValue {
	fn from(value: bool) -> Self {
		VariantValue::Boolean(value)
	}
}

impl From<f64> for VariantValue {
	fn from(value: f64) -> Self {
		VariantValue::Number(value)
	}
}

impl From<&str> for VariantValue {
	fn from(value: &str) -> Self {
		VariantValue::String(value.to_string())
	}
}

impl From<String> for VariantValue {
	fn from(value: String) -> Self {
		VariantValue::String(value)
	}
}

impl From<serde_json::Value> for VariantValue {
	fn from(value: serde_json::Value) -> Self {
		VariantValue::Json(value)
	}
}

/// Either a fixed variation index or a percentage rollout across variations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariationOrRollout {
	Variation(usize),
	Rollout(Rollout),
}

/// Targeting configuration of a flag in one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagEnvironmentState {
	pub enabled: bool,
	/// Evaluated in order; the first full match wins.
	#[serde(default)]
	pub rules: Vec<Rule>,
	pub fallthrough: VariationOrRollout,
	pub off_variation: usize,
	/// Assigned by the flag store and bumped on every mutation.
	#[serde(default)]
	pub version: u64,
}

impl FlagEnvironmentState {
	/// A disabled state with no rules.
	pub fn new(fallthrough: VariationOrRollout, off_variation: usize) -> Self {
		Self {
			enabled: false,
			rules: Vec::new(),
			fallthrough,
			off_variation,
			version: 0,
		}
	}

	pub fn with_enabled(mut self, enabled: bool) -> Self {
		self.enabled = enabled;
		self
	}

	pub fn with_rule(mut self, rule: Rule) -> Self {
		self.rules.push(rule);
		self
	}

	/// Content equality ignoring the version stamp.
	pub fn same_content(&self, other: &Self) -> bool {
		self.enabled == other.enabled
			&& self.rules == other.rules
			&& self.fallthrough == other.fallthrough
			&& self.off_variation == other.off_variation
	}
}

/// A named, typed decision point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flag {
	pub key: String,
	#[serde(rename = "type")]
	pub flag_type: FlagType,
	pub variants: Vec<VariantValue>,
	#[serde(default)]
	pub environments: BTreeMap<String, FlagEnvironmentState>,
}

impl Flag {
	pub fn new(key: impl Into<String>, flag_type: FlagType, variants: Vec<VariantValue>) -> Self {
		Self {
			key: key.into(),
			flag_type,
			variants,
			environments: BTreeMap::new(),
		}
	}

	/// A boolean flag with variants `[true, false]`.
	pub fn boolean(key: impl Into<String>) -> Self {
		Self::new(
			key,
			FlagType::Boolean,
			vec![VariantValue::Boolean(true), VariantValue::Boolean(false)],
		)
	}

	pub fn with_environment(
		mut self,
		environment: impl Into<String>,
		state: FlagEnvironmentState,
	) -> Self {
		self.environments.insert(environment.into(), state);
		self
	}

	pub fn environment(&self, environment: &str) -> Option<&FlagEnvironmentState> {
		self.environments.get(environment)
	}

	pub fn variant(&self, index: usize) -> Option<&VariantValue> {
		self.variants.get(index)
	}

	/// Returns a copy carrying only the given environment's state, or `None`
	/// if the flag is not configured there.
	pub fn for_environment(&self, environment: &str) -> Option<Flag> {
		let state = self.environments.get(environment)?;
		let mut environments = BTreeMap::new();
		environments.insert(environment.to_string(), state.clone());
		Some(Flag {
			key: self.key.clone(),
			flag_type: self.flag_type,
			variants: self.variants.clone(),
			environments,
		})
	}

	/// Validates the flag key format.
	///
	/// Valid keys:
	/// - 1-100 characters
	/// - Start with a lowercase letter or digit
	/// - Contain only lowercase letters, digits, `_`, `.` and `-`
	pub fn validate_key(key: &str) -> bool {
		if key.is_empty() || key.len() > 100 {
			return false;
		}

		let mut chars = key.chars();

		match chars.next() {
			Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
			_ => return false,
		}

		chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_validate_key_valid() {
		assert!(Flag::validate_key("new-checkout"));
		assert!(Flag::validate_key("checkout.new_flow"));
		assert!(Flag::validate_key("a"));
		assert!(Flag::validate_key("2fa"));
	}

	#[test]
	fn test_validate_key_invalid() {
		assert!(!Flag::validate_key(""));
		assert!(!Flag::validate_key("New"));
		assert!(!Flag::validate_key("-leading"));
		assert!(!Flag::validate_key("has space"));
		assert!(!Flag::validate_key(&"a".repeat(101)));
	}

	#[test]
	fn test_variant_value_untagged_json() {
		let values: Vec<VariantValue> =
			serde_json::from_str(r#"[true, 3, "blue", {"a": 1}]"#).unwrap();
		assert_eq!(values[0], VariantValue::Boolean(true));
		assert_eq!(values[1], VariantValue::Number(3.0));
		assert_eq!(values[2], VariantValue::String("blue".to_string()));
		assert_eq!(values[3], VariantValue::Json(serde_json::json!({"a": 1})));
	}

	#[test]
	fn test_matches_type() {
		assert!(VariantValue::Boolean(true).matches_type(FlagType::Boolean));
		assert!(!VariantValue::String("x".into()).matches_type(FlagType::Boolean));
		assert!(VariantValue::Number(1.5).matches_type(FlagType::Number));
		assert!(VariantValue::Boolean(false).matches_type(FlagType::Json));
	}

	#[test]
	fn test_variation_or_rollout_wire_shape() {
		let fixed = serde_json::to_value(VariationOrRollout::Variation(1)).unwrap();
		assert_eq!(fixed, serde_json::json!({"variation": 1}));
	}

	#[test]
	fn test_for_environment_restricts_states() {
		let state = FlagEnvironmentState::new(VariationOrRollout::Variation(0), 1);
		let flag = Flag::boolean("beta")
			.with_environment("dev", state.clone())
			.with_environment("prod", state);

		let prod = flag.for_environment("prod").unwrap();
		assert_eq!(prod.environments.len(), 1);
		assert!(prod.environment("prod").is_some());
		assert!(flag.for_environment("staging").is_none());
	}

	#[test]
	fn test_same_content_ignores_version() {
		let a = FlagEnvironmentState::new(VariationOrRollout::Variation(0), 1);
		let mut b = a.clone();
		b.version = 7;
		assert!(a.same_content(&b));
		b.enabled = true;
		assert!(!a.same_content(&b));
	}
}
