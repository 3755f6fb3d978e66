// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name under which the context key is visible to clauses when no attribute
/// of the same name is set.
pub const KEY_ATTRIBUTE: &str = "key";

/// Request-time description of who or what is being evaluated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
	/// Stable identifier used for bucketing, e.g. the acting user's id.
	pub key: String,
	#[serde(default)]
	pub attributes: HashMap<String, serde_json::Value>,
}

impl EvaluationContext {
	pub fn new(key: impl Into<String>) -> Self {
		Self {
			key: key.into(),
			attributes: HashMap::new(),
		}
	}

	pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
		self.attributes.insert(name.into(), value.into());
		self
	}

	pub fn has_key(&self) -> bool {
		!self.key.is_empty()
	}

	/// Looks up an attribute as a scalar.
	pub fn attribute(&self, name: &str) -> Option<Scalar<'_>> {
		match self.attributes.get(name) {
			Some(value) => Some(Scalar::from_json(value)),
			None if name == KEY_ATTRIBUTE && self.has_key() => Some(Scalar::Str(&self.key)),
			None => None,
		}
	}
}

/// Borrowed view of an attribute or operand for type-aware comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar<'a> {
	Str(&'a str),
	Number(&'a serde_json::Number),
	Bool(bool),
	Null,
	/// Arrays and objects; they never satisfy a comparison.
	Composite,
}

impl<'a> Scalar<'a> {
	pub fn from_json(value: &'a serde_json::Value) -> Self {
		match value {
			serde_json::Value::String(s) => Scalar::Str(s),
			serde_json::Value::Number(n) => Scalar::Number(n),
			serde_json::Value::Bool(b) => Scalar::Bool(*b),
			serde_json::Value::Null => Scalar::Null,
			_ => Scalar::Composite,
		}
	}

	/// Same-type equality. A string never equals a number.
	pub fn same_as(&self, other: &Scalar<'_>) -> bool {
		match (self, other) {
			(Scalar::Str(a), Scalar::Str(b)) => a == b,
			(Scalar::Number(a), Scalar::Number(b)) => numbers_equal(a, b),
			(Scalar::Bool(a), Scalar::Bool(b)) => a == b,
			(Scalar::Null, Scalar::Null) => true,
			_ => false,
		}
	}

	pub fn as_number(&self) -> Option<f64> {
		match self {
			Scalar::Number(n) => n.as_f64(),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&'a str> {
		match self {
			Scalar::Str(s) => Some(s),
			_ => None,
		}
	}
}

/// Integers compare exactly; anything involving a float compares as `f64`.
fn numbers_equal(a: &serde_json::Number, b: &serde_json::Number) -> bool {
	if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
		return a == b;
	}
	if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
		return a == b;
	}
	if a.is_f64() || b.is_f64() {
		return matches!((a.as_f64(), b.as_f64()), (Some(a), Some(b)) if a == b);
	}
	false
}
