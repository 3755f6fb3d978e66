// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FlagsError, Result};

/// A named target within a project, e.g. `dev` or `prod`.
///
/// Every flag carries an independent [`crate::FlagEnvironmentState`] per
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
	pub project_key: String,
	pub key: String,
	pub created_at: DateTime<Utc>,
}

impl Environment {
	pub fn new(project_key: impl Into<String>, key: impl Into<String>) -> Result<Self> {
		let key = key.into();
		if !Self::validate_name(&key) {
			return Err(FlagsError::InvalidEnvironmentName(key));
		}
		Ok(Self {
			project_key: project_key.into(),
			key,
			created_at: Utc::now(),
		})
	}

	/// Validates the environment name format.
	///
	/// Valid names:
	/// - 2-50 characters
	/// - Start with a lowercase letter
	/// - Contain only lowercase letters, digits, `_` and `-`
	pub fn validate_name(name: &str) -> bool {
		if name.len() < 2 || name.len() > 50 {
			return false;
		}

		let mut chars = name.chars();

		match chars.next() {
			Some(c) if c.is_ascii_lowercase() => {}
			_ => return false,
		}

		chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '-'))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_validate_name() {
		for ok in ["dev", "prod", "qa", "staging-eu", "test_env", "prod1"] {
			assert!(Environment::validate_name(ok), "{ok} should be valid");
		}
		for bad in ["", "d", "Dev", "1prod", "-dev", "prod env", "prod!"] {
			assert!(!Environment::validate_name(bad), "{bad} should be invalid");
		}
		assert!(!Environment::validate_name(&"a".repeat(51)));
	}

	#[test]
	fn test_new_rejects_invalid_name() {
		assert_eq!(
			Environment::new("shop", "PROD").unwrap_err(),
			FlagsError::InvalidEnvironmentName("PROD".to_string())
		);
		let env = Environment::new("shop", "prod").unwrap();
		assert_eq!(env.project_key, "shop");
	}

	proptest! {
		#[test]
		fn valid_names_accepted(name in "[a-z][a-z0-9_-]{1,49}") {
			prop_assert!(Environment::validate_name(&name));
		}

		#[test]
		fn uppercase_start_rejected(name in "[A-Z][a-z0-9_]{1,49}") {
			prop_assert!(!Environment::validate_name(&name));
		}
	}
}
