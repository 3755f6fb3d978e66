// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exposure tracking for flag evaluations.
//!
//! An [`ExposureHook`] sees every value the client serves, which is what an
//! experiment pipeline needs to join exposures against outcomes.
//!
//! # Example
//!
//! ```ignore
//! use vane_flags::{ExposureHook, FlagExposure, FlagsClient};
//!
//! struct Recorder(tokio::sync::mpsc::UnboundedSender<FlagExposure>);
//!
//! impl ExposureHook for Recorder {
//!     fn on_flag_evaluated(&self, exposure: &FlagExposure) {
//!         let _ = self.0.send(exposure.clone());
//!     }
//! }
//!
//! let client = FlagsClient::builder()
//!     .project("shop")
//!     .environment("prod")
//!     .exposure_hook(Recorder(tx))
//!     .build()
//!     .await?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vane_flags_core::{EvaluationReason, EvaluationResult, VariantValue};

/// One served flag value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagExposure {
	pub flag_key: String,
	pub value: VariantValue,
	/// `None` when the caller default was served.
	pub variation_index: Option<usize>,
	pub reason: EvaluationReason,
	pub rule_id: Option<String>,
	/// Key of the evaluated context; empty for anonymous contexts.
	pub context_key: String,
	/// Snapshot the value was computed from, if one was loaded.
	pub snapshot_version: Option<u64>,
	pub timestamp: DateTime<Utc>,
}

impl FlagExposure {
	pub fn from_result(
		result: &EvaluationResult,
		context_key: impl Into<String>,
		snapshot_version: Option<u64>,
	) -> Self {
		Self {
			flag_key: result.flag_key.clone(),
			value: result.value.clone(),
			variation_index: result.variation_index,
			reason: result.reason,
			rule_id: result.rule_id.clone(),
			context_key: context_key.into(),
			snapshot_version,
			timestamp: Utc::now(),
		}
	}

	/// Event properties in the `$feature_flag_called` shape.
	pub fn to_event_properties(&self) -> serde_json::Value {
		serde_json::json!({
			"$feature_flag": self.flag_key,
			"$feature_flag_response": self.value.to_json(),
			"$feature_flag_reason": self.reason.to_string(),
		})
	}
}

/// Receives every evaluation the client performs.
///
/// Called on the evaluation path, so implementations must return quickly;
/// queue the exposure and ship it from elsewhere.
pub trait ExposureHook: Send + Sync + 'static {
	fn on_flag_evaluated(&self, exposure: &FlagExposure);
}

pub type SharedExposureHook = Arc<dyn ExposureHook>;

/// Discards every exposure.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpExposureHook;

impl ExposureHook for NoOpExposureHook {
	fn on_flag_evaluated(&self, _exposure: &FlagExposure) {}
}
