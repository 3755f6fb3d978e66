// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration: defaults, TOML files and environment variables.
//!
//! Sources are merged in precedence order (defaults < file < environment) and
//! then builder overrides are applied on top before [`ClientConfigLayer::finalize`].

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, trace};
use vane_common_http::RetryConfig;
use vane_flags_core::SnapshotScope;

use crate::error::{FlagsClientError, Result};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VANE_FLAGS_";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
	Builder = 100,
}

/// A partial client configuration. `None` means "not set by this source".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfigLayer {
	pub base_url: Option<String>,
	pub sdk_key: Option<String>,
	pub project: Option<String>,
	pub environment: Option<String>,
	pub refresh_interval_secs: Option<u64>,
	pub request_timeout_secs: Option<u64>,
	pub init_timeout_secs: Option<u64>,
}

impl ClientConfigLayer {
	/// Overlays `other` on top of `self`.
	pub fn merge(&mut self, other: ClientConfigLayer) {
		overlay(&mut self.base_url, other.base_url);
		overlay(&mut self.sdk_key, other.sdk_key);
		overlay(&mut self.project, other.project);
		overlay(&mut self.environment, other.environment);
		overlay(&mut self.refresh_interval_secs, other.refresh_interval_secs);
		overlay(&mut self.request_timeout_secs, other.request_timeout_secs);
		overlay(&mut self.init_timeout_secs, other.init_timeout_secs);
	}

	/// Validates the merged layer and fills defaults.
	pub fn finalize(self) -> Result<ClientConfig> {
		let project = self
			.project
			.filter(|p| !p.trim().is_empty())
			.ok_or(FlagsClientError::MissingConfig("project"))?;
		let environment = self
			.environment
			.filter(|e| !e.trim().is_empty())
			.ok_or(FlagsClientError::MissingConfig("environment"))?;

		let base_url = match self.base_url {
			Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
				Some(url.trim_end_matches('/').to_string())
			}
			Some(url) => {
				return Err(FlagsClientError::InvalidConfig(format!(
					"base_url must be an http(s) URL, got {url:?}"
				)))
			}
			None => None,
		};
		if base_url.is_some() && self.sdk_key.as_deref().map_or(true, str::is_empty) {
			return Err(FlagsClientError::MissingConfig("sdk_key"));
		}

		let refresh_interval = match self.refresh_interval_secs {
			Some(0) => {
				return Err(FlagsClientError::InvalidConfig(
					"refresh_interval_secs must be greater than zero".to_string(),
				))
			}
			Some(secs) => Duration::from_secs(secs),
			None => DEFAULT_REFRESH_INTERVAL,
		};

		Ok(ClientConfig {
			base_url,
			sdk_key: self.sdk_key,
			scope: SnapshotScope::new(project, environment),
			refresh_interval,
			request_timeout: self
				.request_timeout_secs
				.map(Duration::from_secs)
				.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
			init_timeout: self
				.init_timeout_secs
				.map(Duration::from_secs)
				.unwrap_or(DEFAULT_INIT_TIMEOUT),
			retry_config: RetryConfig::default(),
		})
	}
}

fn overlay<T>(slot: &mut Option<T>, value: Option<T>) {
	if value.is_some() {
		*slot = value;
	}
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Flag store base URL; `None` when the caller supplies its own store.
	pub base_url: Option<String>,
	pub sdk_key: Option<String>,
	pub scope: SnapshotScope,
	pub refresh_interval: Duration,
	pub request_timeout: Duration,
	/// How long `build()` waits for the first snapshot.
	pub init_timeout: Duration,
	pub retry_config: RetryConfig,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ClientConfigLayer>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ClientConfigLayer> {
		Ok(ClientConfigLayer {
			refresh_interval_secs: Some(DEFAULT_REFRESH_INTERVAL.as_secs()),
			request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT.as_secs()),
			init_timeout_secs: Some(DEFAULT_INIT_TIMEOUT.as_secs()),
			..ClientConfigLayer::default()
		})
	}
}

/// TOML file configuration source. A missing file yields an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ClientConfigLayer> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ClientConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content =
			std::fs::read_to_string(&self.path).map_err(|e| FlagsClientError::ConfigFileRead {
				path: self.path.clone(),
				source: e,
			})?;

		let layer: ClientConfigLayer =
			toml::from_str(&content).map_err(|e| FlagsClientError::ConfigParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed client config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `VANE_FLAGS_<FIELD>`, e.g. `VANE_FLAGS_SDK_KEY`.
pub struct EnvSource;

impl EnvSource {
	/// Builds a layer from an arbitrary variable lookup.
	pub fn load_with<F>(lookup: F) -> Result<ClientConfigLayer>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |field: &str| lookup(&format!("{ENV_PREFIX}{field}")).filter(|v| !v.is_empty());
		let secs = |field: &str| -> Result<Option<u64>> {
			var(field)
				.map(|raw| {
					raw.trim().parse::<u64>().map_err(|_| {
						FlagsClientError::InvalidConfig(format!(
							"{ENV_PREFIX}{field} must be a whole number of seconds, got {raw:?}"
						))
					})
				})
				.transpose()
		};

		Ok(ClientConfigLayer {
			base_url: var("BASE_URL"),
			sdk_key: var("SDK_KEY"),
			project: var("PROJECT"),
			environment: var("ENVIRONMENT"),
			refresh_interval_secs: secs("REFRESH_INTERVAL_SECS")?,
			request_timeout_secs: secs("REQUEST_TIMEOUT_SECS")?,
			init_timeout_secs: secs("INIT_TIMEOUT_SECS")?,
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ClientConfigLayer> {
		debug!("loading environment variables");
		Self::load_with(|name| std::env::var(name).ok())
	}
}

/// A fixed layer, used for values set in code.
pub struct LayerSource {
	layer: ClientConfigLayer,
	precedence: Precedence,
}

impl LayerSource {
	/// Values set on the client builder; these win over every other source.
	pub fn overrides(layer: ClientConfigLayer) -> Self {
		Self {
			layer,
			precedence: Precedence::Builder,
		}
	}

	pub fn with_precedence(layer: ClientConfigLayer, precedence: Precedence) -> Self {
		Self { layer, precedence }
	}
}

impl ConfigSource for LayerSource {
	fn name(&self) -> &'static str {
		"in-code"
	}

	fn precedence(&self) -> Precedence {
		self.precedence
	}

	fn load(&self) -> Result<ClientConfigLayer> {
		Ok(self.layer.clone())
	}
}

/// Merges the given sources in precedence order.
pub fn load_layers(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ClientConfigLayer> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ClientConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}
	Ok(merged)
}
