// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use vane_flags_core::{
	Environment, FetchError, FetchOutcome, Flag, FlagEnvironmentState, FlagStore, Snapshot,
	SnapshotScope, VariantValue,
};

use crate::error::{FlagsServerError, Result};

/// Repository trait for flag store operations.
///
/// Every write is validated before it is applied, so snapshots built from a
/// repository only ever contain well-formed definitions.
#[async_trait]
pub trait FlagsRepository: Send + Sync {
	// Environment operations
	async fn create_environment(&self, project_key: &str, environment_key: &str)
		-> Result<Environment>;
	async fn list_environments(&self, project_key: &str) -> Result<Vec<Environment>>;

	// Flag operations
	async fn create_flag(&self, project_key: &str, flag: Flag) -> Result<Flag>;
	async fn get_flag(&self, project_key: &str, key: &str) -> Result<Option<Flag>>;
	async fn list_flags(&self, project_key: &str) -> Result<Vec<Flag>>;

	/// Replaces a flag's targeting in one environment.
	///
	/// When `expected_version` is set, the write only applies if the stored
	/// state still carries that version (`0` for "no state yet").
	async fn update_environment_state(
		&self,
		project_key: &str,
		key: &str,
		environment_key: &str,
		state: FlagEnvironmentState,
		expected_version: Option<u64>,
	) -> Result<FlagEnvironmentState>;

	async fn set_enabled(
		&self,
		project_key: &str,
		key: &str,
		environment_key: &str,
		enabled: bool,
	) -> Result<FlagEnvironmentState>;

	/// Replaces the variant list. Every environment's indices must still
	/// resolve against the new list.
	async fn update_variants(
		&self,
		project_key: &str,
		key: &str,
		variants: Vec<VariantValue>,
	) -> Result<Flag>;

	async fn delete_flag(&self, project_key: &str, key: &str) -> Result<bool>;

	/// Builds a consistent snapshot of one scope.
	async fn snapshot(&self, scope: &SnapshotScope) -> Result<Snapshot>;
}

#[derive(Debug, Default)]
struct ProjectState {
	environments: BTreeMap<String, Environment>,
	/// Scope revision per environment.
	revisions: HashMap<String, u64>,
	flags: BTreeMap<String, Flag>,
}

impl ProjectState {
	fn require_environment(&self, project_key: &str, environment_key: &str) -> Result<()> {
		if self.environments.contains_key(environment_key) {
			Ok(())
		} else {
			Err(FlagsServerError::EnvironmentNotFound {
				project_key: project_key.to_string(),
				environment_key: environment_key.to_string(),
			})
		}
	}

	/// Advances the scope revision and returns the new value.
	fn bump(&mut self, environment_key: &str) -> u64 {
		let revision = self.revisions.entry(environment_key.to_string()).or_insert(0);
		*revision += 1;
		*revision
	}

	fn revision(&self, environment_key: &str) -> u64 {
		self.revisions.get(environment_key).copied().unwrap_or(0)
	}
}

/// In-process flag store.
///
/// Each project + environment scope keeps a revision counter that every
/// mutation touching the scope advances. A flag environment state's `version`
/// is the scope revision that produced it, so it strictly increases and is
/// never taken from the caller.
#[derive(Debug, Default)]
pub struct InMemoryFlagsRepository {
	projects: RwLock<HashMap<String, ProjectState>>,
}

impl InMemoryFlagsRepository {
	pub fn new() -> Self {
		Self::default()
	}

	/// Current revision of a scope, or `None` if the environment is unknown.
	pub async fn revision(&self, scope: &SnapshotScope) -> Option<u64> {
		let projects = self.projects.read().await;
		let project = projects.get(&scope.project_key)?;
		project
			.environments
			.contains_key(&scope.environment_key)
			.then(|| project.revision(&scope.environment_key))
	}
}

fn flag_not_found(key: &str) -> FlagsServerError {
	FlagsServerError::FlagNotFound(key.to_string())
}

#[async_trait]
impl FlagsRepository for InMemoryFlagsRepository {
	#[instrument(skip(self))]
	async fn create_environment(
		&self,
		project_key: &str,
		environment_key: &str,
	) -> Result<Environment> {
		let environment = Environment::new(project_key, environment_key)?;

		let mut projects = self.projects.write().await;
		let project = projects.entry(project_key.to_string()).or_default();
		if project.environments.contains_key(environment_key) {
			return Err(FlagsServerError::DuplicateEnvironment(
				environment_key.to_string(),
			));
		}

		project
			.environments
			.insert(environment_key.to_string(), environment.clone());
		let revision = project.bump(environment_key);

		info!(revision, "environment created");
		Ok(environment)
	}

	#[instrument(skip(self))]
	async fn list_environments(&self, project_key: &str) -> Result<Vec<Environment>> {
		let projects = self.projects.read().await;
		Ok(projects
			.get(project_key)
			.map(|p| p.environments.values().cloned().collect())
			.unwrap_or_default())
	}

	#[instrument(skip(self, flag), fields(flag_key = %flag.key))]
	async fn create_flag(&self, project_key: &str, mut flag: Flag) -> Result<Flag> {
		flag.validate()?;

		let mut projects = self.projects.write().await;
		let unknown = ProjectState::default();
		let existing = projects.get(project_key).unwrap_or(&unknown);
		if existing.flags.contains_key(&flag.key) {
			return Err(FlagsServerError::DuplicateFlagKey(flag.key));
		}
		for environment_key in flag.environments.keys() {
			existing.require_environment(project_key, environment_key)?;
		}

		let project = projects.entry(project_key.to_string()).or_default();
		for (environment_key, state) in flag.environments.iter_mut() {
			state.version = project.bump(environment_key);
		}

		info!(environments = flag.environments.len(), "flag created");
		project.flags.insert(flag.key.clone(), flag.clone());
		Ok(flag)
	}

	#[instrument(skip(self))]
	async fn get_flag(&self, project_key: &str, key: &str) -> Result<Option<Flag>> {
		let projects = self.projects.read().await;
		Ok(projects.get(project_key).and_then(|p| p.flags.get(key).cloned()))
	}

	#[instrument(skip(self))]
	async fn list_flags(&self, project_key: &str) -> Result<Vec<Flag>> {
		let projects = self.projects.read().await;
		Ok(projects
			.get(project_key)
			.map(|p| p.flags.values().cloned().collect())
			.unwrap_or_default())
	}

	#[instrument(skip(self, state))]
	async fn update_environment_state(
		&self,
		project_key: &str,
		key: &str,
		environment_key: &str,
		mut state: FlagEnvironmentState,
		expected_version: Option<u64>,
	) -> Result<FlagEnvironmentState> {
		let mut projects = self.projects.write().await;
		let project = projects
			.get_mut(project_key)
			.ok_or_else(|| flag_not_found(key))?;
		project.require_environment(project_key, environment_key)?;

		let flag = project.flags.get(key).ok_or_else(|| flag_not_found(key))?;
		let actual = flag
			.environment(environment_key)
			.map(|s| s.version)
			.unwrap_or(0);
		if let Some(expected) = expected_version {
			if expected != actual {
				debug!(expected, actual, "rejecting stale write");
				return Err(FlagsServerError::VersionConflict {
					flag_key: key.to_string(),
					environment_key: environment_key.to_string(),
					expected,
					actual,
				});
			}
		}

		flag.validate_state(environment_key, &state)?;

		state.version = project.bump(environment_key);
		if let Some(flag) = project.flags.get_mut(key) {
			flag.environments
				.insert(environment_key.to_string(), state.clone());
		}

		info!(version = state.version, "environment state updated");
		Ok(state)
	}

	#[instrument(skip(self))]
	async fn set_enabled(
		&self,
		project_key: &str,
		key: &str,
		environment_key: &str,
		enabled: bool,
	) -> Result<FlagEnvironmentState> {
		let mut projects = self.projects.write().await;
		let project = projects
			.get_mut(project_key)
			.ok_or_else(|| flag_not_found(key))?;
		project.require_environment(project_key, environment_key)?;

		let revision = project.revision(environment_key) + 1;
		let flag = project.flags.get_mut(key).ok_or_else(|| flag_not_found(key))?;
		let state = flag
			.environments
			.get_mut(environment_key)
			.ok_or_else(|| FlagsServerError::EnvironmentNotFound {
				project_key: project_key.to_string(),
				environment_key: environment_key.to_string(),
			})?;
		state.enabled = enabled;
		state.version = revision;
		let state = state.clone();
		project.bump(environment_key);

		info!(version = state.version, "flag toggled");
		Ok(state)
	}

	#[instrument(skip(self, variants), fields(variants = variants.len()))]
	async fn update_variants(
		&self,
		project_key: &str,
		key: &str,
		variants: Vec<VariantValue>,
	) -> Result<Flag> {
		let mut projects = self.projects.write().await;
		let project = projects
			.get_mut(project_key)
			.ok_or_else(|| flag_not_found(key))?;
		let existing = project.flags.get(key).ok_or_else(|| flag_not_found(key))?;

		let mut updated = existing.clone();
		updated.variants = variants;
		updated.validate()?;

		let environments: Vec<String> = updated.environments.keys().cloned().collect();
		for environment_key in environments {
			let version = project.bump(&environment_key);
			if let Some(state) = updated.environments.get_mut(&environment_key) {
				state.version = version;
			}
		}

		info!("flag variants updated");
		project.flags.insert(key.to_string(), updated.clone());
		Ok(updated)
	}

	#[instrument(skip(self))]
	async fn delete_flag(&self, project_key: &str, key: &str) -> Result<bool> {
		let mut projects = self.projects.write().await;
		let Some(project) = projects.get_mut(project_key) else {
			return Ok(false);
		};
		let Some(flag) = project.flags.remove(key) else {
			return Ok(false);
		};

		for environment_key in flag.environments.keys() {
			project.bump(environment_key);
		}

		info!("flag deleted");
		Ok(true)
	}

	#[instrument(skip(self), fields(scope = %scope))]
	async fn snapshot(&self, scope: &SnapshotScope) -> Result<Snapshot> {
		let projects = self.projects.read().await;
		let project = projects
			.get(&scope.project_key)
			.ok_or_else(|| FlagsServerError::EnvironmentNotFound {
				project_key: scope.project_key.clone(),
				environment_key: scope.environment_key.clone(),
			})?;
		project.require_environment(&scope.project_key, &scope.environment_key)?;

		let flags = project
			.flags
			.values()
			.filter_map(|flag| flag.for_environment(&scope.environment_key));
		Ok(Snapshot::new(
			scope.clone(),
			project.revision(&scope.environment_key),
			flags,
		))
	}
}

#[async_trait]
impl FlagStore for InMemoryFlagsRepository {
	#[instrument(skip(self), fields(scope = %scope))]
	async fn fetch_snapshot(
		&self,
		scope: &SnapshotScope,
		if_version_newer_than: Option<u64>,
	) -> std::result::Result<FetchOutcome, FetchError> {
		if let Some(known) = if_version_newer_than {
			match self.revision(scope).await {
				Some(current) if current <= known => {
					debug!(current, known, "scope not modified");
					return Ok(FetchOutcome::NotModified);
				}
				Some(_) => {}
				None => return Err(FetchError::ScopeNotFound(scope.to_string())),
			}
		}

		let snapshot = self.snapshot(scope).await?;
		debug!(version = snapshot.version, flags = snapshot.len(), "snapshot built");
		Ok(FetchOutcome::Modified(snapshot))
	}
}
