// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Flag store for Vane feature flags.
//!
//! The store owns the authoritative flag definitions. Writes are validated
//! before they land and every mutation advances the revision of the scope it
//! touches, which lets clients fetch snapshots conditionally.
//!
//! # Architecture
//!
//! - `repository` - Versioned in-memory repository and its `FlagStore` impl
//! - `error` - Store error type
//!
//! # Example
//!
//! ```
//! use vane_server_flags::{FlagsRepository, InMemoryFlagsRepository};
//! use vane_flags_core::{Flag, FlagEnvironmentState, SnapshotScope, VariationOrRollout};
//!
//! # tokio_test::block_on(async {
//! let repo = InMemoryFlagsRepository::new();
//! repo.create_environment("shop", "prod").await?;
//!
//! let state = FlagEnvironmentState::new(VariationOrRollout::Variation(0), 1).with_enabled(true);
//! repo.create_flag("shop", Flag::boolean("new-checkout").with_environment("prod", state))
//!     .await?;
//!
//! let snapshot = repo.snapshot(&SnapshotScope::new("shop", "prod")).await?;
//! assert_eq!(snapshot.len(), 1);
//! # Ok::<(), vane_server_flags::FlagsServerError>(())
//! # }).unwrap();
//! ```

pub mod error;
pub mod repository;

pub use error::{FlagsServerError, Result};
pub use repository::{FlagsRepository, InMemoryFlagsRepository};
