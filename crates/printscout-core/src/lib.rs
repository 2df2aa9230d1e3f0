// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printscout: core types, errors, configuration, and collaborator traits
// shared across all crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::DiscoveryConfig;
pub use error::{Result, ScoutError};
pub use traits::{DestinationLister, NoLocalDestinations, NoPreferences, PreferenceStore};
pub use types::*;
