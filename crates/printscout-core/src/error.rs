// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Printscout.

use thiserror::Error;

/// Top-level error type for all Printscout operations.
///
/// Only transport setup failures (`Discovery`, `Browse`) ever make an
/// enumeration fail.  Per-device trouble, timeouts and cancellation are
/// reported through the delivery stream, never through this type.
#[derive(Debug, Error)]
pub enum ScoutError {
    // -- Discovery transport --
    #[error("service discovery unavailable: {0}")]
    Discovery(String),

    #[error("browse session failed: {0}")]
    Browse(String),

    // -- Local spooler --
    #[error("destination listing failed: {0}")]
    Listing(String),

    // -- References --
    #[error("invalid discovery reference: {0}")]
    InvalidReference(String),

    // -- Configuration / persistence --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ScoutError>;
