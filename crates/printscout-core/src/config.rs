// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};

/// Tunables for enumeration and resolution.
///
/// Durations are stored as milliseconds so the struct round-trips through
/// JSON without a custom (de)serializer; use the accessor methods to get
/// [`Duration`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Maximum wait per event-loop iteration (the polling quantum).
    pub poll_quantum_ms: u64,
    /// Resolver deadline used when the caller does not supply one.
    pub resolve_timeout_ms: u64,
    /// How long the resolver waits on the advertised domain before also
    /// asking the most-local scope.
    pub resolve_fallback_after_ms: u64,
    /// Quiet period with no new sightings before a fully classified
    /// registry ends the network phase.
    pub settle_ms: u64,
    /// Browse the secure (TLS) category alongside the plain one.
    pub secure_transport: bool,
    /// Destination name-length limit for generated queue names.
    pub max_name_length: usize,
    /// Document formats this environment can send; a device whose `pdl`
    /// lists none of these is incompatible.
    pub document_formats: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_quantum_ms: 250,
            resolve_timeout_ms: 90_000,
            resolve_fallback_after_ms: 2_500,
            settle_ms: 1_000,
            secure_transport: true,
            max_name_length: 127,
            document_formats: vec![
                "application/pdf".into(),
                "image/pwg-raster".into(),
                "image/urf".into(),
            ],
        }
    }
}

impl DiscoveryConfig {
    /// Load a configuration from a JSON file.  Missing keys keep their
    /// defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_quantum_ms == 0 {
            return Err(ScoutError::Config("poll_quantum_ms must be non-zero".into()));
        }
        if self.max_name_length == 0 {
            return Err(ScoutError::Config("max_name_length must be non-zero".into()));
        }
        if self.document_formats.is_empty() {
            return Err(ScoutError::Config(
                "document_formats must name at least one format".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_quantum(&self) -> Duration {
        Duration::from_millis(self.poll_quantum_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    pub fn resolve_fallback_after(&self) -> Duration {
        Duration::from_millis(self.resolve_fallback_after_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = DiscoveryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.resolve_timeout(), Duration::from_secs(90));
    }

    #[test]
    fn zero_quantum_rejected() {
        let config = DiscoveryConfig {
            poll_quantum_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ScoutError::Config(_))));
    }

    #[test]
    fn load_fills_missing_keys_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "poll_quantum_ms": 50, "secure_transport": false }}"#).unwrap();

        let config = DiscoveryConfig::load(file.path()).unwrap();
        assert_eq!(config.poll_quantum(), Duration::from_millis(50));
        assert!(!config.secure_transport);
        assert_eq!(config.max_name_length, 127);
        assert_eq!(config.document_formats.len(), 3);
    }

    #[test]
    fn load_rejects_empty_format_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "document_formats": [] }}"#).unwrap();
        assert!(DiscoveryConfig::load(file.path()).is_err());
    }
}
