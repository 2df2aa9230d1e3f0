// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Collaborator traits at the seam between the discovery engine and the
// local print system.
//
// The engine never talks to a spooler or reads preference files directly;
// it goes through these traits so hosts can plug in whatever listing and
// preference backends they have.  `printscout-spooler` ships IPP and
// lpoptions implementations.

use crate::error::Result;
use crate::types::{DestRef, Destination, PrinterType, SavedDestination};

/// Lists destinations already configured on the local spooler.
///
/// Calls are synchronous and may block.
pub trait DestinationLister {
    /// Return every configured destination whose `printer-type` passes the
    /// `(wanted, mask)` filter.
    fn list_destinations(&self, wanted: PrinterType, mask: PrinterType) -> Result<Vec<Destination>>;

    /// The spooler's own idea of the default destination, if any.
    fn default_destination(&self) -> Result<Option<String>>;
}

/// Read-only access to default-destination preferences.
pub trait PreferenceStore {
    /// The default chosen by the current user (environment or profile).
    fn user_default(&self) -> Option<DestRef>;

    /// The system-wide default preference.
    fn system_default(&self) -> Option<DestRef>;

    /// Destinations and instances saved with options, system entries
    /// first and user entries after them.
    fn saved_destinations(&self) -> Vec<SavedDestination> {
        Vec::new()
    }
}

/// A lister with no local queues, for hosts without a spooler.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocalDestinations;

impl DestinationLister for NoLocalDestinations {
    fn list_destinations(&self, _wanted: PrinterType, _mask: PrinterType) -> Result<Vec<Destination>> {
        Ok(Vec::new())
    }

    fn default_destination(&self) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A preference store with no preferences.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPreferences;

impl PreferenceStore for NoPreferences {
    fn user_default(&self) -> Option<DestRef> {
        None
    }

    fn system_default(&self) -> Option<DestRef> {
        None
    }
}
