// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Destination lister backed by the local spooler's IPP interface.
//
// Sends CUPS-Get-Printers and turns every printer-attributes group of the
// response into a `Destination`: the name comes from `printer-name`, every
// other attribute becomes an option.  The engine calls listers
// synchronously, so each call spins a current-thread Tokio runtime for the
// duration of the request.

use ipp::prelude::*;
use tracing::{debug, error, instrument, warn};

use printscout_core::error::{Result, ScoutError};
use printscout_core::traits::DestinationLister;
use printscout_core::types::{Destination, PrinterType, TypeFilter};

/// Where the local spooler listens by default.
pub const DEFAULT_SPOOLER_URI: &str = "ipp://localhost:631/";

const PRINTER_NAME: &str = "printer-name";

/// Lists the queues of an IPP spooler.
///
/// Must not be called from inside a Tokio runtime; use
/// [`IppLister::fetch_printers`] directly from async code.
#[derive(Debug, Clone)]
pub struct IppLister {
    uri: Uri,
}

impl IppLister {
    pub fn new(uri: &str) -> Result<Self> {
        let parsed: Uri = uri
            .parse()
            .map_err(|e| ScoutError::Config(format!("invalid spooler URI '{uri}': {e}")))?;
        Ok(Self { uri: parsed })
    }

    /// A lister for the spooler on this host.
    pub fn local() -> Result<Self> {
        Self::new(DEFAULT_SPOOLER_URI)
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Every queue the spooler reports, unfiltered.
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub async fn fetch_printers(&self) -> Result<Vec<Destination>> {
        let operation = IppOperationBuilder::cups().get_printers();
        let client = AsyncIppClient::new(self.uri.clone());

        debug!("sending CUPS-Get-Printers");
        let response = client
            .send(operation)
            .await
            .map_err(|e| ScoutError::Listing(format!("CUPS-Get-Printers: {e}")))?;

        let code = response.header().status_code();
        if !code.is_success() {
            error!(status = ?code, "CUPS-Get-Printers failed");
            return Err(ScoutError::Listing(format!(
                "CUPS-Get-Printers returned status {code:?}"
            )));
        }

        let destinations: Vec<Destination> = printer_groups(response.attributes())
            .into_iter()
            .filter_map(destination_from_attributes)
            .collect();
        debug!(count = destinations.len(), "received spooler queues");
        Ok(destinations)
    }

    fn fetch_blocking(&self) -> Result<Vec<Destination>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.fetch_printers())
    }
}

impl DestinationLister for IppLister {
    fn list_destinations(&self, wanted: PrinterType, mask: PrinterType) -> Result<Vec<Destination>> {
        let filter = TypeFilter::new(wanted, mask);
        Ok(self
            .fetch_blocking()?
            .into_iter()
            .filter(|dest| filter.matches(dest.printer_type()))
            .collect())
    }

    fn default_destination(&self) -> Result<Option<String>> {
        let destinations = self.fetch_blocking()?;
        Ok(default_among(&destinations).map(|d| d.name.clone()))
    }
}

/// Each printer group as `(attribute, value)` pairs, sorted by attribute
/// name so option order does not depend on hash order.
fn printer_groups(attrs: &IppAttributes) -> Vec<Vec<(String, String)>> {
    attrs
        .groups_of(DelimiterTag::PrinterAttributes)
        .map(|group| {
            let mut pairs: Vec<(String, String)> = group
                .attributes()
                .iter()
                .map(|(name, attr)| (name.clone(), format!("{}", attr.value())))
                .collect();
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            pairs
        })
        .collect()
}

/// Build a destination from one printer's attributes.  Groups without a
/// usable `printer-name` are dropped.
fn destination_from_attributes(pairs: Vec<(String, String)>) -> Option<Destination> {
    let name = pairs
        .iter()
        .find(|(key, _)| key == PRINTER_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|name| !name.is_empty());
    let Some(name) = name else {
        warn!("spooler reported a printer without a name");
        return None;
    };

    let mut dest = Destination::new(name);
    for (key, value) in pairs {
        if key != PRINTER_NAME {
            dest.options.set(key, value);
        }
    }
    dest.is_default = dest.printer_type().contains(PrinterType::DEFAULT);
    Some(dest)
}

fn default_among(destinations: &[Destination]) -> Option<&Destination> {
    destinations.iter().find(|d| d.is_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use printscout_core::types::keys;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn printer_name_becomes_the_destination_name() {
        let dest = destination_from_attributes(pairs(&[
            ("device-uri", "socket://10.0.0.7"),
            ("printer-info", "Second floor laser"),
            ("printer-name", "Laser"),
            ("printer-type", "4"),
        ]))
        .unwrap();

        assert_eq!(dest.name, "Laser");
        assert!(dest.option(PRINTER_NAME).is_none());
        assert_eq!(dest.device_uri(), Some("socket://10.0.0.7"));
        assert_eq!(dest.option(keys::PRINTER_INFO), Some("Second floor laser"));
        assert_eq!(dest.printer_type(), PrinterType::BW);
        assert!(!dest.is_default);
    }

    #[test]
    fn unnamed_printers_are_dropped() {
        assert!(destination_from_attributes(pairs(&[("printer-type", "4")])).is_none());
        assert!(destination_from_attributes(pairs(&[("printer-name", "  ")])).is_none());
    }

    #[test]
    fn default_bit_marks_the_default() {
        let default_type = (PrinterType::DEFAULT | PrinterType::COLOR).bits().to_string();
        let destinations: Vec<Destination> = vec![
            pairs(&[("printer-name", "Draft"), ("printer-type", "4")]),
            pairs(&[("printer-name", "Photo"), ("printer-type", default_type.as_str())]),
        ]
        .into_iter()
        .filter_map(destination_from_attributes)
        .collect();

        let default = default_among(&destinations).unwrap();
        assert_eq!(default.name, "Photo");
        assert!(default.is_default);
    }

    #[test]
    fn no_default_without_the_bit() {
        let destinations: Vec<Destination> = vec![pairs(&[("printer-name", "Draft")])]
            .into_iter()
            .filter_map(destination_from_attributes)
            .collect();
        assert!(default_among(&destinations).is_none());
    }

    #[test]
    fn rejects_unparseable_uri() {
        let err = IppLister::new("not a uri").unwrap_err();
        assert!(matches!(err, ScoutError::Config(_)));
    }

    #[test]
    fn local_lister_targets_localhost() {
        let lister = IppLister::local().unwrap();
        assert_eq!(lister.uri().host(), Some("localhost"));
        assert_eq!(lister.uri().port_u16(), Some(631));
    }
}
