// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Public entry point: enumerate destinations and resolve device URIs.

use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tracing::{debug, instrument};

use printscout_core::config::DiscoveryConfig;
use printscout_core::error::Result;
use printscout_core::traits::{DestinationLister, NoLocalDestinations, NoPreferences, PreferenceStore};
use printscout_core::types::{DeliveryFlags, Destination, EnumFlags, PrinterType, TypeFilter};

use crate::dns_name::DiscoveryRef;
use crate::mdns::MdnsBackend;
use crate::provider::DiscoveryBackend;
use crate::resolver::Resolver;
use crate::scheduler::Scheduler;

/// Finds printers: local spooler queues merged with DNS-SD discoveries.
///
/// Holds no per-call state; every call owns its registry and provider
/// session, so one finder may serve concurrent calls.
pub struct DestinationFinder<L, S, B> {
    lister: L,
    prefs: S,
    backend: B,
    config: DiscoveryConfig,
}

impl DestinationFinder<NoLocalDestinations, NoPreferences, MdnsBackend> {
    /// Network discovery only, over mDNS, with default configuration.
    pub fn mdns_only() -> Result<Self> {
        Self::new(
            NoLocalDestinations,
            NoPreferences,
            MdnsBackend::new(),
            DiscoveryConfig::default(),
        )
    }
}

impl<L, S, B> DestinationFinder<L, S, B>
where
    L: DestinationLister,
    S: PreferenceStore,
    B: DiscoveryBackend,
{
    /// Fails with [`ScoutError::Config`](printscout_core::error::ScoutError::Config) when `config` does not validate.
    pub fn new(lister: L, prefs: S, backend: B, config: DiscoveryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            lister,
            prefs,
            backend,
            config,
        })
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Stream every destination passing the `(wanted, mask)` filter to
    /// `callback`, local ones first.
    ///
    /// `timeout` of `None` is unbounded; `Some(Duration::ZERO)` lists local
    /// destinations only.  Returning `false` from `callback` stops the call.
    /// Only a discovery transport failure is an error.
    pub fn enumerate_destinations<F>(
        &self,
        flags: EnumFlags,
        timeout: Option<Duration>,
        cancel: &AtomicBool,
        wanted: PrinterType,
        mask: PrinterType,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(DeliveryFlags, &Destination) -> bool,
    {
        debug!(flags = flags.bits(), "enumeration requested");
        Scheduler::new(&self.backend, &self.config).enumerate(
            &self.lister,
            &self.prefs,
            TypeFilter::new(wanted, mask),
            timeout,
            cancel,
            callback,
        )
    }

    /// Collect every destination a full enumeration delivers.  Removals
    /// drop earlier additions of the same destination.
    pub fn destinations(
        &self,
        timeout: Option<Duration>,
        cancel: &AtomicBool,
        wanted: PrinterType,
        mask: PrinterType,
    ) -> Result<Vec<Destination>> {
        let mut found: Vec<Destination> = Vec::new();
        self.enumerate_destinations(EnumFlags::empty(), timeout, cancel, wanted, mask, |flags, dest| {
            if flags.contains(DeliveryFlags::REMOVED) {
                found.retain(|d| d.name != dest.name || d.instance != dest.instance);
            } else {
                found.push(dest.clone());
            }
            true
        })?;
        Ok(found)
    }

    /// Connectable URI for `destination`.
    ///
    /// A `device-uri` that is not a discovery reference is returned as is.
    /// A fax destination (`printer-type` has the fax bit) asks for the
    /// fax-out resource.  `Ok(None)` means no device URI, not found, timed
    /// out, or canceled.
    #[instrument(skip_all, fields(destination = %destination))]
    pub fn resolve_device_uri(
        &self,
        destination: &Destination,
        timeout: Option<Duration>,
        cancel: &AtomicBool,
        progress: &mut dyn FnMut(DeliveryFlags, &Destination) -> bool,
    ) -> Result<Option<String>> {
        let Some(uri) = destination.device_uri() else {
            return Ok(None);
        };
        if !DiscoveryRef::is_discovery_uri(uri) {
            return Ok(Some(uri.to_string()));
        }

        let fax = destination.printer_type().contains(PrinterType::FAX);
        self.resolve(uri, fax, timeout, cancel, &mut |flags: DeliveryFlags| progress(flags, destination))
    }

    /// Resolve a bare discovery reference.
    pub fn resolve(
        &self,
        reference: &str,
        fax: bool,
        timeout: Option<Duration>,
        cancel: &AtomicBool,
        progress: &mut dyn FnMut(DeliveryFlags) -> bool,
    ) -> Result<Option<String>> {
        Resolver::new(&self.backend, &self.config).resolve(reference, fax, timeout, cancel, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printscout_core::error::ScoutError;
    use printscout_core::types::keys;

    use crate::dns_name::{ServiceCategory, ServiceRef};
    use crate::fake::{FakeBackend, answer};
    use crate::provider::BrowseScope;
    use crate::txt::encode_txt;

    fn finder(backend: FakeBackend) -> DestinationFinder<NoLocalDestinations, NoPreferences, FakeBackend> {
        let config = DiscoveryConfig {
            poll_quantum_ms: 20,
            settle_ms: 200,
            ..Default::default()
        };
        DestinationFinder::new(NoLocalDestinations, NoPreferences, backend, config).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = DiscoveryConfig {
            poll_quantum_ms: 0,
            ..Default::default()
        };
        let err = DestinationFinder::new(NoLocalDestinations, NoPreferences, FakeBackend::new(), config)
            .err()
            .unwrap();
        assert!(matches!(err, ScoutError::Config(_)));
    }

    #[test]
    fn collected_destinations_drop_superseded_entries() {
        let plain = ServiceRef::new("Lab", "_ipp._tcp", "local.");
        let secure = ServiceRef::new("Lab", "_ipps._tcp", "local.");
        let pdf = encode_txt([("pdl", "application/pdf")]);
        let backend = FakeBackend::new()
            .sighting(0, ServiceCategory::Plain, BrowseScope::Everywhere, plain.clone())
            .sighting(80, ServiceCategory::Secure, BrowseScope::Everywhere, secure.clone())
            .txt(&plain, 5, pdf.clone())
            .txt(&secure, 5, pdf);

        let cancel = AtomicBool::new(false);
        let found = finder(backend)
            .destinations(Some(Duration::from_secs(3)), &cancel, PrinterType::empty(), PrinterType::empty())
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].device_uri(), Some("dnssd://Lab._ipps._tcp.local./"));
    }

    #[test]
    fn non_discovery_uri_passes_through() {
        let backend = FakeBackend::new();
        let ledger = backend.ledger();
        let finder = finder(backend);
        let dest = Destination::new("usb").with_option(keys::DEVICE_URI, "usb://Acme/Laser?serial=42");
        let cancel = AtomicBool::new(false);
        let uri = finder
            .resolve_device_uri(&dest, None, &cancel, &mut |_, _| true)
            .unwrap();
        assert_eq!(uri.as_deref(), Some("usb://Acme/Laser?serial=42"));

        let bare = Destination::new("nothing");
        assert_eq!(finder.resolve_device_uri(&bare, None, &cancel, &mut |_, _| true).unwrap(), None);
        assert_eq!(ledger.lock().unwrap().opened_sessions, 0);
    }

    #[test]
    fn fax_bit_selects_faxout() {
        let backend = FakeBackend::new().resolve_answer(
            "Office MFP",
            "local.",
            5,
            Ok(answer("mfp.local.", 631, Vec::new())),
        );
        let fax_type = (PrinterType::FAX | PrinterType::REMOTE).bits().to_string();
        let dest = Destination::new("Office_MFP")
            .with_option(keys::DEVICE_URI, "dnssd://Office%20MFP._ipp._tcp.local./")
            .with_option(keys::PRINTER_TYPE, fax_type);

        let cancel = AtomicBool::new(false);
        let mut progress = Vec::new();
        let uri = finder(backend)
            .resolve_device_uri(&dest, Some(Duration::from_secs(2)), &cancel, &mut |flags, d| {
                assert_eq!(d.name, "Office_MFP");
                progress.push(flags);
                true
            })
            .unwrap();
        assert_eq!(uri.as_deref(), Some("ipp://mfp.local:631/ipp/faxout"));
        assert!(progress.iter().all(|f| *f == DeliveryFlags::RESOLVING));
    }
}
