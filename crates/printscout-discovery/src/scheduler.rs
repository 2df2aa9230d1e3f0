// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Enumeration scheduler.
//
// One call runs a local phase (spooler listing plus default selection) and,
// unless skipped, a network phase: a single-threaded loop that waits on the
// provider for at most one polling quantum, feeds sightings into the
// registry, keeps exactly one TXT query in flight per new device, and hands
// newly active devices to the caller.  Every provider handle is released on
// every exit path.

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use printscout_core::config::DiscoveryConfig;
use printscout_core::error::{Result, ScoutError};
use printscout_core::traits::{DestinationLister, PreferenceStore};
use printscout_core::types::{DeliveryFlags, Destination, TypeFilter};

use crate::deadline::{self, Deadline};
use crate::dns_name::ServiceCategory;
use crate::local::collect_local;
use crate::provider::{
    BrowseChange, BrowseScope, DiscoveryBackend, DiscoveryProvider, Handle, ProviderEvent,
};
use crate::registry::{Device, DeviceRegistry, Sighting};

/// Provider session plus the registry whose queries it carries.  Dropping
/// it releases every browse and outstanding query.
struct Session<P: DiscoveryProvider> {
    provider: P,
    registry: DeviceRegistry,
    browses: Vec<(Handle, BrowseScope)>,
}

impl<P: DiscoveryProvider> Drop for Session<P> {
    fn drop(&mut self) {
        for handle in self.registry.outstanding_queries() {
            self.provider.release(handle);
        }
        for (handle, _) in self.browses.drain(..) {
            self.provider.release(handle);
        }
        debug!(devices = self.registry.len(), "discovery session closed");
    }
}

enum Flow {
    Continue,
    Stop,
}

/// Drives one enumeration against a discovery backend.
pub struct Scheduler<'a, B: DiscoveryBackend> {
    backend: &'a B,
    config: &'a DiscoveryConfig,
}

impl<'a, B: DiscoveryBackend> Scheduler<'a, B> {
    pub fn new(backend: &'a B, config: &'a DiscoveryConfig) -> Self {
        Self { backend, config }
    }

    /// Enumerate local and discovered destinations.
    ///
    /// `timeout` of `None` is unbounded.  Returns `Ok` on timeout,
    /// cancellation and callback stop; only a transport failure is an error.
    #[instrument(skip_all, fields(timeout = ?timeout))]
    pub fn enumerate<L, S, F>(
        &self,
        lister: &L,
        prefs: &S,
        filter: TypeFilter,
        timeout: Option<Duration>,
        cancel: &AtomicBool,
        mut callback: F,
    ) -> Result<()>
    where
        L: DestinationLister + ?Sized,
        S: PreferenceStore + ?Sized,
        F: FnMut(DeliveryFlags, &Destination) -> bool,
    {
        let deadline = Deadline::after(timeout);
        let mut registry = DeviceRegistry::new(self.config.max_name_length);

        let locals = collect_local(lister, prefs, &filter);
        info!(count = locals.len(), "local destinations listed");
        for (i, dest) in locals.iter().enumerate() {
            registry.adopt_local(dest);
            let flags = if i + 1 < locals.len() {
                DeliveryFlags::MORE
            } else {
                DeliveryFlags::empty()
            };
            if !callback(flags, dest) {
                debug!("caller stopped during local phase");
                return Ok(());
            }
        }

        if filter.excludes_discovered() {
            debug!("filter excludes discovered printers, skipping network phase");
            return Ok(());
        }
        if filter.local_only() && !locals.is_empty() {
            debug!("local-only filter satisfied, skipping network phase");
            return Ok(());
        }
        if timeout == Some(Duration::ZERO) {
            return Ok(());
        }

        let mut session = Session {
            provider: self.backend.open()?,
            registry,
            browses: Vec::new(),
        };
        self.start_browses(&mut session)?;
        self.network_loop(&mut session, &filter, &deadline, cancel, &mut callback)
    }

    fn start_browses<P: DiscoveryProvider>(&self, session: &mut Session<P>) -> Result<()> {
        let mut categories = vec![ServiceCategory::Plain];
        if self.config.secure_transport {
            categories.push(ServiceCategory::Secure);
        }
        for category in categories {
            for scope in [BrowseScope::Everywhere, BrowseScope::ThisHost] {
                let handle = session.provider.browse(category, scope)?;
                debug!(%category, ?scope, %handle, "browse started");
                session.browses.push((handle, scope));
            }
        }
        Ok(())
    }

    fn network_loop<P, F>(
        &self,
        session: &mut Session<P>,
        filter: &TypeFilter,
        deadline: &Deadline,
        cancel: &AtomicBool,
        callback: &mut F,
    ) -> Result<()>
    where
        P: DiscoveryProvider,
        F: FnMut(DeliveryFlags, &Destination) -> bool,
    {
        let started = Instant::now();

        loop {
            if let Some(reason) = deadline::check(cancel, deadline) {
                info!(?reason, devices = session.registry.len(), "enumeration ended early");
                return Ok(());
            }

            let wait = deadline.next_wait(self.config.poll_quantum());
            let events = session.provider.run_once(wait)?;

            for event in events {
                match event {
                    ProviderEvent::Browse { handle, change: BrowseChange::Added, service } => {
                        let this_host = session
                            .browses
                            .iter()
                            .any(|&(h, scope)| h == handle && scope == BrowseScope::ThisHost);
                        match session.registry.sight(&service, this_host) {
                            Sighting::Ignored | Sighting::Unchanged(_) | Sighting::Added(_) => {}
                            Sighting::Suppressed { removed, .. } => {
                                if let Some(stale) = removed {
                                    info!(name = %stale, "withdrawing destination hosted on this machine");
                                    if !callback(DeliveryFlags::REMOVED, &stale) {
                                        return Ok(());
                                    }
                                }
                            }
                            Sighting::Improved { removed, released, .. } => {
                                if let Some(handle) = released {
                                    session.provider.release(handle);
                                }
                                if let Some(stale) = removed {
                                    info!(name = %stale, "withdrawing superseded destination");
                                    if !callback(DeliveryFlags::REMOVED, &stale) {
                                        return Ok(());
                                    }
                                }
                            }
                        }
                    }
                    ProviderEvent::Browse { change: BrowseChange::Removed, service, .. } => {
                        debug!(service = %service, "service withdrawn");
                    }
                    ProviderEvent::BrowseFailed { handle, reason } => {
                        warn!(%handle, reason = %reason, "browse session failed");
                        return Err(ScoutError::Browse(reason));
                    }
                    ProviderEvent::Query { handle, result } => {
                        if let Some(id) = session.registry.device_for_query(handle) {
                            let result = result.as_deref().map_err(String::as_str);
                            session.registry.classify(
                                id,
                                result,
                                &self.config.document_formats,
                                filter,
                            );
                        }
                        session.provider.release(handle);
                    }
                    ProviderEvent::Resolve { handle, .. } => {
                        session.provider.release(handle);
                    }
                }
            }

            if let Flow::Stop = self.dispatch_and_deliver(session, callback) {
                return Ok(());
            }

            let settled = session.registry.last_network_sighting().is_some_and(|last| {
                (Utc::now() - last)
                    .to_std()
                    .is_ok_and(|quiet| quiet >= self.config.settle())
            });
            if settled && session.registry.all_terminal() {
                info!(
                    devices = session.registry.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "every device classified"
                );
                return Ok(());
            }
        }
    }

    fn dispatch_and_deliver<P, F>(&self, session: &mut Session<P>, callback: &mut F) -> Flow
    where
        P: DiscoveryProvider,
        F: FnMut(DeliveryFlags, &Destination) -> bool,
    {
        for id in session.registry.awaiting_query() {
            let Some(full_name) = session.registry.get(id).map(Device::full_name) else {
                continue;
            };
            match session.provider.query(&full_name) {
                Ok(handle) => {
                    debug!(%handle, full_name = %full_name, "TXT query issued");
                    session.registry.mark_query_pending(id, handle);
                }
                Err(e) => {
                    warn!(full_name = %full_name, error = %e, "could not issue TXT query");
                    session.registry.mark_query_failed(id);
                }
            }
        }

        for dest in session.registry.take_deliverable() {
            info!(name = %dest, uri = dest.device_uri().unwrap_or_default(), "destination discovered");
            if !callback(DeliveryFlags::empty(), &dest) {
                debug!("caller stopped during network phase");
                return Flow::Stop;
            }
        }
        Flow::Continue
    }
}
