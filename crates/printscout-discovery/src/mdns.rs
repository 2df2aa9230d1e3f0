// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Discovery backend on top of the `mdns-sd` crate.
//
// `mdns-sd` browses and resolves in one step, so TXT queries and resolves
// are answered from the services its browse listeners have already
// resolved.  Only the `local.` domain is reachable.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, info, warn};

use printscout_core::error::{Result, ScoutError};

use crate::dns_name::{LOCAL_DOMAIN, ServiceCategory, ServiceRef};
use crate::provider::{
    BrowseChange, BrowseScope, DiscoveryBackend, DiscoveryProvider, Handle, ProviderEvent,
    ResolvedService,
};

/// Opens one `mdns-sd` daemon per enumeration or resolve call, so
/// concurrent calls never share browse state.
#[derive(Debug, Default, Clone, Copy)]
pub struct MdnsBackend;

impl MdnsBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DiscoveryBackend for MdnsBackend {
    type Provider = MdnsProvider;

    fn open(&self) -> Result<MdnsProvider> {
        MdnsProvider::new()
    }
}

/// Non-loopback addresses of every interface on this host.
fn this_host_addresses() -> Vec<IpAddr> {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .map(|iface| iface.ip())
            .collect(),
        Err(e) => {
            warn!(error = %e, "cannot list network interfaces");
            Vec::new()
        }
    }
}

fn service_type(category: ServiceCategory) -> String {
    format!("{}.{LOCAL_DOMAIN}", category.reg_type())
}

/// `Instance Name._ipp._tcp.local.` with the daemon's service type.
fn service_from_fullname(service_type: &str, fullname: &str) -> Option<ServiceRef> {
    let name = fullname.strip_suffix(service_type)?.strip_suffix('.')?;
    let reg_type = service_type.strip_suffix(LOCAL_DOMAIN)?.trim_end_matches('.');
    Some(ServiceRef::new(name, reg_type, LOCAL_DOMAIN))
}

/// Cache key: the unescaped full name, lowercased.
fn cache_key(service: &ServiceRef) -> String {
    service.to_string().to_ascii_lowercase()
}

/// Re-encode a resolved service's TXT properties as a length-prefixed blob.
fn txt_blob(info: &ServiceInfo) -> Vec<u8> {
    let mut blob = Vec::new();
    for property in info.get_properties().iter() {
        let mut entry = property.key().as_bytes().to_vec();
        if let Some(value) = property.val() {
            entry.push(b'=');
            entry.extend_from_slice(value);
        }
        if let Ok(len) = u8::try_from(entry.len()) {
            blob.push(len);
            blob.extend_from_slice(&entry);
        }
    }
    blob
}

fn resolved(info: &ServiceInfo) -> ResolvedService {
    ResolvedService {
        host_name: info.get_hostname().to_string(),
        port: info.get_port(),
        txt: txt_blob(info),
        addresses: info.get_addresses().iter().copied().collect(),
    }
}

/// Browse handles, resolved-service cache and requests waiting on it.
#[derive(Debug, Default)]
struct Tracker {
    browses: HashMap<ServiceCategory, Vec<(Handle, BrowseScope)>>,
    cache: HashMap<String, ServiceInfo>,
    queries: Vec<(Handle, String)>,
    resolves: Vec<(Handle, String)>,
    this_host: Vec<IpAddr>,
}

/// One call's session on its own `ServiceDaemon`.
pub struct MdnsProvider {
    daemon: ServiceDaemon,
    tx: Sender<(ServiceCategory, ServiceEvent)>,
    rx: Receiver<(ServiceCategory, ServiceEvent)>,
    tracker: Tracker,
    ready: Vec<ProviderEvent>,
    next_handle: u64,
}

impl MdnsProvider {
    fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| ScoutError::Discovery(format!("failed to start mDNS daemon: {e}")))?;
        let (tx, rx) = mpsc::channel();
        Ok(Self {
            daemon,
            tx,
            rx,
            tracker: Tracker {
                this_host: this_host_addresses(),
                ..Default::default()
            },
            ready: Vec::new(),
            next_handle: 1,
        })
    }

    fn allocate(&mut self) -> Handle {
        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        handle
    }

    /// Drain one daemon browse receiver on a named thread, forwarding every
    /// event into the provider's channel.
    fn spawn_listener(
        category: ServiceCategory,
        receiver: mdns_sd::Receiver<ServiceEvent>,
        tx: Sender<(ServiceCategory, ServiceEvent)>,
    ) -> Result<()> {
        std::thread::Builder::new()
            .name(format!("mdns-{}", category.reg_type()))
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    let stopped = matches!(event, ServiceEvent::SearchStopped(_));
                    if tx.send((category, event)).is_err() || stopped {
                        break;
                    }
                }
            })
            .map(|_| ())
            .map_err(|e| ScoutError::Discovery(format!("failed to spawn mDNS listener: {e}")))
    }
}

impl Tracker {
    fn is_this_host(&self, info: &ServiceInfo) -> bool {
        info.get_addresses()
            .iter()
            .any(|ip| ip.is_loopback() || self.this_host.contains(ip))
    }

    fn scoped(&self, category: ServiceCategory, scope: BrowseScope) -> Vec<Handle> {
        self.browses
            .get(&category)
            .map(|handles| {
                handles
                    .iter()
                    .filter(|(_, s)| *s == scope)
                    .map(|(h, _)| *h)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn handle_event(&mut self, category: ServiceCategory, event: ServiceEvent, out: &mut Vec<ProviderEvent>) {
        match event {
            ServiceEvent::SearchStarted(stype) => {
                debug!(service_type = %stype, "mDNS search started");
            }
            ServiceEvent::ServiceFound(stype, fullname) => {
                let Some(service) = service_from_fullname(&stype, &fullname) else {
                    debug!(name = %fullname, "unparseable service name");
                    return;
                };
                for handle in self.scoped(category, BrowseScope::Everywhere) {
                    out.push(ProviderEvent::Browse {
                        handle,
                        change: BrowseChange::Added,
                        service: service.clone(),
                    });
                }
            }
            ServiceEvent::ServiceResolved(info) => {
                let Some(service) = service_from_fullname(info.get_type(), info.get_fullname())
                else {
                    return;
                };
                let key = cache_key(&service);
                debug!(name = %service, host = %info.get_hostname(), "service resolved");

                // The this-host sighting must land before the TXT answer so
                // the device is classified as local.
                if self.is_this_host(&info) {
                    for handle in self.scoped(category, BrowseScope::ThisHost) {
                        out.push(ProviderEvent::Browse {
                            handle,
                            change: BrowseChange::Added,
                            service: service.clone(),
                        });
                    }
                }
                for (handle, _) in self.queries.iter().filter(|(_, k)| *k == key) {
                    out.push(ProviderEvent::Query {
                        handle: *handle,
                        result: Ok(txt_blob(&info)),
                    });
                }
                self.queries.retain(|(_, k)| *k != key);
                for (handle, _) in self.resolves.iter().filter(|(_, k)| *k == key) {
                    out.push(ProviderEvent::Resolve {
                        handle: *handle,
                        result: Ok(resolved(&info)),
                    });
                }
                self.cache.insert(key, info);
            }
            ServiceEvent::ServiceRemoved(stype, fullname) => {
                let Some(service) = service_from_fullname(&stype, &fullname) else {
                    return;
                };
                self.cache.remove(&cache_key(&service));
                for handle in self.scoped(category, BrowseScope::Everywhere) {
                    out.push(ProviderEvent::Browse {
                        handle,
                        change: BrowseChange::Removed,
                        service: service.clone(),
                    });
                }
            }
            ServiceEvent::SearchStopped(stype) => {
                debug!(service_type = %stype, "mDNS search stopped");
                let failed: Vec<Handle> = self
                    .browses
                    .get(&category)
                    .map(|handles| handles.iter().map(|(h, _)| *h).collect())
                    .unwrap_or_default();
                for handle in failed {
                    out.push(ProviderEvent::BrowseFailed {
                        handle,
                        reason: format!("mDNS search for {stype} stopped"),
                    });
                }
            }
        }
    }
}

impl DiscoveryProvider for MdnsProvider {
    fn browse(&mut self, category: ServiceCategory, scope: BrowseScope) -> Result<Handle> {
        if !self.tracker.browses.contains_key(&category) {
            let stype = service_type(category);
            let receiver = self
                .daemon
                .browse(&stype)
                .map_err(|e| ScoutError::Discovery(format!("browse {stype}: {e}")))?;
            Self::spawn_listener(category, receiver, self.tx.clone())?;
            info!(service_type = %stype, "mDNS browse started");
        }
        let handle = self.allocate();
        self.tracker.browses.entry(category).or_default().push((handle, scope));
        Ok(handle)
    }

    fn query(&mut self, full_name: &str) -> Result<Handle> {
        let handle = self.allocate();
        let Some(service) = ServiceRef::from_full_name(full_name) else {
            self.ready.push(ProviderEvent::Query {
                handle,
                result: Err(format!("malformed service name {full_name}")),
            });
            return Ok(handle);
        };

        let key = cache_key(&service);
        match self.tracker.cache.get(&key) {
            Some(info) => self.ready.push(ProviderEvent::Query {
                handle,
                result: Ok(txt_blob(info)),
            }),
            None => self.tracker.queries.push((handle, key)),
        }
        Ok(handle)
    }

    fn resolve(&mut self, service: &ServiceRef) -> Result<Handle> {
        if !service.is_local() {
            return Err(ScoutError::Discovery(format!(
                "mDNS cannot reach domain {}",
                service.domain
            )));
        }
        let handle = self.allocate();
        let key = cache_key(service);
        match self.tracker.cache.get(&key) {
            Some(info) => self.ready.push(ProviderEvent::Resolve {
                handle,
                result: Ok(resolved(info)),
            }),
            None => {
                // Resolution needs a browse of the service's type to be running.
                if let Some(category) = service.category() {
                    if !self.tracker.browses.contains_key(&category) {
                        self.browse(category, BrowseScope::Everywhere)?;
                    }
                }
                self.tracker.resolves.push((handle, key));
            }
        }
        Ok(handle)
    }

    fn release(&mut self, handle: Handle) {
        self.tracker.queries.retain(|(h, _)| *h != handle);
        self.tracker.resolves.retain(|(h, _)| *h != handle);
        self.ready.retain(|e| e.handle() != handle);

        let mut emptied = Vec::new();
        for (category, handles) in self.tracker.browses.iter_mut() {
            handles.retain(|(h, _)| *h != handle);
            if handles.is_empty() {
                emptied.push(*category);
            }
        }
        for category in emptied {
            self.tracker.browses.remove(&category);
            let stype = service_type(category);
            if let Err(e) = self.daemon.stop_browse(&stype) {
                debug!(service_type = %stype, error = %e, "stop browse failed");
            }
        }
    }

    fn run_once(&mut self, max_wait: Duration) -> Result<Vec<ProviderEvent>> {
        let mut events = std::mem::take(&mut self.ready);

        if events.is_empty() {
            match self.rx.recv_timeout(max_wait) {
                Ok((category, event)) => self.tracker.handle_event(category, event, &mut events),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ScoutError::Browse("mDNS event channel closed".into()));
                }
            }
        }
        while let Ok((category, event)) = self.rx.try_recv() {
            self.tracker.handle_event(category, event, &mut events);
        }
        Ok(events)
    }
}

impl Drop for MdnsProvider {
    fn drop(&mut self) {
        for category in self.tracker.browses.keys() {
            let _ = self.daemon.stop_browse(&service_type(*category));
        }
        match self.daemon.shutdown() {
            Ok(_) => debug!("mDNS daemon shut down"),
            Err(e) => warn!(error = %e, "mDNS daemon shutdown failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fullname_parsing() {
        let service =
            service_from_fullname("_ipps._tcp.local.", "Office Laser v2.1._ipps._tcp.local.").unwrap();
        assert_eq!(service.name, "Office Laser v2.1");
        assert_eq!(service.reg_type, "_ipps._tcp");
        assert_eq!(service.domain, "local.");
        assert_eq!(service.category(), Some(ServiceCategory::Secure));

        assert!(service_from_fullname("_ipp._tcp.local.", "Other._http._tcp.local.").is_none());
    }

    #[test]
    fn cache_key_matches_escaped_queries() {
        let browsed = service_from_fullname("_ipp._tcp.local.", "Front Desk._ipp._tcp.local.").unwrap();
        let queried = ServiceRef::from_full_name(&browsed.full_name()).unwrap();
        assert_eq!(cache_key(&browsed), cache_key(&queried));
    }

    #[test]
    fn service_types_are_local() {
        assert_eq!(service_type(ServiceCategory::Plain), "_ipp._tcp.local.");
        assert_eq!(service_type(ServiceCategory::Secure), "_ipps._tcp.local.");
    }

    #[test]
    fn interface_addresses_exclude_loopback() {
        assert!(this_host_addresses().iter().all(|ip| !ip.is_loopback()));
    }

    fn resolved_info(instance: &str, ip: &str) -> ServiceInfo {
        ServiceInfo::new(
            "_ipp._tcp.local.",
            instance,
            "printer.local.",
            ip,
            631,
            &[("pdl", "application/pdf")][..],
        )
        .unwrap()
    }

    fn tracker_with_browses() -> Tracker {
        let mut tracker = Tracker {
            this_host: vec!["192.0.2.10".parse().unwrap()],
            ..Default::default()
        };
        tracker.browses.insert(
            ServiceCategory::Plain,
            vec![(Handle(1), BrowseScope::Everywhere), (Handle(2), BrowseScope::ThisHost)],
        );
        tracker
    }

    #[test]
    fn this_host_sighting_precedes_the_txt_answer() {
        let mut tracker = tracker_with_browses();
        let mine = ServiceRef::new("Mine", "_ipp._tcp", LOCAL_DOMAIN);
        tracker.queries.push((Handle(3), cache_key(&mine)));

        let mut events = Vec::new();
        tracker.handle_event(
            ServiceCategory::Plain,
            ServiceEvent::ServiceResolved(resolved_info("Mine", "192.0.2.10")),
            &mut events,
        );

        let handles: Vec<Handle> = events.iter().map(ProviderEvent::handle).collect();
        assert_eq!(handles, vec![Handle(2), Handle(3)]);
        assert!(matches!(
            &events[0],
            ProviderEvent::Browse { change: BrowseChange::Added, service, .. } if *service == mine
        ));
        assert!(tracker.queries.is_empty());
    }

    #[test]
    fn remote_resolution_answers_without_a_this_host_sighting() {
        let mut tracker = tracker_with_browses();
        let remote = ServiceRef::new("Remote", "_ipp._tcp", LOCAL_DOMAIN);
        tracker.queries.push((Handle(3), cache_key(&remote)));

        let mut events = Vec::new();
        tracker.handle_event(
            ServiceCategory::Plain,
            ServiceEvent::ServiceResolved(resolved_info("Remote", "198.51.100.7")),
            &mut events,
        );

        let handles: Vec<Handle> = events.iter().map(ProviderEvent::handle).collect();
        assert_eq!(handles, vec![Handle(3)]);
        assert!(tracker.cache.contains_key(&cache_key(&remote)));
    }
}
