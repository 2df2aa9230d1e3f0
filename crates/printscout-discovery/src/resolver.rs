// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-address resolver: `dnssd://` reference -> connectable URI.

use std::net::IpAddr;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use printscout_core::config::DiscoveryConfig;
use printscout_core::error::{Result, ScoutError};
use printscout_core::types::DeliveryFlags;

use crate::deadline::{self, Deadline, Interrupt};
use crate::dns_name::{DiscoveryRef, LOCAL_DOMAIN, ServiceRef, scheme_for_reg_type};
use crate::provider::{DiscoveryBackend, DiscoveryProvider, Handle, ProviderEvent, ResolvedService};
use crate::txt::parse_txt;

/// Path used for fax-out when the device is not a shared spooler queue and
/// advertises no `rp`.
const FAXOUT_PATH: &str = "/ipp/faxout";

/// Whether two UUID strings name the same device.  Accepts hyphenated,
/// simple and `urn:uuid:` forms.
pub fn uuid_matches(wanted: &str, advertised: &str) -> bool {
    let parse = |s: &str| Uuid::parse_str(s.trim().trim_start_matches("urn:uuid:")).ok();
    match (parse(wanted), parse(advertised)) {
        (Some(a), Some(b)) => a == b,
        _ => wanted.trim().eq_ignore_ascii_case(advertised.trim()),
    }
}

/// Build `scheme://host:port/path` from a resolve answer.  An answer with
/// no host name falls back to its first address.
fn connectable_uri(scheme: &str, answer: &ResolvedService, path: &str) -> Option<String> {
    let host = answer.host_name.trim_end_matches('.');
    let host = match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(v6)) => format!("[{v6}]"),
        Ok(IpAddr::V4(v4)) => v4.to_string(),
        Err(_) if !host.is_empty() => host.to_string(),
        Err(_) => match answer.addresses.first()? {
            IpAddr::V6(v6) => format!("[{v6}]"),
            IpAddr::V4(v4) => v4.to_string(),
        },
    };
    Some(format!("{scheme}://{host}:{}{path}", answer.port))
}

struct Request {
    handle: Handle,
    domain: String,
    failed: bool,
}

/// Releases every resolve handle when the call ends.
struct ResolveSession<P: DiscoveryProvider> {
    provider: P,
    requests: Vec<Request>,
}

impl<P: DiscoveryProvider> ResolveSession<P> {
    fn start(&mut self, service: &ServiceRef) -> bool {
        match self.provider.resolve(service) {
            Ok(handle) => {
                debug!(%handle, service = %service, "resolve started");
                self.requests.push(Request {
                    handle,
                    domain: service.domain.clone(),
                    failed: false,
                });
                true
            }
            Err(e) => {
                warn!(service = %service, error = %e, "could not start resolve");
                false
            }
        }
    }

    fn all_failed(&self) -> bool {
        self.requests.iter().all(|r| r.failed)
    }
}

impl<P: DiscoveryProvider> Drop for ResolveSession<P> {
    fn drop(&mut self) {
        for request in self.requests.drain(..) {
            self.provider.release(request.handle);
        }
    }
}

/// Turns discovery references into connectable URIs.
pub struct Resolver<'a, B: DiscoveryBackend> {
    backend: &'a B,
    config: &'a DiscoveryConfig,
}

impl<'a, B: DiscoveryBackend> Resolver<'a, B> {
    pub fn new(backend: &'a B, config: &'a DiscoveryConfig) -> Self {
        Self { backend, config }
    }

    /// Resolve `reference` within `timeout` (the configured default when
    /// `None`).
    ///
    /// `progress` sees `RESOLVING` once per polling quantum, then
    /// `CANCELED` or `ERROR` if the call gives up; returning `false` aborts.
    /// `Ok(None)` means not found, timed out, canceled or aborted.
    #[instrument(skip(self, cancel, progress))]
    pub fn resolve(
        &self,
        reference: &str,
        fax: bool,
        timeout: Option<Duration>,
        cancel: &AtomicBool,
        progress: &mut dyn FnMut(DeliveryFlags) -> bool,
    ) -> Result<Option<String>> {
        let target = DiscoveryRef::parse(reference)?;
        let scheme = scheme_for_reg_type(&target.service.reg_type).ok_or_else(|| {
            ScoutError::InvalidReference(format!(
                "{reference}: unsupported registration type {}",
                target.service.reg_type
            ))
        })?;

        let deadline = Deadline::after(Some(timeout.unwrap_or(self.config.resolve_timeout())));
        let mut session = ResolveSession {
            provider: self.backend.open()?,
            requests: Vec::new(),
        };

        let primary_started = session.start(&target.service);
        let wants_fallback = !target.service.is_local();
        let mut fallback_started = false;
        let started = Instant::now();

        loop {
            match deadline::check(cancel, &deadline) {
                Some(Interrupt::Canceled) => {
                    info!("resolve canceled");
                    progress(DeliveryFlags::CANCELED);
                    return Ok(None);
                }
                Some(Interrupt::TimedOut) => {
                    info!("resolve timed out");
                    progress(DeliveryFlags::ERROR);
                    return Ok(None);
                }
                None => {}
            }
            if !progress(DeliveryFlags::RESOLVING) {
                debug!("resolve aborted by caller");
                return Ok(None);
            }

            let primary_failed = !primary_started || session.all_failed();
            if wants_fallback
                && !fallback_started
                && (primary_failed || started.elapsed() >= self.config.resolve_fallback_after())
            {
                let mut local = target.service.clone();
                local.domain = LOCAL_DOMAIN.to_string();
                debug!(service = %local, "starting most-local fallback");
                fallback_started = true;
                session.start(&local);
            }

            if session.requests.is_empty()
                || (session.all_failed() && (fallback_started || !wants_fallback))
            {
                warn!("no resolve request left");
                progress(DeliveryFlags::ERROR);
                return Ok(None);
            }

            let wait = deadline.next_wait(self.config.poll_quantum());
            for event in session.provider.run_once(wait)? {
                let ProviderEvent::Resolve { handle, result } = event else {
                    continue;
                };
                let Some(request) = session.requests.iter_mut().find(|r| r.handle == handle) else {
                    continue;
                };
                let answer = match result {
                    Ok(answer) => answer,
                    Err(reason) => {
                        debug!(%handle, domain = %request.domain, reason = %reason, "resolve failed");
                        request.failed = true;
                        continue;
                    }
                };

                let facts = parse_txt(&answer.txt, &self.config.document_formats);
                if let (Some(wanted), Some(advertised)) = (&target.uuid, &facts.uuid) {
                    if !uuid_matches(wanted, advertised) {
                        debug!(host = %answer.host_name, advertised = %advertised, "UUID mismatch, ignoring answer");
                        continue;
                    }
                }

                let path = match &facts.remote_path {
                    Some(rp) => rp.clone(),
                    None if fax && !facts.has_printer_type => FAXOUT_PATH.to_string(),
                    None => "/".to_string(),
                };
                let Some(uri) = connectable_uri(scheme, &answer, &path) else {
                    debug!(%handle, "answer carries neither host name nor address");
                    request.failed = true;
                    continue;
                };
                info!(uri = %uri, domain = %request.domain, "resolved");
                return Ok(Some(uri));
            }
        }
    }
}
