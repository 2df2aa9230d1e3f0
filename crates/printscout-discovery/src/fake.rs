// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scripted in-memory discovery provider for scheduler and resolver tests.
//
// Sightings are timed relative to when the provider was opened; TXT and
// resolve answers are timed relative to when they were requested.  A shared
// ledger records every handle still open so tests can assert teardown.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use printscout_core::error::{Result, ScoutError};

use crate::dns_name::{ServiceCategory, ServiceRef};
use crate::provider::{
    BrowseChange, BrowseScope, DiscoveryBackend, DiscoveryProvider, Handle, ProviderEvent,
    ResolvedService,
};

#[derive(Debug, Clone)]
struct ScriptedSighting {
    at: Duration,
    category: ServiceCategory,
    scope: BrowseScope,
    change: BrowseChange,
    service: ServiceRef,
}

#[derive(Debug, Clone)]
struct ScriptedTxt {
    full_name: String,
    delay: Duration,
    result: std::result::Result<Vec<u8>, String>,
}

#[derive(Debug, Clone)]
struct ScriptedResolve {
    name: String,
    domain: String,
    delay: Duration,
    result: std::result::Result<ResolvedService, String>,
}

#[derive(Debug, Clone, Default)]
struct Script {
    sightings: Vec<ScriptedSighting>,
    txt: Vec<ScriptedTxt>,
    resolves: Vec<ScriptedResolve>,
    browse_failure: Option<(Duration, String)>,
    fail_open: bool,
    fail_resolve_start: HashSet<String>,
    fail_query_start: HashSet<String>,
}

/// What the engine asked for, and what it never gave back.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    pub open: HashSet<Handle>,
    pub opened_sessions: usize,
    pub queries: Vec<String>,
    pub resolves: Vec<ServiceRef>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBackend {
    script: Script,
    ledger: Arc<Mutex<Ledger>>,
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> Arc<Mutex<Ledger>> {
        Arc::clone(&self.ledger)
    }

    pub fn sighting(
        mut self,
        at_ms: u64,
        category: ServiceCategory,
        scope: BrowseScope,
        service: ServiceRef,
    ) -> Self {
        self.script.sightings.push(ScriptedSighting {
            at: ms(at_ms),
            category,
            scope,
            change: BrowseChange::Added,
            service,
        });
        self
    }

    pub fn removal(mut self, at_ms: u64, category: ServiceCategory, service: ServiceRef) -> Self {
        self.script.sightings.push(ScriptedSighting {
            at: ms(at_ms),
            category,
            scope: BrowseScope::Everywhere,
            change: BrowseChange::Removed,
            service,
        });
        self
    }

    /// Answer TXT queries for `service` after `delay_ms`.
    pub fn txt(mut self, service: &ServiceRef, delay_ms: u64, blob: Vec<u8>) -> Self {
        self.script.txt.push(ScriptedTxt {
            full_name: service.full_name(),
            delay: ms(delay_ms),
            result: Ok(blob),
        });
        self
    }

    pub fn txt_failure(mut self, service: &ServiceRef, delay_ms: u64) -> Self {
        self.script.txt.push(ScriptedTxt {
            full_name: service.full_name(),
            delay: ms(delay_ms),
            result: Err("no such record".into()),
        });
        self
    }

    /// Answer resolves of `name` in `domain` after `delay_ms`.  Several
    /// answers may be scripted for the same request.
    pub fn resolve_answer(
        mut self,
        name: &str,
        domain: &str,
        delay_ms: u64,
        result: std::result::Result<ResolvedService, String>,
    ) -> Self {
        self.script.resolves.push(ScriptedResolve {
            name: name.into(),
            domain: domain.into(),
            delay: ms(delay_ms),
            result,
        });
        self
    }

    /// Refuse to even start TXT queries for `service`.
    pub fn unqueryable(mut self, service: &ServiceRef) -> Self {
        self.script.fail_query_start.insert(service.full_name());
        self
    }

    /// Refuse to even start resolves in `domain`.
    pub fn unresolvable_domain(mut self, domain: &str) -> Self {
        self.script.fail_resolve_start.insert(domain.into());
        self
    }

    pub fn browse_failure(mut self, at_ms: u64, reason: &str) -> Self {
        self.script.browse_failure = Some((ms(at_ms), reason.into()));
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.script.fail_open = true;
        self
    }
}

impl DiscoveryBackend for FakeBackend {
    type Provider = FakeProvider;

    fn open(&self) -> Result<FakeProvider> {
        if self.script.fail_open {
            return Err(ScoutError::Discovery("daemon not running".into()));
        }
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.opened_sessions += 1;
        }
        Ok(FakeProvider {
            script: self.script.clone(),
            ledger: Arc::clone(&self.ledger),
            opened: Instant::now(),
            next_handle: 1,
            browses: Vec::new(),
            pending: Vec::new(),
            sent: HashSet::new(),
            browse_failed: false,
        })
    }
}

#[derive(Debug)]
struct Pending {
    due: Instant,
    event: ProviderEvent,
}

#[derive(Debug)]
pub(crate) struct FakeProvider {
    script: Script,
    ledger: Arc<Mutex<Ledger>>,
    opened: Instant,
    next_handle: u64,
    browses: Vec<(Handle, ServiceCategory, BrowseScope)>,
    pending: Vec<Pending>,
    /// (browse handle, sighting index) pairs already reported.
    sent: HashSet<(Handle, usize)>,
    browse_failed: bool,
}

impl FakeProvider {
    fn allocate(&mut self) -> Handle {
        let handle = Handle(self.next_handle);
        self.next_handle += 1;
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.open.insert(handle);
        }
        handle
    }

    fn is_open(&self, handle: Handle) -> bool {
        self.ledger
            .lock()
            .map(|l| l.open.contains(&handle))
            .unwrap_or(false)
    }

    fn collect_due(&mut self, now: Instant) -> Vec<ProviderEvent> {
        let mut events = Vec::new();

        if let Some((at, reason)) = &self.script.browse_failure {
            if !self.browse_failed && self.opened + *at <= now {
                if let Some(&(handle, _, _)) = self.browses.first() {
                    self.browse_failed = true;
                    events.push(ProviderEvent::BrowseFailed {
                        handle,
                        reason: reason.clone(),
                    });
                }
            }
        }

        for &(handle, category, scope) in &self.browses {
            for (index, sighting) in self.script.sightings.iter().enumerate() {
                if sighting.category != category
                    || sighting.scope != scope
                    || self.opened + sighting.at > now
                    || self.sent.contains(&(handle, index))
                {
                    continue;
                }
                self.sent.insert((handle, index));
                events.push(ProviderEvent::Browse {
                    handle,
                    change: sighting.change,
                    service: sighting.service.clone(),
                });
            }
        }

        let (due, later): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = later;
        events.extend(
            due.into_iter()
                .map(|p| p.event)
                .filter(|e| self.is_open(e.handle())),
        );
        events
    }
}

impl DiscoveryProvider for FakeProvider {
    fn browse(&mut self, category: ServiceCategory, scope: BrowseScope) -> Result<Handle> {
        let handle = self.allocate();
        self.browses.push((handle, category, scope));
        Ok(handle)
    }

    fn query(&mut self, full_name: &str) -> Result<Handle> {
        if self.script.fail_query_start.contains(full_name) {
            return Err(ScoutError::Discovery(format!("cannot query {full_name}")));
        }
        let handle = self.allocate();
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.queries.push(full_name.to_string());
        }
        let now = Instant::now();
        let answers: Vec<Pending> = self
            .script
            .txt
            .iter()
            .filter(|t| t.full_name == full_name)
            .map(|t| Pending {
                due: now + t.delay,
                event: ProviderEvent::Query {
                    handle,
                    result: t.result.clone(),
                },
            })
            .collect();
        self.pending.extend(answers);
        Ok(handle)
    }

    fn resolve(&mut self, service: &ServiceRef) -> Result<Handle> {
        if self.script.fail_resolve_start.contains(&service.domain) {
            return Err(ScoutError::Discovery(format!("cannot resolve in {}", service.domain)));
        }
        let handle = self.allocate();
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.resolves.push(service.clone());
        }
        let now = Instant::now();
        let answers: Vec<Pending> = self
            .script
            .resolves
            .iter()
            .filter(|r| r.name == service.name && r.domain == service.domain)
            .map(|r| Pending {
                due: now + r.delay,
                event: ProviderEvent::Resolve {
                    handle,
                    result: r.result.clone(),
                },
            })
            .collect();
        self.pending.extend(answers);
        Ok(handle)
    }

    fn release(&mut self, handle: Handle) {
        if let Ok(mut ledger) = self.ledger.lock() {
            ledger.open.remove(&handle);
        }
        self.browses.retain(|(h, _, _)| *h != handle);
    }

    fn run_once(&mut self, max_wait: Duration) -> Result<Vec<ProviderEvent>> {
        let until = Instant::now() + max_wait;
        loop {
            let now = Instant::now();
            let events = self.collect_due(now);
            if !events.is_empty() || now >= until {
                return Ok(events);
            }
            thread::sleep((until - now).min(ms(2)));
        }
    }
}

/// A resolved-service answer for tests.
pub(crate) fn answer(host: &str, port: u16, txt: Vec<u8>) -> ResolvedService {
    ResolvedService {
        host_name: host.into(),
        port,
        txt,
        addresses: Vec::new(),
    }
}
