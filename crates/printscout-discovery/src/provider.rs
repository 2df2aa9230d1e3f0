// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Discovery-provider capability.
//
// The scheduler and resolver are written against this trait only.  Exactly
// one concrete backend is compiled in (`crate::mdns`); tests drive the
// engine with a scripted provider instead.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use printscout_core::error::Result;

use crate::dns_name::{ServiceCategory, ServiceRef};

/// Opaque handle for one browse, query or resolve request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a browse looks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowseScope {
    /// Every domain the provider can reach.
    Everywhere,
    /// Only services hosted by this machine.
    ThisHost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseChange {
    Added,
    Removed,
}

/// Answer to a resolve request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    pub host_name: String,
    pub port: u16,
    pub txt: Vec<u8>,
    pub addresses: Vec<IpAddr>,
}

/// Something that happened during one [`DiscoveryProvider::run_once`] step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Browse {
        handle: Handle,
        change: BrowseChange,
        service: ServiceRef,
    },
    /// The browse session died and will produce nothing further.
    BrowseFailed { handle: Handle, reason: String },
    /// Exactly one per query handle: the TXT blob or a failure reason.
    Query {
        handle: Handle,
        result: std::result::Result<Vec<u8>, String>,
    },
    Resolve {
        handle: Handle,
        result: std::result::Result<ResolvedService, String>,
    },
}

impl ProviderEvent {
    pub fn handle(&self) -> Handle {
        match self {
            Self::Browse { handle, .. }
            | Self::BrowseFailed { handle, .. }
            | Self::Query { handle, .. }
            | Self::Resolve { handle, .. } => *handle,
        }
    }
}

/// One call's exclusive discovery session.
///
/// Requests return immediately with a handle; their results arrive as
/// events from `run_once`.  A handle that is released produces no further
/// events.
pub trait DiscoveryProvider {
    fn browse(&mut self, category: ServiceCategory, scope: BrowseScope) -> Result<Handle>;

    /// Ask for the TXT record of the service with this escaped full name.
    fn query(&mut self, full_name: &str) -> Result<Handle>;

    fn resolve(&mut self, service: &ServiceRef) -> Result<Handle>;

    fn release(&mut self, handle: Handle);

    /// Advance all outstanding requests, waiting at most `max_wait` for
    /// something to happen.  An empty vector means nothing did.
    fn run_once(&mut self, max_wait: Duration) -> Result<Vec<ProviderEvent>>;
}

/// Opens a fresh provider session per enumeration or resolve call.
pub trait DiscoveryBackend {
    type Provider: DiscoveryProvider;

    fn open(&self) -> Result<Self::Provider>;
}
