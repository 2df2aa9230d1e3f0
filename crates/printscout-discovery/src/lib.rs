// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printscout Discovery: DNS-SD printer discovery and resolution engine.
// Finds advertised printers, merges them with local spooler queues, and
// turns `dnssd://` references into connectable URIs, all under a caller
// deadline and cancellation flag.

pub mod deadline;
pub mod dns_name;
pub mod finder;
pub mod local;
pub mod mdns;
pub mod provider;
pub mod queue_name;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod txt;

#[cfg(test)]
mod fake;

pub use deadline::timeout_from_millis;
pub use dns_name::{DiscoveryRef, ServiceCategory, ServiceRef};
pub use finder::DestinationFinder;
pub use mdns::MdnsBackend;
pub use provider::{DiscoveryBackend, DiscoveryProvider};
pub use queue_name::queue_name;
pub use txt::{TxtFacts, parse_txt};
