// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device registry and per-device state machine.
//
// Devices live in a vector in discovery order; a device's id is its index.
// A second index, sorted case-insensitively by generated queue name, gives
// O(log n) duplicate detection per sighting.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use tracing::debug;

use printscout_core::types::{Destination, PrinterType, TypeFilter, keys};

use crate::dns_name::{DiscoveryRef, ServiceCategory, ServiceRef};
use crate::provider::Handle;
use crate::queue_name::queue_name;
use crate::txt::parse_txt;

/// Index of a device in its registry, in discovery order.
pub type DeviceId = usize;

/// Where a device is in its life cycle.  Every state but `New` and
/// `QueryPending` is terminal for the current scope and category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Sighted, not yet queried.
    New,
    /// Metadata query outstanding.
    QueryPending,
    /// Classified and deliverable.
    Active,
    /// Advertises no document format we can send.
    Incompatible,
    /// Hosted by the local spooler.
    Local,
    /// The metadata query failed or could not be issued.
    QueryFailed,
}

impl DeviceState {
    /// Whether the scheduler has nothing left to do for this device.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Active | Self::Incompatible | Self::Local | Self::QueryFailed
        )
    }
}

/// One logical printer, however many times and ways it was sighted.
#[derive(Debug, Clone)]
pub struct Device {
    /// Generated destination name; the registry key.
    pub queue_name: String,
    /// Best service sighting so far.
    pub service: ServiceRef,
    /// Registration category of `service`.
    pub category: ServiceCategory,
    pub state: DeviceState,
    /// Outstanding TXT query, at most one.
    pub query: Option<Handle>,
    /// Capability bits from the last classification.
    pub printer_type: PrinterType,
    /// What the caller sees once the device is active.
    pub destination: Destination,
    /// Seen by a this-host browse.
    pub hosted_locally: bool,
    /// Adopted from a local destination; never re-queried.
    pub pinned: bool,
    /// Already handed to the caller.
    pub delivered: bool,
    /// First browse sighting (or adoption, for pinned devices).
    pub first_seen: DateTime<Utc>,
    /// Most recent browse sighting.
    pub last_seen: DateTime<Utc>,
}

impl Device {
    /// Escaped full name used to query this device's TXT record.
    pub fn full_name(&self) -> String {
        self.service.full_name()
    }

    fn reset(&mut self) {
        self.state = DeviceState::New;
        self.query = None;
        self.delivered = false;
        self.printer_type = PrinterType::empty();
        self.destination.options.clear();
    }
}

/// What a sighting did to the registry.
#[derive(Debug, Clone, PartialEq)]
pub enum Sighting {
    /// Unusable service name or unknown registration type.
    Ignored,
    Added(DeviceId),
    /// Strict improvement in domain or category.  `removed` carries the
    /// stale destination when it had already been delivered; `released` the
    /// query handle that is now obsolete.
    Improved {
        id: DeviceId,
        removed: Option<Destination>,
        released: Option<Handle>,
    },
    /// Active device found to be hosted on this machine.  `removed` carries
    /// the destination to withdraw when it had already been delivered.
    Suppressed {
        id: DeviceId,
        removed: Option<Destination>,
    },
    /// Same or worse scope/category; nothing changed but the timestamp.
    Unchanged(DeviceId),
}

/// Ordered, deduplicated set of devices for one enumeration call.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    by_name: Vec<DeviceId>,
    max_name_length: usize,
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

impl DeviceRegistry {
    /// An empty registry generating names of at most `max_name_length`
    /// bytes.
    pub fn new(max_name_length: usize) -> Self {
        Self {
            devices: Vec::new(),
            by_name: Vec::new(),
            max_name_length,
        }
    }

    /// Number of devices, pinned ones included.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// The device with `id`, if it exists.
    pub fn get(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    /// Devices in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    /// Binary search by queue name (case-insensitive).
    pub fn find(&self, queue_name: &str) -> Option<DeviceId> {
        self.by_name
            .binary_search_by(|&id| cmp_ignore_case(&self.devices[id].queue_name, queue_name))
            .ok()
            .map(|pos| self.by_name[pos])
    }

    fn insert(&mut self, device: Device) -> DeviceId {
        let id = self.devices.len();
        let pos = match self
            .by_name
            .binary_search_by(|&other| cmp_ignore_case(&self.devices[other].queue_name, &device.queue_name))
        {
            Ok(pos) | Err(pos) => pos,
        };
        self.devices.push(device);
        self.by_name.insert(pos, id);
        id
    }

    fn new_device(&self, name: String, service: ServiceRef, category: ServiceCategory) -> Device {
        let now = Utc::now();
        Device {
            destination: Destination::new(name.clone()),
            queue_name: name,
            service,
            category,
            state: DeviceState::New,
            query: None,
            printer_type: PrinterType::empty(),
            hosted_locally: false,
            pinned: false,
            delivered: false,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Record a browse sighting.
    pub fn sight(&mut self, service: &ServiceRef, this_host: bool) -> Sighting {
        let Some(category) = service.category() else {
            return Sighting::Ignored;
        };
        let name = queue_name(&service.name, self.max_name_length);
        if name.is_empty() {
            debug!(service = %service, "no usable queue name, ignoring");
            return Sighting::Ignored;
        }

        let Some(id) = self.find(&name) else {
            let mut device = self.new_device(name, service.clone(), category);
            device.hosted_locally = this_host;
            let id = self.insert(device);
            debug!(queue = %self.devices[id].queue_name, service = %service, "new device");
            return Sighting::Added(id);
        };

        let device = &mut self.devices[id];
        device.last_seen = Utc::now();
        device.hosted_locally |= this_host;
        if device.pinned {
            return Sighting::Unchanged(id);
        }
        if this_host && device.state == DeviceState::Active {
            let removed = device.delivered.then(|| device.destination.clone());
            device.state = DeviceState::Local;
            device.delivered = false;
            debug!(queue = %device.queue_name, "device is hosted here, suppressing");
            return Sighting::Suppressed { id, removed };
        }

        let better_domain = service.is_local() && !device.service.is_local();
        let better_category =
            category == ServiceCategory::Secure && device.category == ServiceCategory::Plain;
        if !better_domain && !better_category {
            return Sighting::Unchanged(id);
        }

        let mut updated = device.service.clone();
        updated.name = service.name.clone();
        if better_domain {
            updated.domain = service.domain.clone();
        }
        if better_category {
            updated.reg_type = service.reg_type.clone();
            device.category = category;
        }
        debug!(
            queue = %device.queue_name,
            from = %device.service,
            to = %updated,
            state = ?device.state,
            "device improved"
        );
        device.service = updated;

        match device.state {
            DeviceState::Active => {
                let removed = device.delivered.then(|| device.destination.clone());
                device.reset();
                Sighting::Improved { id, removed, released: None }
            }
            DeviceState::QueryPending => {
                // Nothing delivered yet: re-query silently under the better name.
                let released = device.query.take();
                device.reset();
                Sighting::Improved { id, removed: None, released }
            }
            _ => Sighting::Improved { id, removed: None, released: None },
        }
    }

    /// Register a local destination whose `device-uri` is a discovery
    /// reference, as an already-delivered active device.
    pub fn adopt_local(&mut self, destination: &Destination) -> Option<DeviceId> {
        let reference = DiscoveryRef::parse(destination.device_uri()?).ok()?;
        let category = reference.service.category()?;
        let name = queue_name(&reference.service.name, self.max_name_length);
        if name.is_empty() || self.find(&name).is_some() {
            return None;
        }

        let mut device = self.new_device(name, reference.service, category);
        device.state = DeviceState::Active;
        device.pinned = true;
        device.delivered = true;
        device.printer_type = destination.printer_type();
        device.destination = destination.clone();
        let id = self.insert(device);
        debug!(queue = %self.devices[id].queue_name, local = %destination, "adopted local destination");
        Some(id)
    }

    /// Devices sighted but not yet queried, in discovery order.
    pub fn awaiting_query(&self) -> Vec<DeviceId> {
        self.devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.state == DeviceState::New && d.query.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// Record the query issued for a `New` device.
    pub fn mark_query_pending(&mut self, id: DeviceId, handle: Handle) {
        if let Some(device) = self.devices.get_mut(id).filter(|d| d.state == DeviceState::New) {
            device.state = DeviceState::QueryPending;
            device.query = Some(handle);
        }
    }

    /// A query could not even be issued.
    pub fn mark_query_failed(&mut self, id: DeviceId) {
        if let Some(device) = self.devices.get_mut(id).filter(|d| !d.state.is_terminal()) {
            device.state = DeviceState::QueryFailed;
            device.query = None;
        }
    }

    /// The device waiting on query `handle`.
    pub fn device_for_query(&self, handle: Handle) -> Option<DeviceId> {
        self.devices.iter().position(|d| d.query == Some(handle))
    }

    /// Route a completed query.  A device not in `QueryPending` is left
    /// alone and `None` is returned.
    pub fn classify(
        &mut self,
        id: DeviceId,
        result: std::result::Result<&[u8], &str>,
        document_formats: &[String],
        filter: &TypeFilter,
    ) -> Option<DeviceState> {
        let device = self
            .devices
            .get_mut(id)
            .filter(|d| d.state == DeviceState::QueryPending)?;
        device.query = None;

        let txt = match result {
            Ok(txt) => txt,
            Err(reason) => {
                debug!(queue = %device.queue_name, reason, "query failed");
                device.state = DeviceState::QueryFailed;
                return Some(device.state);
            }
        };

        let facts = parse_txt(txt, document_formats);
        let ptype = facts.printer_type | PrinterType::REMOTE | PrinterType::DISCOVERED;
        let reference = DiscoveryRef::new(
            device.service.clone(),
            facts.is_shared_queue(),
            facts.uuid.clone(),
        );

        let options = &mut device.destination.options;
        options.clear();
        options.set(keys::PRINTER_INFO, device.service.name.clone());
        if let Some(location) = &facts.location {
            options.set(keys::PRINTER_LOCATION, location.clone());
        }
        options.set(keys::PRINTER_MAKE_AND_MODEL, facts.make_and_model.clone());
        options.set(keys::PRINTER_DEVICE_ID, facts.device_id.clone());
        options.set(keys::PRINTER_TYPE, ptype.bits().to_string());
        options.set(keys::DEVICE_URI, reference.to_uri());
        device.printer_type = ptype;

        device.state = if device.hosted_locally {
            DeviceState::Local
        } else if !facts.compatible || !filter.matches(ptype) {
            DeviceState::Incompatible
        } else {
            DeviceState::Active
        };
        debug!(
            queue = %device.queue_name,
            state = ?device.state,
            age_ms = (Utc::now() - device.first_seen).num_milliseconds(),
            "classified"
        );
        Some(device.state)
    }

    /// Active devices not yet handed to the caller, in discovery order.
    /// Marks them delivered.
    pub fn take_deliverable(&mut self) -> Vec<Destination> {
        self.devices
            .iter_mut()
            .filter(|d| d.state == DeviceState::Active && !d.delivered)
            .map(|d| {
                d.delivered = true;
                d.destination.clone()
            })
            .collect()
    }

    /// Whether every device sighted on the network is terminal.  Pinned
    /// devices never count.
    pub fn all_terminal(&self) -> bool {
        self.devices
            .iter()
            .filter(|d| !d.pinned)
            .all(|d| d.state.is_terminal())
    }

    /// When a device not adopted from the local spooler was last sighted;
    /// `None` until the network has produced one.
    pub fn last_network_sighting(&self) -> Option<DateTime<Utc>> {
        self.devices
            .iter()
            .filter(|d| !d.pinned)
            .map(|d| d.last_seen)
            .max()
    }

    /// Query handles still open, for teardown.
    pub fn outstanding_queries(&self) -> Vec<Handle> {
        self.devices.iter().filter_map(|d| d.query).collect()
    }
}
