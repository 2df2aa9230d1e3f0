// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local phase: list configured destinations, layer saved instances and
// options over them, and pick the default.

use tracing::{debug, warn};

use printscout_core::traits::{DestinationLister, PreferenceStore};
use printscout_core::types::{DestRef, Destination, SavedDestination, TypeFilter};

/// List local destinations through `lister`, apply the saved entries of
/// `prefs` in order, and mark the caller's default.
///
/// Listing failures are not fatal: they are logged and yield an empty list.
pub fn collect_local<L, S>(lister: &L, prefs: &S, filter: &TypeFilter) -> Vec<Destination>
where
    L: DestinationLister + ?Sized,
    S: PreferenceStore + ?Sized,
{
    let mut destinations = match lister.list_destinations(filter.wanted, filter.mask) {
        Ok(list) => list,
        Err(e) => {
            warn!(error = %e, "local destination listing failed");
            return Vec::new();
        }
    };

    let spooler_default = match lister.default_destination() {
        Ok(name) => name.and_then(|n| n.parse::<DestRef>().ok()),
        Err(e) => {
            warn!(error = %e, "could not read spooler default");
            None
        }
    };

    for saved in prefs.saved_destinations() {
        if !apply_saved(&mut destinations, &saved) {
            debug!(reference = %saved.reference, "saved entry names no listed queue");
        }
    }

    let candidates = [prefs.user_default(), prefs.system_default(), spooler_default];
    for candidate in candidates.into_iter().flatten() {
        if mark_default(&mut destinations, &candidate) {
            debug!(default = %candidate, "default destination chosen");
            break;
        }
    }

    destinations
}

/// Merge saved options into the destination `saved` names.  Later entries
/// override earlier ones key by key.
fn apply_saved(destinations: &mut Vec<Destination>, saved: &SavedDestination) -> bool {
    match find_or_add(destinations, &saved.reference) {
        Some(pos) => {
            destinations[pos].options.merge(&saved.options);
            true
        }
        None => false,
    }
}

/// Mark `reference` as default if it names a listed destination.
fn mark_default(destinations: &mut Vec<Destination>, reference: &DestRef) -> bool {
    match find_or_add(destinations, reference) {
        Some(pos) => {
            destinations[pos].is_default = true;
            true
        }
        None => false,
    }
}

/// Position of `reference` in `destinations`.  An instance of a listed
/// queue that is not itself listed is cloned from its base queue and
/// inserted after the base and its other instances.
fn find_or_add(destinations: &mut Vec<Destination>, reference: &DestRef) -> Option<usize> {
    if let Some(pos) = destinations.iter().position(|d| d.is(reference)) {
        return Some(pos);
    }

    let instance = reference.instance.as_ref()?;
    let base = DestRef::new(reference.name.clone());
    let pos = destinations.iter().position(|d| d.is(&base))?;

    let mut dest = destinations[pos].clone();
    dest.instance = Some(instance.clone());
    dest.is_default = false;
    let at = pos
        + 1
        + destinations[pos + 1..]
            .iter()
            .take_while(|d| d.name.eq_ignore_ascii_case(&base.name))
            .count();
    destinations.insert(at, dest);
    Some(at)
}
