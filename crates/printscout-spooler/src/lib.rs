// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printscout Spooler: adapters that let the discovery engine see the local
// print system.

pub mod ipp_lister;
pub mod lpoptions;

pub use ipp_lister::IppLister;
pub use lpoptions::LpOptionsPreferences;
