// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Local queue names derived from advertised service names.

/// Derive a stable, identifier-safe queue name from a service name.
///
/// ASCII letters and digits are copied; every run of anything else becomes a
/// single `_`.  A separator is never emitted first, so names never start with
/// `_`.  The result is at most `max_len` bytes.
pub fn queue_name(service_name: &str, max_len: usize) -> String {
    let mut name = String::with_capacity(service_name.len().min(max_len));

    for c in service_name.chars() {
        if name.len() >= max_len {
            break;
        }
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.is_empty() && !name.ends_with('_') {
            name.push('_');
        }
    }

    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_collapses_to_single_separators() {
        let name = queue_name("My Printer (2nd Floor)!!", 127);
        assert_eq!(name, "My_Printer_2nd_Floor_");
        assert!(!name.contains("__"));
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn leading_separators_are_dropped() {
        assert_eq!(queue_name("  --Lab", 127), "Lab");
    }

    #[test]
    fn non_ascii_is_a_separator() {
        assert_eq!(queue_name("Drucker Büro 3", 127), "Drucker_B_ro_3");
    }

    #[test]
    fn truncates_to_limit() {
        let long = "A".repeat(300);
        assert_eq!(queue_name(&long, 127).len(), 127);
        assert_eq!(queue_name("ab cd", 3), "ab_");
    }

    #[test]
    fn deterministic() {
        let a = queue_name("HP LaserJet @ 3F", 127);
        let b = queue_name("HP LaserJet @ 3F", 127);
        assert_eq!(a, b);
    }
}
