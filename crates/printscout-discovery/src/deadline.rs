// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Deadline budget and cooperative cancellation checks shared by the
// scheduler and resolver loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Convert a caller timeout in milliseconds; negative means unbounded.
pub fn timeout_from_millis(millis: i64) -> Option<Duration> {
    u64::try_from(millis).ok().map(Duration::from_millis)
}

/// An absolute deadline, or none at all.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            end: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn unbounded() -> Self {
        Self { end: None }
    }

    /// Time left, recomputed from the wall clock.  `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.end.map(|end| end.saturating_duration_since(Instant::now()))
    }

    pub fn expired(&self) -> bool {
        self.remaining().is_some_and(|r| r.is_zero())
    }

    /// How long the next wait may block: one quantum, or less if the
    /// deadline is closer.
    pub fn next_wait(&self, quantum: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => remaining.min(quantum),
            None => quantum,
        }
    }
}

/// Why a loop should stop before its work is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Canceled,
    TimedOut,
}

/// Check the cancel flag and deadline, cancellation first.
pub fn check(cancel: &AtomicBool, deadline: &Deadline) -> Option<Interrupt> {
    if cancel.load(Ordering::Relaxed) {
        Some(Interrupt::Canceled)
    } else if deadline.expired() {
        Some(Interrupt::TimedOut)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_timeout_is_unbounded() {
        assert_eq!(timeout_from_millis(-1), None);
        assert_eq!(timeout_from_millis(0), Some(Duration::ZERO));
        assert_eq!(timeout_from_millis(1500), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn next_wait_is_capped_by_remaining_time() {
        let quantum = Duration::from_millis(250);
        assert_eq!(Deadline::unbounded().next_wait(quantum), quantum);

        let close = Deadline::after(Some(Duration::from_millis(20)));
        assert!(close.next_wait(quantum) <= Duration::from_millis(20));
    }

    #[test]
    fn zero_deadline_is_already_expired() {
        let deadline = Deadline::after(Some(Duration::ZERO));
        assert!(deadline.expired());
        assert_eq!(check(&AtomicBool::new(false), &deadline), Some(Interrupt::TimedOut));
    }

    #[test]
    fn cancel_wins_over_timeout() {
        let deadline = Deadline::after(Some(Duration::ZERO));
        assert_eq!(check(&AtomicBool::new(true), &deadline), Some(Interrupt::Canceled));
        assert_eq!(check(&AtomicBool::new(false), &Deadline::unbounded()), None);
    }
}
