// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Host lifecycle signalling.
//!
//! The engine brackets each turn with busy/idle notifications so a host
//! process-priority mechanism can keep the process foregrounded while any
//! conversation is active. The engine guarantees exactly one decrement per
//! turn; the provided counter additionally clamps at zero so a stray
//! decrement can never wrap.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Injected busy/idle signal consumed by the host.
pub trait LifecycleSignal: Send + Sync {
    /// `true` on turn start, `false` on turn end.
    fn notify_busy(&self, busy: bool);
}

/// Reference-counted busy tracker with a clamped decrement.
#[derive(Debug, Default)]
pub struct BusyCounter {
    active: AtomicUsize,
}

impl BusyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of turns currently marked busy.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_busy(&self) -> bool {
        self.active_count() > 0
    }
}

impl LifecycleSignal for BusyCounter {
    fn notify_busy(&self, busy: bool) {
        if busy {
            self.active.fetch_add(1, Ordering::SeqCst);
            return;
        }

        // Clamped decrement: never below zero.
        let result = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if result.is_err() {
            tracing::warn!(
                target: "colloquy.lifecycle",
                "busy counter decremented at zero; clamping"
            );
        }
    }
}

/// No-op signal for callers without a host lifecycle hook.
#[derive(Debug, Default)]
pub struct NoopLifecycleSignal;

impl LifecycleSignal for NoopLifecycleSignal {
    fn notify_busy(&self, _busy: bool) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_increments_and_decrements() {
        let counter = BusyCounter::new();
        assert!(!counter.is_busy());

        counter.notify_busy(true);
        counter.notify_busy(true);
        assert_eq!(counter.active_count(), 2);
        assert!(counter.is_busy());

        counter.notify_busy(false);
        assert_eq!(counter.active_count(), 1);
        counter.notify_busy(false);
        assert!(!counter.is_busy());
    }

    #[test]
    fn test_decrement_clamps_at_zero() {
        let counter = BusyCounter::new();
        counter.notify_busy(false);
        counter.notify_busy(false);
        assert_eq!(counter.active_count(), 0);

        counter.notify_busy(true);
        assert_eq!(counter.active_count(), 1);
    }

    #[test]
    fn test_noop_signal() {
        let signal = NoopLifecycleSignal;
        signal.notify_busy(true);
        signal.notify_busy(false);
    }
}
