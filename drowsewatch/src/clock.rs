//! Time source for the engine.
//!
//! The engine never calls `Instant::now()` itself; it asks a [`Clock`].
//! Live monitoring uses [`MonotonicClock`]. Tests and timestamped replay
//! use [`ManualClock`], whose handle can be cloned and advanced from the
//! outside while the engine holds another copy.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time capability read once per tick.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall-driven monotonic clock backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Externally driven clock.  Clones share the same offset.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Rc<Cell<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Rc::new(Cell::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.offset.set(self.offset.get() + delta);
    }

    /// Jump to an absolute offset from the origin.  Returns false (and
    /// leaves the clock untouched) if that would move time backwards.
    pub fn set_offset(&self, offset: Duration) -> bool {
        if offset < self.offset.get() {
            return false;
        }
        self.offset.set(offset);
        true
    }

    /// Current offset from the origin.
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }
}

// ── Tests ───────────────────────────────────────────────────
