//! Trailing time window over event instants.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Ordered event instants, pruned from the front to a trailing span.
#[derive(Debug, Clone)]
pub struct TimeWindow {
    span: Duration,
    events: VecDeque<Instant>,
}

impl TimeWindow {
    /// Spans too large for a `Duration` saturate to an unbounded window.
    pub fn new(span_s: f64) -> Self {
        Self {
            span: Duration::try_from_secs_f64(span_s).unwrap_or(Duration::MAX),
            events: VecDeque::with_capacity(64),
        }
    }

    /// Append an event.  Instants are expected in non-decreasing order.
    pub fn push(&mut self, at: Instant) {
        debug_assert!(self.events.back().map_or(true, |&last| last <= at));
        self.events.push_back(at);
        self.prune(at);
    }

    /// Drop events older than `span` before `now`.  Events exactly
    /// `span` old are kept.
    pub fn prune(&mut self, now: Instant) {
        while let Some(&ts) = self.events.front() {
            if now.saturating_duration_since(ts) > self.span {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of events within the window at `now`.
    pub fn count_at(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.events.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.events.len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Retained events at `now` without mutating the window.
    pub fn count_within(&self, now: Instant) -> usize {
        self.events
            .iter()
            .filter(|&&ts| now.saturating_duration_since(ts) <= self.span)
            .count()
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_boundary_event() {
        let t0 = Instant::now();
        let mut window = TimeWindow::new(15.0);
        window.push(t0);
        window.push(t0 + Duration::from_secs(5));

        assert_eq!(window.count_at(t0 + Duration::from_secs(15)), 2);
        assert_eq!(window.count_at(t0 + Duration::from_millis(15_001)), 1);
        assert_eq!(window.count_at(t0 + Duration::from_secs(30)), 0);
        assert!(window.is_empty());
    }

    #[test]
    fn test_unbounded_span_does_not_panic() {
        let t0 = Instant::now();
        let mut window = TimeWindow::new(f64::INFINITY);
        window.push(t0);
        assert_eq!(window.count_at(t0 + Duration::from_secs(86_400)), 1);
    }

    #[test]
    fn test_count_within_is_read_only() {
        let t0 = Instant::now();
        let mut window = TimeWindow::new(60.0);
        for i in 0..5 {
            window.push(t0 + Duration::from_secs(i * 20));
        }
        // Pushing at 80s pruned the event at 0s (80s old).
        assert_eq!(window.len(), 4);
        assert_eq!(window.count_within(t0 + Duration::from_secs(110)), 2);
        assert_eq!(window.len(), 4);
    }
}
