//! Mailbox monitoring for the signaling actor.
//!
//! The handle records an enqueue for every message it sends and the actor a
//! dequeue for every message it finishes, so `current_depth` is the backlog
//! the actor has not yet processed.
//!
//! | Level    | Depth    |
//! |----------|----------|
//! | Normal   | <= 100   |
//! | Warning  | 101-500  |
//! | Critical | > 500    |

use crate::observability::metrics;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Depth at or below which the mailbox is considered healthy.
pub const MAILBOX_NORMAL: usize = 100;

/// Depth above which the mailbox is critical.
pub const MAILBOX_WARNING: usize = 500;

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    /// At or below the normal threshold.
    Normal,
    /// Between the normal and warning thresholds.
    Warning,
    /// Above the warning threshold.
    Critical,
}

/// Shared mailbox counters.
#[derive(Debug, Default)]
pub struct MailboxMonitor {
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a monitor with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message being added to the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(new_depth, Ordering::Relaxed);

        match level_for_depth(new_depth) {
            MailboxLevel::Critical => warn!(
                target: "sg.actor",
                depth = new_depth,
                threshold = MAILBOX_WARNING,
                "Mailbox depth critical"
            ),
            MailboxLevel::Warning if new_depth == MAILBOX_NORMAL + 1 => debug!(
                target: "sg.actor",
                depth = new_depth,
                "Mailbox depth elevated"
            ),
            _ => {}
        }
    }

    /// Record a message being undone before it reached the mailbox.
    pub fn record_rollback(&self) {
        self.decrement();
    }

    /// Record a message being processed.
    pub fn record_dequeue(&self) {
        let depth = self.decrement();
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        metrics::set_actor_mailbox_depth(depth);
    }

    /// Current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Peak mailbox depth since creation.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Current mailbox level.
    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        level_for_depth(self.current_depth())
    }

    fn decrement(&self) -> usize {
        // Saturate: a send rolled back after the receiver dequeued must not underflow
        let previous = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            })
            .unwrap_or_default();
        previous.saturating_sub(1)
    }
}

fn level_for_depth(depth: usize) -> MailboxLevel {
    if depth > MAILBOX_WARNING {
        MailboxLevel::Critical
    } else if depth > MAILBOX_NORMAL {
        MailboxLevel::Warning
    } else {
        MailboxLevel::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_dequeue() {
        let monitor = MailboxMonitor::new();

        monitor.record_enqueue();
        monitor.record_enqueue();
        assert_eq!(monitor.current_depth(), 2);
        assert_eq!(monitor.peak_depth(), 2);

        monitor.record_dequeue();
        assert_eq!(monitor.current_depth(), 1);
        assert_eq!(monitor.peak_depth(), 2);
        assert_eq!(monitor.messages_processed(), 1);
    }

    #[test]
    fn test_dequeue_without_enqueue_saturates() {
        let monitor = MailboxMonitor::new();
        monitor.record_dequeue();
        assert_eq!(monitor.current_depth(), 0);
        assert_eq!(monitor.messages_processed(), 1);
    }

    #[test]
    fn test_rollback_does_not_count_as_processed() {
        let monitor = MailboxMonitor::new();
        monitor.record_enqueue();
        monitor.record_rollback();
        assert_eq!(monitor.current_depth(), 0);
        assert_eq!(monitor.messages_processed(), 0);
    }

    #[test]
    fn test_levels() {
        let monitor = MailboxMonitor::new();
        assert_eq!(monitor.current_level(), MailboxLevel::Normal);

        for _ in 0..=MAILBOX_NORMAL {
            monitor.record_enqueue();
        }
        assert_eq!(monitor.current_level(), MailboxLevel::Warning);

        for _ in MAILBOX_NORMAL..MAILBOX_WARNING {
            monitor.record_enqueue();
        }
        assert_eq!(monitor.current_level(), MailboxLevel::Critical);
    }
}
