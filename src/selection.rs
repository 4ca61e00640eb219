//! Selection tracking with staleness tickets.
//!
//! Every selection bumps a version counter and hands out a ticket carrying
//! that version. Work started for a selection (loading the values of the
//! selected key) checks the ticket before publishing its result and drops
//! it if the user has moved on in the meantime. Nothing is aborted mid-flight.

use crate::tree::NodeId;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Proof of one particular selection.
#[derive(Debug, Clone)]
pub struct SelectionTicket {
    node: NodeId,
    version: u64,
    active: Arc<AtomicU64>,
}

impl SelectionTicket {
    /// The node that was selected.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Version assigned to this selection.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns true while no newer selection has been made.
    pub fn is_current(&self) -> bool {
        self.active.load(Ordering::SeqCst) == self.version
    }

    /// Waits for `delay`, then reports whether the selection still stands.
    ///
    /// Callers use this to debounce rapid navigation before issuing store
    /// calls for the selected key.
    pub fn settle(&self, delay: Duration) -> bool {
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.is_current()
    }
}

/// Notification sent to subscribers whenever the selection changes.
#[derive(Debug, Clone)]
pub struct SelectionChange {
    /// Previously selected node, if any.
    pub previous: Option<NodeId>,
    /// Ticket of the new selection.
    pub ticket: SelectionTicket,
}

/// Tracks the selected node and notifies subscribers of changes.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    active: Arc<AtomicU64>,
    current: Option<NodeId>,
    subscribers: Vec<Sender<SelectionChange>>,
}

impl SelectionTracker {
    /// Creates a tracker with nothing selected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently selected node.
    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    /// Selects `node`, invalidating every outstanding ticket.
    pub fn select(&mut self, node: NodeId) -> SelectionTicket {
        let version = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.current.replace(node);
        let ticket = SelectionTicket {
            node,
            version,
            active: Arc::clone(&self.active),
        };
        debug!(?node, version, "Selection changed");

        let change = SelectionChange {
            previous,
            ticket: ticket.clone(),
        };
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
        ticket
    }

    /// Drops the selection, invalidating every outstanding ticket.
    pub fn clear(&mut self) {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.current = None;
    }

    /// Returns a receiver of all future selection changes.
    ///
    /// Dropping the receiver unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<SelectionChange> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<NodeId> {
        (0..n).map(|i| NodeId::new(i, i as u64)).collect()
    }

    #[test]
    fn test_newer_selection_invalidates_ticket() {
        let nodes = ids(2);
        let mut tracker = SelectionTracker::new();

        let first = tracker.select(nodes[0]);
        assert!(first.is_current());

        let second = tracker.select(nodes[1]);
        assert!(!first.is_current());
        assert!(second.is_current());
        assert_eq!(tracker.current(), Some(nodes[1]));
    }

    #[test]
    fn test_settle_with_zero_delay() {
        let nodes = ids(1);
        let mut tracker = SelectionTracker::new();
        let ticket = tracker.select(nodes[0]);
        assert!(ticket.settle(Duration::ZERO));

        tracker.clear();
        assert!(!ticket.settle(Duration::ZERO));
        assert_eq!(tracker.current(), None);
    }

    #[test]
    fn test_subscribers_receive_changes() {
        let nodes = ids(2);
        let mut tracker = SelectionTracker::new();
        let rx = tracker.subscribe();

        tracker.select(nodes[0]);
        tracker.select(nodes[1]);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.previous, None);
        assert_eq!(first.ticket.node(), nodes[0]);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.previous, Some(nodes[0]));
        assert!(second.ticket.is_current());
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let nodes = ids(1);
        let mut tracker = SelectionTracker::new();
        drop(tracker.subscribe());
        tracker.select(nodes[0]);
        assert!(tracker.subscribers.is_empty());
    }
}
