//! Priority-ordered event queue with a pinned head.
//!
//! Entries are ordered by `(epoch, rank, seq)`:
//!
//! - `epoch` advances around every barrier (start, upgrade, stop), so a
//!   barrier sits alone between everything queued before and after it;
//! - `rank` puts protocol traffic ahead of driver events, and driver events
//!   ahead of platform messages;
//! - `seq` is the insertion order, giving FIFO within a rank.
//!
//! Once the head has been looked at it is pinned: it stays first until it is
//! popped, whatever gets queued afterwards. The one way past a pinned head is
//! [`EventQueue::take_request_timeout`], for the timeout that unblocks it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use driverhub_domain::event::{EventCategory, ExecutorEvent};

use super::deferred::EventCell;

/// An event waiting in the queue, with its completion cell.
pub(crate) struct QueuedEvent {
    pub(crate) event: ExecutorEvent,
    pub(crate) cell: Arc<EventCell>,
    /// Key in the named-event index, for named events.
    pub(crate) name: Option<String>,
}

impl QueuedEvent {
    pub(crate) fn new(event: ExecutorEvent) -> Self {
        Self {
            event,
            cell: EventCell::new(),
            name: None,
        }
    }

    pub(crate) fn named(name: &str, event: ExecutorEvent) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::new(event)
        }
    }
}

fn rank(category: EventCategory) -> u8 {
    match category {
        EventCategory::Protocol => 2,
        EventCategory::Platform => 0,
        EventCategory::RequestTimeout
        | EventCategory::Lifecycle
        | EventCategory::Driver
        | EventCategory::Error
        | EventCategory::Unclassified => 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OrderKey {
    epoch: u64,
    rank: u8,
    seq: u64,
}

impl Ord for OrderKey {
    // Smaller keys are delivered first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| other.rank.cmp(&self.rank))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Entry {
    key: OrderKey,
    queued: QueuedEvent,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    // BinaryHeap is a max-heap; invert so the smallest key is on top.
    fn cmp(&self, other: &Self) -> Ordering {
        other.key.cmp(&self.key)
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn is_request_timeout(queued: &QueuedEvent) -> bool {
    matches!(queued.event, ExecutorEvent::RequestTimeout(_))
}

#[derive(Default)]
pub(crate) struct EventQueue {
    heap: BinaryHeap<Entry>,
    head: Option<Entry>,
    epoch: u64,
    seq: u64,
    /// Request timeouts in `heap`.
    timeouts: usize,
}

impl EventQueue {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub(crate) fn push(&mut self, queued: QueuedEvent) {
        let barrier = queued.event.is_barrier();
        if barrier {
            self.epoch += 1;
        }
        let key = OrderKey {
            epoch: self.epoch,
            rank: rank(queued.event.category()),
            seq: self.seq,
        };
        self.seq += 1;
        if barrier {
            self.epoch += 1;
        }
        if is_request_timeout(&queued) {
            self.timeouts += 1;
        }
        self.heap.push(Entry { key, queued });
    }

    /// Look at the head, pinning it in place.
    pub(crate) fn head(&mut self) -> Option<&QueuedEvent> {
        if self.head.is_none() {
            self.head = self.heap.pop();
            if self.head.as_ref().is_some_and(|entry| is_request_timeout(&entry.queued)) {
                self.timeouts -= 1;
            }
        }
        self.head.as_ref().map(|entry| &entry.queued)
    }

    pub(crate) fn pop(&mut self) -> Option<QueuedEvent> {
        self.head();
        self.head.take().map(|entry| entry.queued)
    }

    /// Remove the earliest request timeout queued behind the pinned head,
    /// within the head's barrier epoch.
    pub(crate) fn take_request_timeout(&mut self) -> Option<QueuedEvent> {
        let epoch = self.head.as_ref()?.key.epoch;
        if self.timeouts == 0 {
            return None;
        }
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        let found = entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.key.epoch == epoch && is_request_timeout(&entry.queued))
            .min_by_key(|(_, entry)| entry.key.seq)
            .map(|(index, _)| index);
        let taken = found.map(|index| entries.swap_remove(index).queued);
        if taken.is_some() {
            self.timeouts -= 1;
        }
        self.heap = BinaryHeap::from(entries);
        taken
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len() + usize::from(self.head.is_some())
    }
}
