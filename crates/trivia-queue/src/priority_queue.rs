use std::collections::VecDeque;
use std::sync::Mutex;
use trivia_model::Priority;

const TIER_COUNT: usize = 4;

fn tier_index(priority: Priority) -> usize {
    match priority {
        Priority::Critical => 0,
        Priority::High => 1,
        Priority::Normal => 2,
        Priority::Low => 3,
    }
}

/// Default per-tier capacities: critical/high/normal/low, per spec.md §3.
pub const DEFAULT_CAPACITIES: [usize; TIER_COUNT] = [5000, 1000, 500, 100];

struct Inner<T> {
    tiers: [VecDeque<T>; TIER_COUNT],
    capacities: [usize; TIER_COUNT],
    enqueued: [u64; TIER_COUNT],
    dequeued: [u64; TIER_COUNT],
    dropped: [u64; TIER_COUNT],
}

/// Per-tier counters, exposed through [`PriorityQueue::snapshot`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierSnapshot {
    pub capacity: usize,
    pub queued: usize,
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
}

/// A point-in-time snapshot of all four tiers, indexed by
/// [`Priority::TIERS_DESCENDING`] order (critical, high, normal, low).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub critical: TierSnapshot,
    pub high: TierSnapshot,
    pub normal: TierSnapshot,
    pub low: TierSnapshot,
}

/// Four bounded FIFOs keyed by [`Priority`] tier, guarded by a single lock.
///
/// `dequeue` always returns the oldest item from the highest non-empty tier
/// (spec.md Invariant, Testable Property 3). There is no starvation
/// avoidance between tiers — low-priority items are expected to be dropped
/// under sustained load, and that is the documented policy (spec.md §4.3,
/// §9).
pub struct PriorityQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> PriorityQueue<T> {
    #[must_use]
    pub fn new(capacities: [usize; TIER_COUNT]) -> Self {
        PriorityQueue {
            inner: Mutex::new(Inner {
                tiers: Default::default(),
                capacities,
                enqueued: [0; TIER_COUNT],
                dequeued: [0; TIER_COUNT],
                dropped: [0; TIER_COUNT],
            }),
        }
    }

    /// Enqueue `item` onto its priority's tier. Returns `false` (the item is
    /// dropped and the tier's drop counter incremented) if the tier is at
    /// capacity.
    pub fn enqueue(&self, priority: Priority, item: T) -> bool {
        let mut inner = self.inner.lock().expect("priority queue mutex poisoned");
        let idx = tier_index(priority);

        if inner.tiers[idx].len() >= inner.capacities[idx] {
            inner.dropped[idx] += 1;
            return false;
        }

        inner.tiers[idx].push_back(item);
        inner.enqueued[idx] += 1;
        true
    }

    /// Walk tiers from critical down to low and return the oldest item from
    /// the highest non-empty tier, or `None` if every tier is empty.
    pub fn dequeue(&self) -> Option<(Priority, T)> {
        let mut inner = self.inner.lock().expect("priority queue mutex poisoned");

        for priority in Priority::TIERS_DESCENDING {
            let idx = tier_index(priority);
            if let Some(item) = inner.tiers[idx].pop_front() {
                inner.dequeued[idx] += 1;
                return Some((priority, item));
            }
        }

        None
    }

    #[must_use]
    pub fn snapshot(&self) -> QueueSnapshot {
        let inner = self.inner.lock().expect("priority queue mutex poisoned");
        let tier = |idx: usize| TierSnapshot {
            capacity: inner.capacities[idx],
            queued: inner.tiers[idx].len(),
            enqueued: inner.enqueued[idx],
            dequeued: inner.dequeued[idx],
            dropped: inner.dropped[idx],
        };

        QueueSnapshot {
            critical: tier(tier_index(Priority::Critical)),
            high: tier(tier_index(Priority::High)),
            normal: tier(tier_index(Priority::Normal)),
            low: tier(tier_index(Priority::Low)),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("priority queue mutex poisoned");
        inner.tiers.iter().map(VecDeque::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dequeue_returns_highest_priority_first() {
        let queue: PriorityQueue<&str> = PriorityQueue::default();
        assert!(queue.enqueue(Priority::Low, "low"));
        assert!(queue.enqueue(Priority::Critical, "critical"));

        assert_eq!(queue.dequeue(), Some((Priority::Critical, "critical")));
        assert_eq!(queue.dequeue(), Some((Priority::Low, "low")));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn fifo_within_a_tier() {
        let queue: PriorityQueue<u32> = PriorityQueue::default();
        assert!(queue.enqueue(Priority::Normal, 1));
        assert!(queue.enqueue(Priority::Normal, 2));
        assert!(queue.enqueue(Priority::Normal, 3));

        assert_eq!(queue.dequeue(), Some((Priority::Normal, 1)));
        assert_eq!(queue.dequeue(), Some((Priority::Normal, 2)));
        assert_eq!(queue.dequeue(), Some((Priority::Normal, 3)));
    }

    /// Scenario S3: `priority_capacities.low = 2`, enqueue three heartbeats.
    #[test]
    fn overflow_drops_and_counts_per_tier() {
        let mut capacities = DEFAULT_CAPACITIES;
        capacities[tier_index(Priority::Low)] = 2;
        let queue: PriorityQueue<&str> = PriorityQueue::new(capacities);

        assert!(queue.enqueue(Priority::Low, "a"));
        assert!(queue.enqueue(Priority::Low, "b"));
        assert!(!queue.enqueue(Priority::Low, "c"));

        let snapshot = queue.snapshot();
        assert_eq!(snapshot.low.dropped, 1);
        assert_eq!(snapshot.low.queued, 2);
    }

    /// Testable Property 9: enqueued = dequeued + dropped + currently_queued.
    #[test]
    fn drop_accounting_holds_over_an_interval() {
        let mut capacities = DEFAULT_CAPACITIES;
        capacities[tier_index(Priority::Normal)] = 3;
        let queue: PriorityQueue<u32> = PriorityQueue::new(capacities);

        for i in 0..5 {
            queue.enqueue(Priority::Normal, i);
        }
        queue.dequeue();

        let snapshot = queue.snapshot();
        assert_eq!(
            snapshot.normal.enqueued,
            snapshot.normal.dequeued + snapshot.normal.dropped + snapshot.normal.queued as u64
        );
    }
}
