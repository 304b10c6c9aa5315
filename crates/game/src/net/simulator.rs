use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::stats::LinkConditions;

#[derive(Debug)]
struct DelayedFrame<T> {
    release_ms: f64,
    order: u64,
    frame: T,
}

impl<T> PartialEq for DelayedFrame<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for DelayedFrame<T> {}

impl<T> PartialOrd for DelayedFrame<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for DelayedFrame<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_ms
            .total_cmp(&self.release_ms)
            .then_with(|| other.order.cmp(&self.order))
    }
}

/// One direction of a simulated link, driven by caller-supplied time.
#[derive(Debug)]
pub struct LinkSimulator<T> {
    conditions: LinkConditions,
    rng: ChaCha8Rng,
    queue: BinaryHeap<DelayedFrame<T>>,
    last_release_ms: f64,
    next_order: u64,
    dropped: u64,
}

impl<T> LinkSimulator<T> {
    pub fn new(conditions: LinkConditions, seed: u64) -> Self {
        Self {
            conditions,
            rng: ChaCha8Rng::seed_from_u64(seed),
            queue: BinaryHeap::new(),
            last_release_ms: f64::NEG_INFINITY,
            next_order: 0,
            dropped: 0,
        }
    }

    pub fn conditions(&self) -> &LinkConditions {
        &self.conditions
    }

    pub fn send(&mut self, frame: T, now_ms: f64) {
        if self.conditions.should_drop(&mut self.rng) {
            self.dropped += 1;
            return;
        }

        // Jitter never reorders frames on the simulated channel.
        let release_ms = (now_ms + self.conditions.delay_ms(&mut self.rng) as f64)
            .max(self.last_release_ms);
        self.last_release_ms = release_ms;

        let order = self.next_order;
        self.next_order += 1;
        self.queue.push(DelayedFrame {
            release_ms,
            order,
            frame,
        });
    }

    pub fn take_ready(&mut self, now_ms: f64) -> Vec<T> {
        let mut frames = Vec::new();
        while let Some(delayed) = self.queue.peek() {
            if delayed.release_ms > now_ms {
                break;
            }
            if let Some(delayed) = self.queue.pop() {
                frames.push(delayed.frame);
            }
        }
        frames
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
