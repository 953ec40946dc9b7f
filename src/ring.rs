//! Bounded history of received envelopes used for duplicate suppression.
//!
//! Eviction is strict FIFO: an envelope that is seen again while still in
//! the window is *not* moved to the newest position.  Once an identifier
//! has aged out, a late duplicate is accepted and delivered again.

use std::collections::{HashMap, VecDeque};

use crate::envelope::{Checksum, Envelope};

/// Fixed-capacity ring of recently accepted envelopes.
#[derive(Debug)]
pub struct DedupRing {
    order: VecDeque<Checksum>,
    seen: HashMap<Checksum, Envelope>,
    capacity: usize,
    evictions: u64,
}

impl DedupRing {
    /// Create an empty ring remembering at most `capacity` envelopes.
    ///
    /// Returns `None` for a zero capacity.
    pub fn new(capacity: usize) -> Option<Self> {
        if capacity == 0 {
            return None;
        }
        Some(Self {
            order: VecDeque::with_capacity(capacity),
            seen: HashMap::with_capacity(capacity),
            capacity,
            evictions: 0,
        })
    }

    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.seen.contains_key(checksum)
    }

    /// Record `envelope` as received.
    ///
    /// Returns `false` without touching the ring when its checksum is
    /// already present.
    pub fn accept(&mut self, envelope: Envelope) -> bool {
        let checksum = envelope.checksum();
        if self.seen.contains_key(&checksum) {
            return false;
        }

        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
                self.evictions += 1;
            }
        }

        self.order.push_back(checksum);
        self.seen.insert(checksum, envelope);
        true
    }

    pub fn get(&self, checksum: &Checksum) -> Option<&Envelope> {
        self.seen.get(checksum)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries pushed out by newer ones so far.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Remembered checksums, oldest first.
    pub fn checksums(&self) -> impl Iterator<Item = &Checksum> {
        self.order.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MessageKind;

    fn env(nonce: u32) -> Envelope {
        Envelope::with_nonce(MessageKind::Data, nonce, b"ring".to_vec())
    }

    #[test]
    fn accept_then_contains() {
        let mut ring = DedupRing::new(4).unwrap();
        let e = env(1);
        assert!(ring.accept(e.clone()));
        assert!(ring.contains(&e.checksum()));
        assert_eq!(ring.get(&e.checksum()), Some(&e));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut ring = DedupRing::new(4).unwrap();
        assert!(ring.accept(env(1)));
        assert!(!ring.accept(env(1)));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn holds_exactly_capacity_most_recent() {
        let mut ring = DedupRing::new(3).unwrap();
        for nonce in 0..10 {
            ring.accept(env(nonce));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.evictions(), 7);

        let expected: Vec<Checksum> = (7..10).map(|n| env(n).checksum()).collect();
        let held: Vec<Checksum> = ring.checksums().copied().collect();
        assert_eq!(held, expected);
        assert!(!ring.contains(&env(6).checksum()));
    }

    #[test]
    fn eviction_is_fifo_not_lru() {
        let mut ring = DedupRing::new(2).unwrap();
        ring.accept(env(1));
        ring.accept(env(2));

        // Re-seeing 1 does not refresh it.
        assert!(!ring.accept(env(1)));
        ring.accept(env(3));

        assert!(!ring.contains(&env(1).checksum()));
        assert!(ring.contains(&env(2).checksum()));
        assert!(ring.contains(&env(3).checksum()));
    }

    #[test]
    fn evicted_entry_is_accepted_again() {
        let mut ring = DedupRing::new(1).unwrap();
        assert!(ring.accept(env(1)));
        assert!(ring.accept(env(2)));
        assert!(ring.accept(env(1)));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(DedupRing::new(0).is_none());
    }
}
