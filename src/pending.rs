//! Outbound envelopes awaiting acknowledgement.
//!
//! [`PendingTable`] only manages state; it never touches the transport.
//! The retry monitor calls [`PendingTable::tick`] once per wake-up and
//! performs the resulting resends itself.
//!
//! # Timing contract
//! - `elapsed` counts time since the last (re)transmission and resets to
//!   zero after every resend.
//! - `age` counts time since the first transmission and never resets.
//! - An entry is resent when `elapsed > resend_timeout`.
//! - A non-blocking entry expires when `age > fail_timeout`.  Blocking
//!   entries never expire here; their waiter removes them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::envelope::{Checksum, Envelope};
use crate::state::DeliveryState;

// ---------------------------------------------------------------------------
// PendingEntry
// ---------------------------------------------------------------------------

/// An envelope that has been sent but not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub envelope: Envelope,
    pub destination: SocketAddr,
    /// Wait since the most recent transmission.
    pub elapsed: Duration,
    /// Wait since the first transmission.
    pub age: Duration,
    /// A caller is blocked on this envelope's acknowledgement.
    pub blocking: bool,
    pub state: DeliveryState,
}

impl PendingEntry {
    /// How many times the retry monitor has retransmitted this envelope.
    pub fn resend_count(&self) -> u32 {
        match self.state {
            DeliveryState::Resent(n) => n,
            _ => 0,
        }
    }
}

/// Work produced by one [`PendingTable::tick`].
#[derive(Debug, Default)]
pub struct TickOutcome {
    /// Envelopes to write again, with their destinations.
    pub resend: Vec<(Envelope, SocketAddr)>,
    /// Non-blocking entries removed for exceeding the fail timeout.
    pub expired: Vec<PendingEntry>,
}

// ---------------------------------------------------------------------------
// PendingTable
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<Checksum, PendingEntry>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `envelope`.
    ///
    /// Returns the entry it replaced when the same checksum was already
    /// pending.
    pub fn insert(
        &mut self,
        envelope: Envelope,
        destination: SocketAddr,
        blocking: bool,
    ) -> Option<PendingEntry> {
        let checksum = envelope.checksum();
        self.entries.insert(
            checksum,
            PendingEntry {
                envelope,
                destination,
                elapsed: Duration::ZERO,
                age: Duration::ZERO,
                blocking,
                state: DeliveryState::Created,
            },
        )
    }

    /// Record that the first burst for `checksum` reached the transport.
    pub fn mark_sent(&mut self, checksum: &Checksum) {
        if let Some(entry) = self.entries.get_mut(checksum) {
            if entry.state == DeliveryState::Created {
                entry.state = DeliveryState::Sent;
            }
        }
    }

    /// Remove the entry confirmed by an ACK.
    ///
    /// Returns `None` for a stale or duplicate acknowledgement.
    pub fn acknowledge(&mut self, checksum: &Checksum) -> Option<PendingEntry> {
        let mut entry = self.entries.remove(checksum)?;
        entry.state = DeliveryState::Acknowledged;
        Some(entry)
    }

    /// Stop tracking `checksum` without marking it acknowledged.
    pub fn remove(&mut self, checksum: &Checksum) -> Option<PendingEntry> {
        self.entries.remove(checksum)
    }

    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.entries.contains_key(checksum)
    }

    pub fn get(&self, checksum: &Checksum) -> Option<&PendingEntry> {
        self.entries.get(checksum)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Advance every entry by `interval` and collect resends and expiries.
    pub fn tick(
        &mut self,
        interval: Duration,
        resend_timeout: Duration,
        fail_timeout: Duration,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let mut expired = Vec::new();

        for (checksum, entry) in self.entries.iter_mut() {
            entry.elapsed += interval;
            entry.age += interval;

            if !entry.blocking && entry.age > fail_timeout {
                expired.push(*checksum);
            } else if entry.elapsed > resend_timeout {
                entry.elapsed = Duration::ZERO;
                entry.state = entry.state.resent();
                outcome
                    .resend
                    .push((entry.envelope.clone(), entry.destination));
            }
        }

        for checksum in expired {
            if let Some(mut entry) = self.entries.remove(&checksum) {
                entry.state = DeliveryState::Expired;
                outcome.expired.push(entry);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESEND: Duration = Duration::from_secs(3);
    const FAIL: Duration = Duration::from_secs(9);
    const STEP: Duration = Duration::from_secs(1);

    fn dest() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn tracked(blocking: bool) -> (PendingTable, Checksum) {
        let mut table = PendingTable::new();
        let env = Envelope::data(b"pending".to_vec());
        let id = env.checksum();
        table.insert(env, dest(), blocking);
        table.mark_sent(&id);
        (table, id)
    }

    #[test]
    fn insert_starts_created_then_sent() {
        let mut table = PendingTable::new();
        let env = Envelope::data(b"x".to_vec());
        let id = env.checksum();
        table.insert(env, dest(), false);
        assert_eq!(table.get(&id).unwrap().state, DeliveryState::Created);
        table.mark_sent(&id);
        assert_eq!(table.get(&id).unwrap().state, DeliveryState::Sent);
    }

    #[test]
    fn acknowledge_removes_entry() {
        let (mut table, id) = tracked(false);
        let entry = table.acknowledge(&id).unwrap();
        assert_eq!(entry.state, DeliveryState::Acknowledged);
        assert!(table.is_empty());
    }

    #[test]
    fn stale_acknowledge_returns_none() {
        let (mut table, id) = tracked(false);
        table.acknowledge(&id);
        assert!(table.acknowledge(&id).is_none());
    }

    #[test]
    fn no_resend_until_threshold_exceeded() {
        let (mut table, _) = tracked(false);
        for _ in 0..3 {
            assert!(table.tick(STEP, RESEND, FAIL).resend.is_empty());
        }
        // elapsed == 4s > 3s
        let outcome = table.tick(STEP, RESEND, FAIL);
        assert_eq!(outcome.resend.len(), 1);
        assert_eq!(outcome.resend[0].1, dest());
    }

    #[test]
    fn resend_resets_elapsed_and_counts() {
        let (mut table, id) = tracked(false);
        for _ in 0..4 {
            table.tick(STEP, RESEND, FAIL);
        }
        let entry = table.get(&id).unwrap();
        assert_eq!(entry.elapsed, Duration::ZERO);
        assert_eq!(entry.age, Duration::from_secs(4));
        assert_eq!(entry.resend_count(), 1);

        // The very next tick must not resend again.
        assert!(table.tick(STEP, RESEND, FAIL).resend.is_empty());
    }

    #[test]
    fn non_blocking_entry_expires_after_fail_timeout() {
        let (mut table, id) = tracked(false);
        let mut expired = Vec::new();
        for _ in 0..10 {
            expired.extend(table.tick(STEP, RESEND, FAIL).expired);
        }
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].envelope.checksum(), id);
        assert_eq!(expired[0].state, DeliveryState::Expired);
        assert_eq!(expired[0].resend_count(), 2);
        assert!(!table.contains(&id));
    }

    #[test]
    fn blocking_entry_never_expires_here() {
        let (mut table, id) = tracked(true);
        let mut resends = 0;
        for _ in 0..30 {
            let outcome = table.tick(STEP, RESEND, FAIL);
            assert!(outcome.expired.is_empty());
            resends += outcome.resend.len();
        }
        assert!(table.contains(&id));
        assert_eq!(resends, 7);
    }

    #[test]
    fn reinsert_replaces_entry() {
        let mut table = PendingTable::new();
        let env = Envelope::data(b"again".to_vec());
        assert!(table.insert(env.clone(), dest(), false).is_none());
        assert!(table.insert(env, dest(), true).is_some());
        assert_eq!(table.len(), 1);
    }
}
