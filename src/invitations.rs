use std::time::Instant;

use cells_store::{PlayerId, TtlPolicy};
use hashbrown::HashMap;

/// Pending membership offers keyed by (cell owner, invitee), each expiring after a fixed TTL.
#[derive(Debug)]
pub struct Invitations {
    ttl: TtlPolicy,
    pending: HashMap<(PlayerId, PlayerId), Instant>,
}

impl Invitations {
    pub fn new(ttl: TtlPolicy) -> Self {
        Self {
            ttl,
            pending: HashMap::new(),
        }
    }

    /// Re-inviting restarts the expiry window.
    pub fn insert(&mut self, owner: PlayerId, invitee: PlayerId, now: Instant) {
        self.pending.insert((owner, invitee), now);
    }

    pub fn contains(&self, owner: PlayerId, invitee: PlayerId, now: Instant) -> bool {
        self.pending
            .get(&(owner, invitee))
            .is_some_and(|t| !self.ttl.is_expired(*t, now))
    }

    /// Consumes a live invitation.
    pub fn take(&mut self, owner: PlayerId, invitee: PlayerId, now: Instant) -> bool {
        let live = self.contains(owner, invitee, now);
        self.pending.remove(&(owner, invitee));
        live
    }

    pub fn purge(&mut self, now: Instant) -> usize {
        let before = self.pending.len();
        let ttl = self.ttl;
        self.pending.retain(|_, t| !ttl.is_expired(*t, now));
        before - self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn invitations_expire_and_are_single_use() {
        let mut inv = Invitations::new(TtlPolicy::new(Duration::from_secs(120)));
        let t0 = Instant::now();
        let (owner, guest) = (PlayerId(1), PlayerId(2));
        inv.insert(owner, guest, t0);
        assert!(inv.contains(owner, guest, t0 + Duration::from_secs(120)));
        assert!(!inv.contains(guest, owner, t0));
        assert!(!inv.contains(owner, guest, t0 + Duration::from_secs(121)));
        assert!(!inv.take(owner, guest, t0 + Duration::from_secs(121)));
        assert!(inv.is_empty());

        inv.insert(owner, guest, t0);
        assert!(inv.take(owner, guest, t0));
        assert!(!inv.take(owner, guest, t0));
    }

    #[test]
    fn purge_drops_only_expired() {
        let mut inv = Invitations::new(TtlPolicy::new(Duration::from_secs(10)));
        let t0 = Instant::now();
        inv.insert(PlayerId(1), PlayerId(2), t0);
        inv.insert(PlayerId(1), PlayerId(3), t0 + Duration::from_secs(5));
        assert_eq!(inv.purge(t0 + Duration::from_secs(12)), 1);
        assert_eq!(inv.len(), 1);
    }
}
