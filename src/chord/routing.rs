use crate::chord::types::{NodeId, NodeRef, RingSpace};
use log::warn;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;

/// One finger: the fixed ring position it targets and the node last known to own it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Finger {
    pub target: NodeId,
    pub owner: NodeRef,
}

/// Routing shortcuts for one node.
///
/// Slot `i` (1-based) targets `(id + 2^(i-1)) mod 2^m`. Targets never change;
/// owners are overwritten as lookups resolve. Stale owners are tolerated until
/// the next refresh round corrects them.
#[derive(Clone, Debug)]
pub struct FingerTable {
    local: NodeRef,
    entries: Vec<Finger>,
    // target id -> slot, for correlating SUCCESSOR_REP replies
    slots: HashMap<NodeId, usize>,
}

impl FingerTable {
    /// Builds a table whose every finger points back at `local`.
    pub fn new(local: NodeRef, ring: RingSpace) -> Self {
        let size = ring.bits() as usize;
        let mut entries = Vec::with_capacity(size);
        let mut slots = HashMap::with_capacity(size);
        for slot in 1..=size {
            let target = ring.finger_target(local.id, slot);
            entries.push(Finger { target, owner: local });
            slots.insert(target, slot);
        }
        Self { local, entries, slots }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Finger] {
        &self.entries
    }

    pub fn owner(&self, slot: usize) -> Option<NodeRef> {
        slot.checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|finger| finger.owner)
    }

    pub fn target(&self, slot: usize) -> Option<NodeId> {
        slot.checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|finger| finger.target)
    }

    /// Points every finger at `owner`; a cheap approximation until refresh converges.
    pub fn fill_all(&mut self, owner: NodeRef) {
        for finger in &mut self.entries {
            finger.owner = owner;
        }
    }

    /// Replaces the owner of a 1-based slot.
    pub fn update(&mut self, slot: usize, owner: NodeRef) {
        match slot.checked_sub(1).and_then(|i| self.entries.get_mut(i)) {
            Some(finger) => finger.owner = owner,
            None => warn!("Ignoring update for finger slot {} of {}", slot, self.entries.len()),
        }
    }

    /// Address of the finger owner to forward a request for `id` to.
    ///
    /// Owners are scanned in id order. The owner sorted just before the first one
    /// at or past `id` is chosen; an exact match on the smallest owner is returned
    /// as-is. When nothing precedes (or nothing reaches) `id`, the largest owner
    /// is used since it is the farthest known node around the ring.
    pub fn closest_preceding_owner(&self, id: NodeId) -> SocketAddr {
        let mut owners: Vec<NodeRef> = self.entries.iter().map(|finger| finger.owner).collect();
        owners.sort();

        let Some(last) = owners.last() else {
            return self.local.address;
        };

        match owners.iter().position(|owner| owner.id >= id) {
            Some(0) if owners[0].id == id => owners[0].address,
            Some(0) | None => last.address,
            Some(i) => owners[i - 1].address,
        }
    }

    /// `(slot, target, current owner address)` for every finger, in slot order.
    pub fn refresh_targets(&self) -> Vec<(usize, NodeId, SocketAddr)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, finger)| (i + 1, finger.target, finger.owner.address))
            .collect()
    }

    pub fn slot_for_target(&self, id: NodeId) -> Option<usize> {
        self.slots.get(&id).copied()
    }
}

impl fmt::Display for FingerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, finger) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}->{}", finger.target, finger.owner.id)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u64, port: u16) -> NodeRef {
        NodeRef::new(NodeId(id), SocketAddr::from(([127, 0, 0, 1], port)))
    }

    fn table(local: NodeRef, bits: u8) -> FingerTable {
        FingerTable::new(local, RingSpace::new(bits).unwrap())
    }

    #[test]
    fn initialized_table_points_at_self() {
        let local = node(6, 1);
        let fingers = table(local, 3);

        assert_eq!(fingers.len(), 3);
        let targets: Vec<u64> = fingers.entries().iter().map(|f| f.target.0).collect();
        assert_eq!(targets, vec![7, 0, 2]);
        assert!(fingers.entries().iter().all(|f| f.owner == local));
    }

    #[test]
    fn slot_lookup_by_target() {
        let fingers = table(node(6, 1), 3);
        assert_eq!(fingers.slot_for_target(NodeId(7)), Some(1));
        assert_eq!(fingers.slot_for_target(NodeId(0)), Some(2));
        assert_eq!(fingers.slot_for_target(NodeId(2)), Some(3));
        assert_eq!(fingers.slot_for_target(NodeId(3)), None);
    }

    #[test]
    fn update_and_fill() {
        let mut fingers = table(node(0, 1), 4);
        let other = node(9, 2);

        fingers.update(2, other);
        assert_eq!(fingers.owner(2), Some(other));
        assert_eq!(fingers.owner(1), Some(node(0, 1)));

        fingers.update(0, other);
        fingers.update(5, other);
        assert_eq!(fingers.len(), 4);

        let succ = node(3, 3);
        fingers.fill_all(succ);
        assert!(fingers.entries().iter().all(|f| f.owner == succ));
    }

    #[test]
    fn sole_node_routes_to_itself() {
        let local = node(100, 1);
        let fingers = table(local, 8);
        for id in [0, 99, 100, 101, 255] {
            assert_eq!(fingers.closest_preceding_owner(NodeId(id)), local.address);
        }
    }

    #[test]
    fn closest_preceding_picks_owner_below_id() {
        let mut fingers = table(node(0, 1), 4);
        fingers.update(1, node(2, 2));
        fingers.update(2, node(5, 5));
        fingers.update(3, node(9, 9));
        fingers.update(4, node(12, 12));

        assert_eq!(fingers.closest_preceding_owner(NodeId(7)), node(5, 5).address);
        assert_eq!(fingers.closest_preceding_owner(NodeId(10)), node(9, 9).address);
        // a non-first exact hit still yields the strictly smaller owner
        assert_eq!(fingers.closest_preceding_owner(NodeId(9)), node(5, 5).address);
    }

    #[test]
    fn closest_preceding_exact_hit_on_smallest_owner() {
        let mut fingers = table(node(0, 1), 3);
        fingers.update(1, node(4, 4));
        fingers.update(2, node(4, 4));
        fingers.update(3, node(6, 6));
        assert_eq!(fingers.closest_preceding_owner(NodeId(4)), node(4, 4).address);
    }

    #[test]
    fn closest_preceding_falls_back_to_farthest() {
        let mut fingers = table(node(8, 1), 4);
        fingers.update(1, node(9, 9));
        fingers.update(2, node(10, 10));
        fingers.update(3, node(12, 12));
        fingers.update(4, node(14, 14));

        // below every owner: wrap to the largest
        assert_eq!(fingers.closest_preceding_owner(NodeId(3)), node(14, 14).address);
        // past every owner
        assert_eq!(fingers.closest_preceding_owner(NodeId(15)), node(14, 14).address);
    }

    #[test]
    fn closest_preceding_only_returns_known_addresses() {
        let local = node(20, 1);
        let mut fingers = table(local, 6);
        fingers.update(1, node(30, 30));
        fingers.update(4, node(45, 45));
        fingers.update(6, node(60, 60));

        let known: Vec<SocketAddr> = fingers
            .entries()
            .iter()
            .map(|f| f.owner.address)
            .chain(std::iter::once(local.address))
            .collect();
        for id in 0..64 {
            let addr = fingers.closest_preceding_owner(NodeId(id));
            assert!(known.contains(&addr), "{} routed to unknown {}", id, addr);
        }
    }

    #[test]
    fn refresh_targets_is_idempotent() {
        let mut fingers = table(node(6, 1), 3);
        fingers.update(3, node(3, 3));

        let first = fingers.refresh_targets();
        let second = fingers.refresh_targets();
        assert_eq!(first, second);
        assert_eq!(first[0], (1, NodeId(7), node(6, 1).address));
        assert_eq!(first[2], (3, NodeId(2), node(3, 3).address));
        assert_eq!(fingers.owner(3), Some(node(3, 3)));
    }
}
