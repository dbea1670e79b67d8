//! NAN Data Link table.
//!
//! One slot per peer NMI address that has at least one data path. Slots
//! are reference counted by the data-path sessions bound to them; a slot
//! whose count drops to zero forgets its peer and may be claimed by any
//! other address.

use nan_types::MacAddress;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{IdKind, NanError, NanResult};

/// Index of a slot in the [`PeerLinkTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LinkHandle(usize);

impl LinkHandle {
    pub fn slot(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PeerLink {
    pub peer_address: MacAddress,
    pub session_count: u32,
}

impl PeerLink {
    pub fn is_free(&self) -> bool {
        self.session_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerLinkTable {
    links: Vec<PeerLink>,
    ifindex_start: u16,
}

impl PeerLinkTable {
    pub fn new(capacity: u16, ifindex_start: u16) -> Self {
        Self {
            links: vec![PeerLink::default(); usize::from(capacity)],
            ifindex_start,
        }
    }

    pub fn capacity(&self) -> usize {
        self.links.len()
    }

    /// Returns the link already serving `peer`, or claims the first free
    /// slot for it.
    ///
    /// Claiming only records the address; the caller must
    /// [`increment`](Self::increment) once a session is bound.
    pub fn find_or_reserve(&mut self, peer: MacAddress) -> NanResult<LinkHandle> {
        if let Some(slot) = self
            .links
            .iter()
            .position(|l| !l.is_free() && l.peer_address == peer)
        {
            return Ok(LinkHandle(slot));
        }

        let slot = self
            .links
            .iter()
            .position(PeerLink::is_free)
            .ok_or_else(|| NanError::exhausted(IdKind::PeerLink))?;

        self.links[slot].peer_address = peer;
        debug!("Reserved peer link {} for {}", slot, peer);
        Ok(LinkHandle(slot))
    }

    /// Looks up the link serving `peer` without claiming anything.
    pub fn find(&self, peer: MacAddress) -> Option<LinkHandle> {
        self.links
            .iter()
            .position(|l| !l.is_free() && l.peer_address == peer)
            .map(LinkHandle)
    }

    pub fn increment(&mut self, handle: LinkHandle) {
        if let Some(link) = self.links.get_mut(handle.0) {
            link.session_count += 1;
            debug!(
                "Peer link {} ({}) now has {} sessions",
                handle.0, link.peer_address, link.session_count
            );
        }
    }

    /// Drops one session from the link. At zero the peer address is
    /// cleared and the slot becomes reusable.
    pub fn decrement(&mut self, handle: LinkHandle) {
        let Some(link) = self.links.get_mut(handle.0) else {
            return;
        };

        if link.session_count == 0 {
            warn!(
                "Peer link {} ({}) decremented below zero",
                handle.0, link.peer_address
            );
        } else {
            link.session_count -= 1;
        }

        if link.session_count == 0 {
            debug!("Peer link {} released", handle.0);
            link.peer_address = MacAddress::ZERO;
        }
    }

    pub fn get(&self, handle: LinkHandle) -> Option<&PeerLink> {
        self.links.get(handle.0)
    }

    /// NDL data interface index the firmware uses for this link.
    pub fn interface_index(&self, handle: LinkHandle) -> u16 {
        // Slots never exceed the 63-entry NDP pool.
        self.ifindex_start.saturating_add(handle.0 as u16)
    }

    /// Links with at least one session, in slot order.
    pub fn active_links(&self) -> impl Iterator<Item = (LinkHandle, &PeerLink)> {
        self.links
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.is_free())
            .map(|(slot, l)| (LinkHandle(slot), l))
    }

    pub fn clear(&mut self) {
        self.links.iter_mut().for_each(|l| *l = PeerLink::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0x02, 0, 0, 0, 0, last])
    }

    #[test]
    fn test_same_peer_shares_link() {
        let mut t = PeerLinkTable::new(8, 5);
        let a = t.find_or_reserve(mac(1)).unwrap();
        t.increment(a);
        let b = t.find_or_reserve(mac(1)).unwrap();
        t.increment(b);
        assert_eq!(a, b);
        assert_eq!(t.get(a).unwrap().session_count, 2);
    }

    #[test]
    fn test_unincremented_reservation_is_reclaimable() {
        let mut t = PeerLinkTable::new(2, 5);
        let a = t.find_or_reserve(mac(1)).unwrap();
        // Nothing bound, so another peer can take the same slot.
        let b = t.find_or_reserve(mac(2)).unwrap();
        assert_eq!(a, b);
        assert_eq!(t.get(b).unwrap().peer_address, mac(2));
    }

    #[test]
    fn test_decrement_to_zero_clears_address() {
        let mut t = PeerLinkTable::new(8, 5);
        let h = t.find_or_reserve(mac(7)).unwrap();
        t.increment(h);
        t.increment(h);
        t.decrement(h);
        assert_eq!(t.get(h).unwrap().peer_address, mac(7));
        t.decrement(h);
        assert_eq!(t.get(h).unwrap(), &PeerLink::default());
        assert!(t.find(mac(7)).is_none());
    }

    #[test]
    fn test_decrement_at_zero_stays_zero() {
        let mut t = PeerLinkTable::new(1, 5);
        let h = t.find_or_reserve(mac(1)).unwrap();
        t.decrement(h);
        assert_eq!(t.get(h).unwrap().session_count, 0);
        assert_eq!(t.get(h).unwrap().peer_address, MacAddress::ZERO);
    }

    #[test]
    fn test_full() {
        let mut t = PeerLinkTable::new(2, 5);
        for i in 1..=2 {
            let h = t.find_or_reserve(mac(i)).unwrap();
            t.increment(h);
        }
        assert_eq!(
            t.find_or_reserve(mac(3)),
            Err(NanError::exhausted(IdKind::PeerLink))
        );
        // An existing peer still resolves.
        assert!(t.find_or_reserve(mac(2)).is_ok());
    }

    #[test]
    fn test_interface_index_and_active_links() {
        let mut t = PeerLinkTable::new(4, 5);
        let a = t.find_or_reserve(mac(1)).unwrap();
        t.increment(a);
        let b = t.find_or_reserve(mac(2)).unwrap();
        t.increment(b);
        assert_eq!(t.interface_index(a), 5);
        assert_eq!(t.interface_index(b), 6);

        let active: Vec<_> = t.active_links().map(|(h, _)| h).collect();
        assert_eq!(active, vec![a, b]);

        t.clear();
        assert_eq!(t.active_links().count(), 0);
    }
}
