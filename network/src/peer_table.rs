//! The peer table.
//!
//! Tracks known peers with contact freshness. Every stored endpoint is IPv6
//! and never satisfies the reserved-address predicate; bad input (reserved,
//! unspecified, self) is silently rejected. A primary endpoint map is kept in
//! sync with an auxiliary index ordered by last contact, which serves the
//! freshness purge.

use std::collections::{BTreeSet, HashMap};
use std::net::{SocketAddr, SocketAddrV6};
use std::sync::Mutex;
use std::time::Duration;

use lattice_messages::{map_endpoint, reserved_address, unspecified_endpoint, KEEPALIVE_PEERS};
use lattice_types::{BlockHash, Timestamp};
use rand::seq::SliceRandom;
use rand::Rng;

/// Backoff before a peer is retried for bootstrap.
const BOOTSTRAP_FAILURE_BACKOFF: Duration = Duration::from_secs(15 * 60);

/// Everything known about one peer.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub endpoint: SocketAddrV6,
    pub last_contact: Timestamp,
    pub last_attempt: Timestamp,
    pub last_bootstrap_failure: Timestamp,
    /// The most recent block hash this peer told us about.
    pub most_recent: BlockHash,
}

type PeerObserver = Box<dyn Fn(SocketAddrV6) + Send + Sync>;
type DisconnectObserver = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct PeerState {
    peers: HashMap<SocketAddrV6, PeerInfo>,
    /// Auxiliary index ordered by `(last_contact, endpoint)`.
    by_contact: BTreeSet<(Timestamp, SocketAddrV6)>,
}

impl PeerState {
    fn touch(&mut self, endpoint: SocketAddrV6, hash: BlockHash, now: Timestamp) {
        if let Some(info) = self.peers.get_mut(&endpoint) {
            self.by_contact.remove(&(info.last_contact, endpoint));
            info.last_contact = now;
            info.most_recent = hash;
            self.by_contact.insert((now, endpoint));
        }
    }
}

/// The set of known peers.
pub struct PeerTable {
    state: Mutex<PeerState>,
    self_endpoint: SocketAddrV6,
    cutoff: Duration,
    peer_observer: Mutex<Option<PeerObserver>>,
    disconnect_observer: Mutex<Option<DisconnectObserver>>,
}

impl PeerTable {
    pub fn new(self_endpoint: SocketAddrV6, cutoff: Duration) -> Self {
        Self {
            state: Mutex::new(PeerState::default()),
            self_endpoint,
            cutoff,
            peer_observer: Mutex::new(None),
            disconnect_observer: Mutex::new(None),
        }
    }

    /// Called with each newly discovered peer.
    pub fn set_peer_observer(&self, observer: PeerObserver) {
        *self.peer_observer.lock().expect("observer lock poisoned") = Some(observer);
    }

    /// Called when a purge leaves the table empty.
    pub fn set_disconnect_observer(&self, observer: DisconnectObserver) {
        *self
            .disconnect_observer
            .lock()
            .expect("observer lock poisoned") = Some(observer);
    }

    /// Whether `endpoint` must never enter the table.
    pub fn not_a_peer(&self, endpoint: &SocketAddrV6) -> bool {
        endpoint.ip().is_unspecified()
            || reserved_address(endpoint)
            || *endpoint == self.self_endpoint
    }

    /// Record `endpoint` with the most recent hash it communicated. Returns
    /// whether the peer was already known (or the endpoint was rejected).
    /// Fires the peer observer on first contact.
    pub fn insert(&self, endpoint: SocketAddrV6, hash: BlockHash, now: Timestamp) -> bool {
        if self.not_a_peer(&endpoint) {
            return true;
        }
        let known = {
            let mut state = self.state.lock().expect("peer lock poisoned");
            if state.peers.contains_key(&endpoint) {
                state.touch(endpoint, hash, now);
                true
            } else {
                state.peers.insert(
                    endpoint,
                    PeerInfo {
                        endpoint,
                        last_contact: now,
                        last_attempt: now,
                        last_bootstrap_failure: Timestamp::EPOCH,
                        most_recent: hash,
                    },
                );
                state.by_contact.insert((now, endpoint));
                false
            }
        };
        if !known {
            let observer = self.peer_observer.lock().expect("observer lock poisoned");
            if let Some(observer) = observer.as_ref() {
                observer(endpoint);
            }
        }
        known
    }

    /// A datagram arrived from `endpoint`: v4-map it and record contact.
    pub fn contacted(&self, endpoint: SocketAddr, now: Timestamp) {
        self.insert(map_endpoint(endpoint), BlockHash::ZERO, now);
    }

    /// Snapshot of all peers.
    pub fn list(&self) -> Vec<PeerInfo> {
        let state = self.state.lock().expect("peer lock poisoned");
        state.peers.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("peer lock poisoned").peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill the eight keepalive slots with peers sampled uniformly without
    /// replacement, padding unused slots with the unspecified address.
    pub fn random_fill(&self, rng: &mut impl Rng, target: &mut [SocketAddrV6; KEEPALIVE_PEERS]) {
        let mut endpoints: Vec<SocketAddrV6> = {
            let state = self.state.lock().expect("peer lock poisoned");
            state.peers.keys().copied().collect()
        };
        endpoints.shuffle(rng);
        endpoints.truncate(KEEPALIVE_PEERS);
        target.fill(unspecified_endpoint());
        for (slot, endpoint) in target.iter_mut().zip(endpoints) {
            *slot = endpoint;
        }
    }

    /// Remove and return every peer whose last contact is before `cutoff`,
    /// stamping `last_attempt` on the survivors. Fires the disconnect
    /// observer when the table ends up empty.
    pub fn purge_list(&self, cutoff: Timestamp, now: Timestamp) -> Vec<PeerInfo> {
        let (purged, empty) = {
            let mut state = self.state.lock().expect("peer lock poisoned");
            let stale: Vec<SocketAddrV6> = state
                .by_contact
                .range(..(cutoff, unspecified_endpoint()))
                .map(|(_, endpoint)| *endpoint)
                .collect();
            let mut purged = Vec::with_capacity(stale.len());
            for endpoint in stale {
                if let Some(info) = state.peers.remove(&endpoint) {
                    state.by_contact.remove(&(info.last_contact, endpoint));
                    purged.push(info);
                }
            }
            for info in state.peers.values_mut() {
                info.last_attempt = now;
            }
            (purged, state.peers.is_empty())
        };
        if empty {
            let observer = self
                .disconnect_observer
                .lock()
                .expect("observer lock poisoned");
            if let Some(observer) = observer.as_ref() {
                observer();
            }
        }
        purged
    }

    /// Whether this peer's most recent hash is `hash`.
    pub fn knows_about(&self, endpoint: &SocketAddrV6, hash: &BlockHash) -> bool {
        let state = self.state.lock().expect("peer lock poisoned");
        state
            .peers
            .get(endpoint)
            .is_some_and(|info| info.most_recent == *hash)
    }

    /// Whether the peer was contacted within the cutoff window.
    pub fn known_peer(&self, endpoint: &SocketAddrV6, now: Timestamp) -> bool {
        let state = self.state.lock().expect("peer lock poisoned");
        state
            .peers
            .get(endpoint)
            .is_some_and(|info| !info.last_contact.older_than(self.cutoff, now))
    }

    /// Peers whose last bootstrap failure is old enough to retry.
    pub fn bootstrap_candidates(&self, now: Timestamp) -> Vec<PeerInfo> {
        let state = self.state.lock().expect("peer lock poisoned");
        state
            .peers
            .values()
            .filter(|info| {
                info.last_bootstrap_failure == Timestamp::EPOCH
                    || info
                        .last_bootstrap_failure
                        .older_than(BOOTSTRAP_FAILURE_BACKOFF, now)
            })
            .cloned()
            .collect()
    }

    /// Stamp a bootstrap failure on `endpoint`.
    pub fn bootstrap_failed(&self, endpoint: &SocketAddrV6, now: Timestamp) {
        let mut state = self.state.lock().expect("peer lock poisoned");
        if let Some(info) = state.peers.get_mut(endpoint) {
            info.last_bootstrap_failure = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_messages::mapped_v4;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn table() -> PeerTable {
        PeerTable::new(
            mapped_v4(Ipv4Addr::new(127, 0, 0, 1), 7075),
            Duration::from_secs(300),
        )
    }

    fn peer(last: u8, port: u16) -> SocketAddrV6 {
        mapped_v4(Ipv4Addr::new(10, 0, 0, last), port)
    }

    fn ts(millis: u64) -> Timestamp {
        Timestamp::from_millis(millis)
    }

    #[test]
    fn insert_reports_known_status_and_fires_observer() {
        let table = table();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_l = Arc::clone(&seen);
        table.set_peer_observer(Box::new(move |_| {
            seen_l.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!table.insert(peer(1, 7075), BlockHash::ZERO, ts(100)));
        assert!(table.insert(peer(1, 7075), BlockHash::ZERO, ts(200)));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn reserved_self_and_unspecified_rejected() {
        let table = table();
        // Reserved (TEST-NET)
        assert!(table.insert(
            mapped_v4(Ipv4Addr::new(192, 0, 2, 5), 1),
            BlockHash::ZERO,
            ts(1)
        ));
        // Self
        assert!(table.insert(
            mapped_v4(Ipv4Addr::new(127, 0, 0, 1), 7075),
            BlockHash::ZERO,
            ts(1)
        ));
        // Unspecified
        assert!(table.insert(unspecified_endpoint(), BlockHash::ZERO, ts(1)));
        assert!(table.is_empty());
    }

    #[test]
    fn contacted_maps_v4_senders() {
        let table = table();
        table.contacted("10.1.1.1:9000".parse().unwrap(), ts(5));
        let list = table.list();
        assert_eq!(list.len(), 1);
        assert!(list[0].endpoint.ip().to_ipv4_mapped().is_some());
    }

    #[test]
    fn knows_about_tracks_most_recent_hash() {
        let table = table();
        let endpoint = peer(1, 7075);
        let hash = BlockHash::new([7u8; 32]);
        table.insert(endpoint, hash, ts(1));
        assert!(table.knows_about(&endpoint, &hash));
        assert!(!table.knows_about(&endpoint, &BlockHash::ZERO));
        assert!(!table.knows_about(&peer(2, 7075), &hash));
    }

    #[test]
    fn purge_removes_stale_and_stamps_survivors() {
        let table = table();
        table.insert(peer(1, 1), BlockHash::ZERO, ts(1_000));
        table.insert(peer(2, 2), BlockHash::ZERO, ts(50_000));
        let purged = table.purge_list(ts(10_000), ts(60_000));
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].endpoint, peer(1, 1));
        let survivors = table.list();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].last_attempt, ts(60_000));
    }

    #[test]
    fn purge_to_empty_fires_disconnect() {
        let table = table();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_l = Arc::clone(&fired);
        table.set_disconnect_observer(Box::new(move || {
            fired_l.fetch_add(1, Ordering::SeqCst);
        }));
        table.insert(peer(1, 1), BlockHash::ZERO, ts(1_000));
        table.purge_list(ts(10_000), ts(10_000));
        assert!(table.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn known_peer_respects_cutoff() {
        let table = table();
        let endpoint = peer(1, 1);
        table.insert(endpoint, BlockHash::ZERO, ts(1_000));
        assert!(table.known_peer(&endpoint, ts(100_000)));
        assert!(!table.known_peer(&endpoint, ts(1_000_000)));
        assert!(!table.known_peer(&peer(9, 9), ts(1_000)));
    }

    #[test]
    fn random_fill_samples_without_replacement() {
        let table = table();
        for i in 0..12u8 {
            table.insert(peer(i + 1, 7075), BlockHash::ZERO, ts(1));
        }
        let mut rng = StdRng::seed_from_u64(42);
        let mut slots = [unspecified_endpoint(); KEEPALIVE_PEERS];
        table.random_fill(&mut rng, &mut slots);

        let known: Vec<SocketAddrV6> = table.list().iter().map(|p| p.endpoint).collect();
        let mut seen = std::collections::HashSet::new();
        for slot in &slots {
            assert!(known.contains(slot), "sampled endpoint not in table");
            assert!(seen.insert(*slot), "duplicate endpoint in sample");
        }
    }

    #[test]
    fn random_fill_pads_with_unspecified() {
        let table = table();
        table.insert(peer(1, 7075), BlockHash::ZERO, ts(1));
        let mut rng = StdRng::seed_from_u64(42);
        let mut slots = [unspecified_endpoint(); KEEPALIVE_PEERS];
        table.random_fill(&mut rng, &mut slots);
        let filled = slots.iter().filter(|s| !s.ip().is_unspecified()).count();
        assert_eq!(filled, 1);
    }

    #[test]
    fn bootstrap_failure_backoff() {
        let table = table();
        let endpoint = peer(1, 1);
        table.insert(endpoint, BlockHash::ZERO, ts(1));
        assert_eq!(table.bootstrap_candidates(ts(100)).len(), 1);

        table.bootstrap_failed(&endpoint, ts(100));
        assert!(table.bootstrap_candidates(ts(200)).is_empty());

        // After the 15-minute backoff the peer is a candidate again
        let later = ts(100 + 15 * 60 * 1_000 + 1);
        assert_eq!(table.bootstrap_candidates(later).len(), 1);
    }
}
