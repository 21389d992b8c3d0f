//! The node facade.
//!
//! Owns every subsystem and drives the periodic work: the receive/dispatch
//! pipeline, the keepalive cycle, and the vote announcement rounds. Leaves
//! never hold the node; recurring callbacks capture weak references and stop
//! firing once the node is dropped or stopped.

use std::net::{SocketAddr, SocketAddrV6};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lattice_consensus::{ActiveTransactions, RepresentativeSet, Vote};
use lattice_ledger::{Block, Ledger};
use lattice_messages::{map_endpoint, Message, KEEPALIVE_PEERS};
use lattice_network::{Gossip, NetworkStats, PeerTable, Scheduler, UdpService};
use lattice_store::{MemStore, StoreRead};
use lattice_types::{Account, Amount, BlockHash, NetworkId, Timestamp};
use lattice_work::{network_threshold, WorkPool};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;

use crate::alarm::Alarm;
use crate::bootstrap::{BootstrapInitiator, LogBootstrap};
use crate::config::NodeConfig;
use crate::gap_cache::{GapCache, MAX_GAP};
use crate::observers::Observers;
use crate::processor::BlockProcessor;
use crate::{genesis_account, NodeError, GENESIS_AMOUNT};

/// Capacity of the inbound datagram channel.
const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// A running lattice node.
pub struct Node {
    pub config: NodeConfig,
    pub network_id: NetworkId,
    pub ledger: Arc<Ledger>,
    pub peers: Arc<PeerTable>,
    pub udp: Arc<UdpService>,
    pub gossip: Arc<Gossip>,
    pub alarm: Arc<Alarm>,
    pub gap_cache: Arc<GapCache>,
    pub active: Arc<ActiveTransactions>,
    pub observers: Arc<Observers>,
    pub representatives: Arc<RepresentativeSet>,
    pub bootstrap_initiator: Arc<dyn BootstrapInitiator>,
    pub work: Arc<WorkPool>,
    pub processor: Arc<BlockProcessor>,
    pub stats: Arc<NetworkStats>,
    scheduler: Scheduler,
    stopped: AtomicBool,
}

impl Node {
    /// Construct a node, binding its UDP socket. Must run inside a Tokio
    /// runtime; background tasks begin with [`Node::start`].
    pub async fn new(config: NodeConfig, network_id: NetworkId) -> Result<Arc<Self>, NodeError> {
        let handle = tokio::runtime::Handle::current();
        let alarm = Alarm::new(handle);
        let scheduler: Scheduler = {
            let alarm = Arc::clone(&alarm);
            Arc::new(move |delay, task| alarm.add_delayed(delay, task))
        };

        let stats = Arc::new(NetworkStats::new());
        let threshold = network_threshold(network_id);
        let udp = UdpService::bind(
            config.peering_port,
            network_id,
            threshold,
            Duration::from_micros(u64::from(config.packet_delay_microseconds)),
            Duration::from_secs(u64::from(config.rebroadcast_delay)),
            Arc::clone(&scheduler),
            Arc::clone(&stats),
        )
        .await?;

        let store = Arc::new(MemStore::new());
        let ledger = Arc::new(Ledger::new(
            store,
            genesis_account(network_id),
            GENESIS_AMOUNT,
            config.inactive_supply,
        ));
        ledger.initialize();

        let peers = Arc::new(PeerTable::new(
            udp.local_endpoint(),
            network_id.peer_cutoff(),
        ));
        let representatives = Arc::new(RepresentativeSet::new());
        let gossip = Arc::new(Gossip::new(
            Arc::clone(&udp),
            Arc::clone(&peers),
            Arc::clone(&representatives),
            network_id,
            StdRng::from_entropy(),
        ));
        let gap_cache = Arc::new(GapCache::new(MAX_GAP));
        let active = Arc::new(ActiveTransactions::new());
        let observers = Arc::new(Observers::new());
        let bootstrap_initiator: Arc<dyn BootstrapInitiator> = Arc::new(LogBootstrap);
        let work = Arc::new(WorkPool::new(
            threshold,
            config.work_threads as usize,
            config.work_peers.clone(),
        ));
        let processor = Arc::new(BlockProcessor::new(
            Arc::clone(&ledger),
            Arc::clone(&gap_cache),
            Arc::clone(&active),
            Arc::clone(&gossip),
            Arc::clone(&observers),
            config.logging.clone(),
        ));

        // Votes feed both the election engine and the gap cache
        {
            let active = Arc::clone(&active);
            let ledger = Arc::clone(&ledger);
            observers.add_vote(move |vote| active.vote(vote, &ledger));
        }
        {
            let gap_cache = Arc::clone(&gap_cache);
            let ledger = Arc::clone(&ledger);
            let scheduler = Arc::clone(&scheduler);
            let bootstrap = Arc::clone(&bootstrap_initiator);
            let numerator = config.bootstrap_fraction_numerator;
            let delay = network_id.gap_bootstrap_delay();
            observers.add_vote(move |vote| {
                let txn = ledger.store().tx_begin_read();
                gap_cache.vote(&txn, vote, &ledger, &scheduler, &bootstrap, numerator, delay);
            });
        }
        // Newly discovered peers get a keepalive straight away
        {
            let gossip = Arc::downgrade(&gossip);
            observers.add_endpoint(move |endpoint| {
                if let Some(gossip) = gossip.upgrade() {
                    gossip.send_keepalive(endpoint);
                }
            });
        }
        // Peer-table events fan out through the observer registries
        {
            let observers_weak = Arc::downgrade(&observers);
            peers.set_peer_observer(Box::new(move |endpoint| {
                if let Some(observers) = observers_weak.upgrade() {
                    observers.call_endpoint(endpoint);
                }
            }));
        }
        {
            let observers_weak = Arc::downgrade(&observers);
            peers.set_disconnect_observer(Box::new(move || {
                if let Some(observers) = observers_weak.upgrade() {
                    observers.call_disconnect();
                }
            }));
        }

        tracing::info!(
            network = network_id.as_str(),
            port = udp.port(),
            "node constructed"
        );

        Ok(Arc::new(Self {
            config,
            network_id,
            ledger,
            peers,
            udp,
            gossip,
            alarm,
            gap_cache,
            active,
            observers,
            representatives,
            bootstrap_initiator,
            work,
            processor,
            stats,
            scheduler,
            stopped: AtomicBool::new(false),
        }))
    }

    /// Start the receive loop, dispatch task, keepalive cycle, and vote
    /// announcements.
    pub fn start(self: &Arc<Self>) {
        let (inbound_tx, mut inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        tokio::spawn(Arc::clone(&self.udp).run_receive_loop(inbound_tx));

        let node = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some((sender, message)) = inbound_rx.recv().await {
                let Some(node) = node.upgrade() else {
                    break;
                };
                if node.is_stopped() {
                    break;
                }
                node.dispatch_message(sender, message);
            }
        });

        self.ongoing_keepalive();
        self.announce_votes();
    }

    pub fn stop(&self) {
        tracing::info!("node stopping");
        self.stopped.store(true, Ordering::SeqCst);
        self.active.clear();
        self.udp.stop();
        self.alarm.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// The scheduler handle leaves use for delayed work.
    pub fn scheduler(&self) -> Scheduler {
        Arc::clone(&self.scheduler)
    }

    /// Dispatch one wire message from `sender`.
    ///
    /// # Panics
    ///
    /// Panics on bootstrap-only message types: their presence on the UDP
    /// path is a protocol bug.
    pub fn dispatch_message(self: &Arc<Self>, sender: SocketAddrV6, message: Message) {
        let logging = &self.config.logging;
        let now = Timestamp::now();
        match message {
            Message::Keepalive(keepalive) => {
                if logging.network_keepalive_logging() {
                    tracing::trace!(from = %sender, "keepalive received");
                }
                self.stats.keepalive.inc();
                self.peers.contacted(SocketAddr::V6(sender), now);
                self.merge_peers(&keepalive.peers, now);
            }
            Message::Publish(publish) => {
                if logging.network_message_logging() {
                    tracing::trace!(from = %sender, block = %publish.block.hash(), "publish received");
                }
                self.stats.publish.inc();
                self.peers.contacted(SocketAddr::V6(sender), now);
                self.peers.insert(sender, publish.block.hash(), now);
                self.processor.process_receive_republish(publish.block, 0);
            }
            Message::ConfirmReq(request) => {
                if logging.network_message_logging() {
                    tracing::trace!(from = %sender, "confirm_req received");
                }
                self.stats.confirm_req.inc();
                let hash = request.block.hash();
                self.peers.contacted(SocketAddr::V6(sender), now);
                self.peers.insert(sender, hash, now);
                self.processor
                    .process_receive_republish(Arc::clone(&request.block), 0);
                let exists = {
                    let txn = self.ledger.store().tx_begin_read();
                    txn.block_exists(&hash)
                };
                if exists {
                    self.process_confirmation(&request.block, sender);
                }
            }
            Message::ConfirmAck(ack) => {
                if logging.network_message_logging() {
                    tracing::trace!(from = %sender, "confirm_ack received");
                }
                self.stats.confirm_ack.inc();
                if !ack.vote.validate() {
                    self.stats.parse_error.inc();
                    return;
                }
                self.peers.contacted(SocketAddr::V6(sender), now);
                self.peers.insert(sender, ack.vote.block.hash(), now);
                self.processor
                    .process_receive_republish(Arc::clone(&ack.vote.block), 0);
                self.vote(&ack.vote);
            }
            Message::BulkPull | Message::BulkPush | Message::FrontierReq => {
                panic!("bootstrap message received on the UDP path");
            }
        }
    }

    /// Inject a message as if it had arrived from `sender`. Shares the UDP
    /// visitor, counters included.
    pub fn process_message(self: &Arc<Self>, message: Message, sender: SocketAddrV6) {
        self.dispatch_message(sender, message);
    }

    /// Send keepalives to attached endpoints we do not already know.
    fn merge_peers(&self, endpoints: &[SocketAddrV6; KEEPALIVE_PEERS], now: Timestamp) {
        for endpoint in endpoints {
            if !self.peers.not_a_peer(endpoint) && !self.peers.known_peer(endpoint, now) {
                self.gossip.send_keepalive(*endpoint);
            }
        }
    }

    /// Answer a confirm_req with a signed confirm_ack per held
    /// representative key.
    fn process_confirmation(&self, block: &Arc<Block>, sender: SocketAddrV6) {
        for vote in self.representatives.generate_votes(block, 0) {
            if self.config.logging.network_message_logging() {
                tracing::trace!(to = %sender, "sending confirm_ack");
            }
            self.gossip.confirm_block(vote, sender, 0);
        }
    }

    /// Deliver a vote to the observers (election engine and gap cache).
    pub fn vote(&self, vote: &Vote) {
        self.observers.call_vote(vote);
    }

    /// Resolve `host` and send a keepalive to every resulting endpoint.
    pub fn keepalive(self: &Arc<Self>, host: String, port: u16) {
        let gossip = Arc::clone(&self.gossip);
        tokio::spawn(async move {
            match tokio::net::lookup_host((host.as_str(), port)).await {
                Ok(addresses) => {
                    for address in addresses {
                        gossip.send_keepalive(map_endpoint(address));
                    }
                }
                Err(error) => {
                    tracing::warn!(%host, port, %error, "error resolving address");
                }
            }
        });
    }

    fn keepalive_preconfigured(self: &Arc<Self>) {
        for host in &self.config.preconfigured_peers {
            self.keepalive(host.clone(), self.network_id.default_port());
        }
    }

    /// One keepalive cycle: contact preconfigured peers, purge the stale,
    /// and ping purged peers that have not been attempted recently.
    fn ongoing_keepalive(self: &Arc<Self>) {
        self.keepalive_preconfigured();
        let now = Timestamp::now();
        let period = self.network_id.keepalive_period();
        let cutoff = now.saturating_sub(self.network_id.peer_cutoff());
        for peer in self.peers.purge_list(cutoff, now) {
            if peer.last_attempt.older_than(period, now) {
                self.gossip.send_keepalive(peer.endpoint);
            }
        }
        let weak = Arc::downgrade(self);
        self.alarm.add_delayed(period, move || {
            if let Some(node) = weak.upgrade() {
                if !node.is_stopped() {
                    node.ongoing_keepalive();
                }
            }
        });
    }

    /// One announcement round, rescheduling itself on the network cadence.
    fn announce_votes(self: &Arc<Self>) {
        {
            let representatives = Arc::clone(&self.representatives);
            let gossip = Arc::clone(&self.gossip);
            self.active.announce_round(
                &self.ledger,
                move |winner, sequence| representatives.generate_votes(winner, sequence),
                move |winner, sequence| gossip.broadcast_winner(&winner, sequence),
            );
        }
        let weak = Arc::downgrade(self);
        self.alarm
            .add_delayed(self.network_id.announce_interval(), move || {
                if let Some(node) = weak.upgrade() {
                    if !node.is_stopped() {
                        node.announce_votes();
                    }
                }
            });
    }

    /// Attach proof-of-work to a block, racing work peers when configured.
    pub async fn generate_work(&self, block: &mut Block) {
        let nonce = self.work.generate(block.root()).await;
        block.set_work(nonce);
    }

    pub fn latest(&self, account: &Account) -> Option<BlockHash> {
        let txn = self.ledger.store().tx_begin_read();
        self.ledger.latest(&txn, account)
    }

    pub fn balance(&self, account: &Account) -> Amount {
        let txn = self.ledger.store().tx_begin_read();
        self.ledger.account_balance(&txn, account)
    }

    pub fn weight(&self, account: &Account) -> Amount {
        let txn = self.ledger.store().tx_begin_read();
        self.ledger.weight(&txn, account)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if self.config.logging.node_lifetime_tracing {
            tracing::debug!("destructing node");
        }
    }
}
