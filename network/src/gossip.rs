//! Message-level gossip over the UDP transport.
//!
//! Builds and addresses keepalives, publishes, confirm requests, and signed
//! confirm acknowledgments, consulting the peer table's knows-about
//! predicate to avoid telling peers what they already told us.

use std::net::SocketAddrV6;
use std::sync::{Arc, Mutex};

use lattice_consensus::{RepresentativeSet, Vote};
use lattice_ledger::Block;
use lattice_messages::{
    serialize_message, ConfirmAck, ConfirmReq, Keepalive, Message, Publish,
};
use lattice_types::NetworkId;
use rand::rngs::StdRng;

use crate::peer_table::PeerTable;
use crate::udp::UdpService;

/// Outbound message construction and fan-out.
pub struct Gossip {
    udp: Arc<UdpService>,
    peers: Arc<PeerTable>,
    representatives: Arc<RepresentativeSet>,
    network_id: NetworkId,
    rng: Mutex<StdRng>,
}

impl Gossip {
    pub fn new(
        udp: Arc<UdpService>,
        peers: Arc<PeerTable>,
        representatives: Arc<RepresentativeSet>,
        network_id: NetworkId,
        rng: StdRng,
    ) -> Self {
        Self {
            udp,
            peers,
            representatives,
            network_id,
            rng: Mutex::new(rng),
        }
    }

    fn send_message(&self, message: &Message, endpoint: SocketAddrV6, rebroadcast: u32) {
        let bytes = match serialize_message(self.network_id, message) {
            Ok(bytes) => Arc::new(bytes),
            Err(error) => {
                tracing::error!(%error, "message serialization failed");
                return;
            }
        };
        self.udp.send_buffer(
            bytes,
            endpoint,
            rebroadcast,
            Some(Box::new(move |result| {
                if let Err(error) = result {
                    tracing::warn!(%endpoint, %error, "error sending packet");
                }
            })),
        );
    }

    /// Send a keepalive carrying a random sample of our peers.
    pub fn send_keepalive(&self, endpoint: SocketAddrV6) {
        let mut keepalive = Keepalive::default();
        {
            let mut rng = self.rng.lock().expect("gossip rng poisoned");
            self.peers.random_fill(&mut *rng, &mut keepalive.peers);
        }
        tracing::trace!(to = %endpoint, "keepalive sent");
        self.send_message(&Message::Keepalive(keepalive), endpoint, 0);
    }

    /// Republish a block: representatives answer with a signed confirm_ack
    /// to every peer that does not already know the hash; everyone else
    /// floods a publish instead.
    pub fn republish_block(&self, block: &Arc<Block>, rebroadcast: u32) {
        let hash = block.hash();
        let list = self.peers.list();
        if self.confirm_broadcast(&list, block, 0, rebroadcast) {
            tracing::debug!(block = %hash, "block confirmed to peers");
            return;
        }
        let message = Message::Publish(Publish {
            block: Arc::clone(block),
        });
        for peer in &list {
            if !self.peers.knows_about(&peer.endpoint, &hash) {
                self.send_message(&message, peer.endpoint, rebroadcast);
            }
        }
        tracing::debug!(block = %hash, peers = list.len(), "block published to peers");
    }

    /// If this node holds representative keys, unicast a signed confirm_ack
    /// for `block` to every listed peer that does not know the hash.
    /// Returns whether anything was sent.
    pub fn confirm_broadcast(
        &self,
        list: &[crate::peer_table::PeerInfo],
        block: &Arc<Block>,
        sequence: u64,
        rebroadcast: u32,
    ) -> bool {
        let hash = block.hash();
        let votes = self.representatives.generate_votes(block, sequence);
        let mut sent = false;
        for vote in votes {
            for peer in list {
                if !self.peers.knows_about(&peer.endpoint, &hash) {
                    self.confirm_block(vote.clone(), peer.endpoint, rebroadcast);
                    sent = true;
                }
            }
        }
        sent
    }

    /// Unicast one signed confirm_ack.
    pub fn confirm_block(&self, vote: Vote, endpoint: SocketAddrV6, rebroadcast: u32) {
        tracing::trace!(block = %vote.block.hash(), to = %endpoint, "confirm_ack sent");
        self.send_message(
            &Message::ConfirmAck(ConfirmAck { vote }),
            endpoint,
            rebroadcast,
        );
    }

    /// Announce an election winner to every peer.
    pub fn broadcast_winner(&self, winner: &Arc<Block>, sequence: u64) {
        let list = self.peers.list();
        self.confirm_broadcast(&list, winner, sequence, 0);
    }

    pub fn send_confirm_req(&self, endpoint: SocketAddrV6, block: &Arc<Block>) {
        tracing::trace!(to = %endpoint, "confirm_req sent");
        self.send_message(
            &Message::ConfirmReq(ConfirmReq {
                block: Arc::clone(block),
            }),
            endpoint,
            0,
        );
    }

    /// Ask every peer to vote on `block`.
    pub fn broadcast_confirm_req(&self, block: &Arc<Block>) {
        for peer in self.peers.list() {
            self.send_confirm_req(peer.endpoint, block);
        }
    }
}
