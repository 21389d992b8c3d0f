//! Event fan-out registries.
//!
//! Five independent registries, each a list of callables guarded by one
//! mutex. Registration and invocation are serialized under that mutex, so a
//! callback must not synchronously re-register on the same thread; it may
//! schedule work onto the executor instead.

use std::net::SocketAddrV6;
use std::sync::{Arc, Mutex};

use lattice_consensus::Vote;
use lattice_ledger::Block;
use lattice_types::{Account, Amount};

type BlockObserver = Box<dyn Fn(&Arc<Block>, &Account, Amount) + Send>;
type WalletObserver = Box<dyn Fn(&Account, bool) + Send>;
type VoteObserver = Box<dyn Fn(&Vote) + Send>;
type EndpointObserver = Box<dyn Fn(SocketAddrV6) + Send>;
type DisconnectObserver = Box<dyn Fn() + Send>;

/// The node's observer registries.
#[derive(Default)]
pub struct Observers {
    blocks: Mutex<Vec<BlockObserver>>,
    wallet: Mutex<Vec<WalletObserver>>,
    vote: Mutex<Vec<VoteObserver>>,
    endpoint: Mutex<Vec<EndpointObserver>>,
    disconnect: Mutex<Vec<DisconnectObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_blocks(&self, observer: impl Fn(&Arc<Block>, &Account, Amount) + Send + 'static) {
        self.blocks
            .lock()
            .expect("observer lock poisoned")
            .push(Box::new(observer));
    }

    pub fn add_wallet(&self, observer: impl Fn(&Account, bool) + Send + 'static) {
        self.wallet
            .lock()
            .expect("observer lock poisoned")
            .push(Box::new(observer));
    }

    pub fn add_vote(&self, observer: impl Fn(&Vote) + Send + 'static) {
        self.vote
            .lock()
            .expect("observer lock poisoned")
            .push(Box::new(observer));
    }

    pub fn add_endpoint(&self, observer: impl Fn(SocketAddrV6) + Send + 'static) {
        self.endpoint
            .lock()
            .expect("observer lock poisoned")
            .push(Box::new(observer));
    }

    pub fn add_disconnect(&self, observer: impl Fn() + Send + 'static) {
        self.disconnect
            .lock()
            .expect("observer lock poisoned")
            .push(Box::new(observer));
    }

    pub fn call_blocks(&self, block: &Arc<Block>, account: &Account, amount: Amount) {
        for observer in self.blocks.lock().expect("observer lock poisoned").iter() {
            observer(block, account, amount);
        }
    }

    pub fn call_wallet(&self, account: &Account, active: bool) {
        for observer in self.wallet.lock().expect("observer lock poisoned").iter() {
            observer(account, active);
        }
    }

    pub fn call_vote(&self, vote: &Vote) {
        for observer in self.vote.lock().expect("observer lock poisoned").iter() {
            observer(vote);
        }
    }

    pub fn call_endpoint(&self, endpoint: SocketAddrV6) {
        for observer in self.endpoint.lock().expect("observer lock poisoned").iter() {
            observer(endpoint);
        }
    }

    pub fn call_disconnect(&self) {
        for observer in self
            .disconnect
            .lock()
            .expect("observer lock poisoned")
            .iter()
        {
            observer();
        }
    }
}
