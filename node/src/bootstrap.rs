//! Seam to the bootstrap subsystem.
//!
//! Catch-up of missing ledger history runs outside the core; the core only
//! ever asks it to start a pull from any available peer.

/// The single call the core makes into bootstrap.
pub trait BootstrapInitiator: Send + Sync {
    fn bootstrap_any(&self);
}

/// Stand-in initiator that records the request.
pub struct LogBootstrap;

impl BootstrapInitiator for LogBootstrap {
    fn bootstrap_any(&self) {
        tracing::info!("bootstrap requested");
    }
}
