//! Network counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for one event kind.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Counts of received messages and of dropped datagrams.
#[derive(Default)]
pub struct NetworkStats {
    pub keepalive: Counter,
    pub publish: Counter,
    pub confirm_req: Counter,
    pub confirm_ack: Counter,
    /// Datagrams from reserved senders or ourselves.
    pub bad_sender: Counter,
    /// Datagrams that failed to parse.
    pub parse_error: Counter,
    /// Blocks whose proof-of-work missed the threshold.
    pub insufficient_work: Counter,
}

impl NetworkStats {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment() {
        let stats = NetworkStats::new();
        assert_eq!(stats.bad_sender.get(), 0);
        stats.bad_sender.inc();
        stats.bad_sender.inc();
        assert_eq!(stats.bad_sender.get(), 2);
        assert_eq!(stats.publish.get(), 0);
    }
}
