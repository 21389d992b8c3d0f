//! The UDP transport.
//!
//! One socket bound on the v6-any address. Incoming datagrams are screened
//! (reserved sender, parse, proof-of-work), counted, and handed to the
//! dispatch channel. Outgoing datagrams flow through a FIFO queue with
//! inter-packet pacing; packets with a remaining rebroadcast count are
//! re-enqueued through the scheduler after the rebroadcast delay. Every
//! send callback receives exactly one terminal invocation.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lattice_messages::{deserialize_message, map_endpoint, reserved_address, Message};
use lattice_types::NetworkId;
use lattice_work::work_validate;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::stats::NetworkStats;

/// A deferred callback, posted through the node's alarm.
pub type Task = Box<dyn FnOnce() + Send>;

/// Schedules a task to run after a delay. The narrow capability handed to
/// leaves instead of the alarm itself.
pub type Scheduler = Arc<dyn Fn(Duration, Task) + Send + Sync>;

/// Invoked once with the terminal result of a send (after the last
/// rebroadcast, or immediately when the rebroadcast count is zero).
pub type SendCallback = Box<dyn FnOnce(io::Result<usize>) + Send>;

/// Delay before a failed receive loop re-arms.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(5);

struct SendSlot {
    buffer: Arc<Vec<u8>>,
    endpoint: SocketAddrV6,
    rebroadcast: u32,
    callback: Option<SendCallback>,
}

#[derive(Default)]
struct SendQueue {
    slots: VecDeque<SendSlot>,
    pumping: bool,
}

/// The bound UDP socket plus its send queue.
pub struct UdpService {
    socket: UdpSocket,
    local: SocketAddrV6,
    network_id: NetworkId,
    work_threshold: u64,
    packet_delay: Duration,
    rebroadcast_delay: Duration,
    scheduler: Scheduler,
    stats: Arc<NetworkStats>,
    queue: Mutex<SendQueue>,
    on: AtomicBool,
    handle: tokio::runtime::Handle,
}

impl UdpService {
    /// Bind on `[::]:port`.
    #[allow(clippy::too_many_arguments)]
    pub async fn bind(
        port: u16,
        network_id: NetworkId,
        work_threshold: u64,
        packet_delay: Duration,
        rebroadcast_delay: Duration,
        scheduler: Scheduler,
        stats: Arc<NetworkStats>,
    ) -> io::Result<Arc<Self>> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port))).await?;
        let bound_port = socket.local_addr()?.port();
        Ok(Arc::new(Self {
            socket,
            local: SocketAddrV6::new(Ipv6Addr::LOCALHOST, bound_port, 0, 0),
            network_id,
            work_threshold,
            packet_delay,
            rebroadcast_delay,
            scheduler,
            stats,
            queue: Mutex::new(SendQueue::default()),
            on: AtomicBool::new(true),
            handle: tokio::runtime::Handle::current(),
        }))
    }

    pub fn port(&self) -> u16 {
        self.local.port()
    }

    /// The loopback view of this socket, used for the self-sender check.
    pub fn local_endpoint(&self) -> SocketAddrV6 {
        self.local
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Stop receiving. A wakeup datagram unblocks the receive loop.
    pub fn stop(&self) {
        self.on.store(false, Ordering::SeqCst);
        let _ = self.socket.try_send_to(&[], SocketAddr::V6(self.local));
    }

    /// Screen one datagram: reserved/self senders and unparseable or
    /// under-worked messages are counted and dropped.
    pub fn screen_datagram(&self, sender: SocketAddrV6, bytes: &[u8]) -> Option<Message> {
        if reserved_address(&sender) || sender == self.local {
            tracing::debug!(%sender, "reserved sender");
            self.stats.bad_sender.inc();
            return None;
        }
        match deserialize_message(self.network_id, bytes) {
            Ok(message) => {
                if let Some(block) = message.work_checked_block() {
                    if !work_validate(&block.root(), block.work(), self.work_threshold) {
                        tracing::debug!(block = %block.hash(), "insufficient work in message");
                        self.stats.insufficient_work.inc();
                        return None;
                    }
                }
                Some(message)
            }
            Err(error) => {
                tracing::debug!(%sender, %error, "datagram parse failed");
                self.stats.parse_error.inc();
                None
            }
        }
    }

    /// Receive datagrams until stopped, handing screened messages to
    /// `inbound`. A socket error re-arms the loop through the scheduler
    /// after five seconds.
    pub async fn run_receive_loop(
        self: Arc<Self>,
        inbound: mpsc::Sender<(SocketAddrV6, Message)>,
    ) {
        let mut buffer = vec![0u8; 65_536];
        while self.on.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut buffer).await {
                Ok((size, address)) => {
                    if !self.on.load(Ordering::SeqCst) {
                        break;
                    }
                    let sender = map_endpoint(address);
                    if let Some(message) = self.screen_datagram(sender, &buffer[..size]) {
                        if inbound.send((sender, message)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "receive error");
                    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
                    (self.scheduler)(
                        RECEIVE_RETRY_DELAY,
                        Box::new(move || {
                            let _ = tx.send(());
                        }),
                    );
                    let _ = rx.await;
                }
            }
        }
        tracing::debug!("receive loop stopped");
    }

    /// Queue one datagram. The queue drains in FIFO order with
    /// `packet_delay` pacing; if `rebroadcast > 0` the packet is re-enqueued
    /// after the rebroadcast delay with the count decremented, carrying the
    /// callback along to its final transmission.
    pub fn send_buffer(
        self: &Arc<Self>,
        buffer: Arc<Vec<u8>>,
        endpoint: SocketAddrV6,
        rebroadcast: u32,
        callback: Option<SendCallback>,
    ) {
        let start_pump = {
            let mut queue = self.queue.lock().expect("send queue poisoned");
            queue.slots.push_back(SendSlot {
                buffer,
                endpoint,
                rebroadcast,
                callback,
            });
            if queue.pumping {
                false
            } else {
                queue.pumping = true;
                true
            }
        };
        if start_pump {
            let service = Arc::clone(self);
            self.handle.spawn(async move {
                service.run_send_queue().await;
            });
        }
    }

    async fn run_send_queue(self: Arc<Self>) {
        loop {
            let front = {
                let mut queue = self.queue.lock().expect("send queue poisoned");
                if queue.slots.is_empty() {
                    queue.pumping = false;
                    None
                } else {
                    let slot = &queue.slots[0];
                    Some((Arc::clone(&slot.buffer), slot.endpoint))
                }
            };
            let Some((buffer, endpoint)) = front else {
                return;
            };
            let result = self
                .socket
                .send_to(&buffer, SocketAddr::V6(endpoint))
                .await;

            let (slot, more) = {
                let mut queue = self.queue.lock().expect("send queue poisoned");
                let slot = queue.slots.pop_front().expect("send queue underflow");
                let more = !queue.slots.is_empty();
                if !more {
                    queue.pumping = false;
                }
                (slot, more)
            };

            if slot.rebroadcast > 0 {
                let service = Arc::clone(&self);
                let delay = self.rebroadcast_delay;
                (self.scheduler)(
                    delay,
                    Box::new(move || {
                        service.send_buffer(
                            slot.buffer,
                            slot.endpoint,
                            slot.rebroadcast - 1,
                            slot.callback,
                        );
                    }),
                );
            } else if let Some(callback) = slot.callback {
                callback(result);
            }

            if !more {
                return;
            }
            tokio::time::sleep(self.packet_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_messages::{mapped_v4, serialize_message, Keepalive};
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicUsize;

    fn test_scheduler() -> Scheduler {
        Arc::new(|_delay, task: Task| task())
    }

    async fn service() -> Arc<UdpService> {
        UdpService::bind(
            0,
            NetworkId::Test,
            0, // no work requirement in transport tests
            Duration::from_micros(100),
            Duration::from_millis(10),
            test_scheduler(),
            Arc::new(NetworkStats::new()),
        )
        .await
        .expect("bind")
    }

    fn keepalive_bytes() -> Vec<u8> {
        serialize_message(NetworkId::Test, &Message::Keepalive(Keepalive::default()))
            .expect("serialize")
    }

    #[tokio::test]
    async fn reserved_sender_counted_and_dropped() {
        let service = service().await;
        let sender = mapped_v4(Ipv4Addr::new(192, 0, 2, 5), 12345);
        assert!(service.screen_datagram(sender, &keepalive_bytes()).is_none());
        assert_eq!(service.stats().bad_sender.get(), 1);
        assert_eq!(service.stats().parse_error.get(), 0);
    }

    #[tokio::test]
    async fn self_sender_counted_and_dropped() {
        let service = service().await;
        let local = service.local_endpoint();
        assert!(service.screen_datagram(local, &keepalive_bytes()).is_none());
        assert_eq!(service.stats().bad_sender.get(), 1);
    }

    #[tokio::test]
    async fn parse_failure_counted() {
        let service = service().await;
        let sender = mapped_v4(Ipv4Addr::new(10, 0, 0, 1), 7000);
        assert!(service.screen_datagram(sender, &[1, 2, 3]).is_none());
        assert_eq!(service.stats().parse_error.get(), 1);
    }

    #[tokio::test]
    async fn valid_datagram_passes_screen() {
        let service = service().await;
        let sender = mapped_v4(Ipv4Addr::new(10, 0, 0, 1), 7000);
        let message = service.screen_datagram(sender, &keepalive_bytes());
        assert!(matches!(message, Some(Message::Keepalive(_))));
        assert_eq!(service.stats().bad_sender.get(), 0);
    }

    #[tokio::test]
    async fn sends_are_delivered_in_order() {
        let sender = service().await;
        let receiver = service().await;
        let receiver_endpoint =
            SocketAddrV6::new(Ipv6Addr::LOCALHOST, receiver.port(), 0, 0);

        let (tx, mut rx) = mpsc::channel(8);
        tokio::spawn(Arc::clone(&receiver).run_receive_loop(tx));

        for _ in 0..3 {
            sender.send_buffer(Arc::new(keepalive_bytes()), receiver_endpoint, 0, None);
        }
        for _ in 0..3 {
            let (_, message) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            assert!(matches!(message, Message::Keepalive(_)));
        }
    }

    #[tokio::test]
    async fn callback_fires_exactly_once_after_rebroadcasts() {
        let sender = service().await;
        let receiver = service().await;
        let receiver_endpoint =
            SocketAddrV6::new(Ipv6Addr::LOCALHOST, receiver.port(), 0, 0);

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_l = Arc::clone(&calls);
        sender.send_buffer(
            Arc::new(keepalive_bytes()),
            receiver_endpoint,
            2,
            Some(Box::new(move |result| {
                assert!(result.is_ok());
                calls_l.fetch_add(1, Ordering::SeqCst);
            })),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
