//! Distributed work: racing peers, cancellation, and local fallback.

use std::net::{Ipv6Addr, SocketAddrV6};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lattice_types::{BlockHash, Root};
use lattice_work::{work_validate, WorkGenerator, WorkPool};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const THRESHOLD: u64 = 0xff00_0000_0000_0000;

/// A minimal HTTP work peer. Responds to `work_generate` with `nonce` after
/// `delay`, counts `work_cancel` requests.
struct FakeWorkPeer {
    endpoint: SocketAddrV6,
    cancels: Arc<AtomicUsize>,
}

async fn spawn_work_peer(nonce: Option<u64>, delay: Duration) -> FakeWorkPeer {
    let listener = TcpListener::bind("[::1]:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let cancels = Arc::new(AtomicUsize::new(0));
    let cancels_l = Arc::clone(&cancels);

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let cancels = Arc::clone(&cancels_l);
            tokio::spawn(async move {
                let mut buffer = vec![0u8; 4096];
                let Ok(read) = stream.read(&mut buffer).await else {
                    return;
                };
                let request = String::from_utf8_lossy(&buffer[..read]).to_string();
                if request.contains("work_cancel") {
                    cancels.fetch_add(1, Ordering::SeqCst);
                    let _ = stream
                        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\n{}")
                        .await;
                    return;
                }
                tokio::time::sleep(delay).await;
                let body = match nonce {
                    Some(n) => format!("{{\"work\":\"{}\"}}", hex::encode(n.to_be_bytes())),
                    None => "broken".to_string(),
                };
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
            });
        }
    });

    FakeWorkPeer {
        endpoint: SocketAddrV6::new(Ipv6Addr::LOCALHOST, port, 0, 0),
        cancels,
    }
}

fn test_root() -> Root {
    Root::from(BlockHash::new([0x5E; 32]))
}

fn valid_nonce(root: &Root) -> u64 {
    WorkGenerator::new(2).generate(root, THRESHOLD)
}

#[tokio::test(flavor = "multi_thread")]
async fn fast_peer_wins_and_slow_peer_is_cancelled() {
    let root = test_root();
    let nonce = valid_nonce(&root);

    let fast = spawn_work_peer(Some(nonce), Duration::from_millis(50)).await;
    let slow = spawn_work_peer(Some(nonce), Duration::from_millis(500)).await;

    let pool = WorkPool::new(THRESHOLD, 1, vec![fast.endpoint, slow.endpoint]);
    let started = Instant::now();
    let result = pool.generate(root).await;
    let elapsed = started.elapsed();

    assert_eq!(result, nonce);
    assert!(
        elapsed < Duration::from_millis(400),
        "result should arrive at the fast peer's pace, took {elapsed:?}"
    );

    // The slow peer receives exactly one work_cancel
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(slow.cancels.load(Ordering::SeqCst), 1);
    assert_eq!(fast.cancels.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn all_peers_failing_falls_back_to_local() {
    let root = test_root();
    let broken = spawn_work_peer(None, Duration::from_millis(10)).await;

    let pool = WorkPool::new(THRESHOLD, 2, vec![broken.endpoint]);
    let result = pool.generate(root).await;
    assert!(work_validate(&root, result, THRESHOLD));
}

#[tokio::test(flavor = "multi_thread")]
async fn no_peers_runs_local_generator() {
    let root = test_root();
    let pool = WorkPool::new(THRESHOLD, 2, Vec::new());
    let result = pool.generate(root).await;
    assert!(work_validate(&root, result, THRESHOLD));
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_nonce_counts_as_failure() {
    let root = test_root();
    // A peer that answers promptly with work that fails validation
    let lying = spawn_work_peer(Some(1), Duration::from_millis(10)).await;

    let pool = WorkPool::new(THRESHOLD, 2, vec![lying.endpoint]);
    let result = pool.generate(root).await;
    assert!(work_validate(&root, result, THRESHOLD));
    // No cancel is sent on failure paths
    assert_eq!(lying.cancels.load(Ordering::SeqCst), 0);
}
