//! Distributed work coordinator.
//!
//! One `work_generate` request is posted to every configured work peer in
//! parallel. The first syntactically valid nonce that passes validation wins;
//! the remaining outstanding peers receive a best-effort `work_cancel`. If
//! every peer fails — or none are configured — the local generator runs.

use std::collections::HashSet;
use std::net::SocketAddrV6;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lattice_types::Root;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::generator::WorkGenerator;
use crate::validator::work_validate;

#[derive(Debug, Error)]
pub enum WorkError {
    #[error("work peer unreachable: {0}")]
    Unreachable(String),
    #[error("work peer responded with status {0}")]
    BadStatus(u16),
    #[error("work response wasn't parsable: {0}")]
    BadBody(String),
    #[error("work field wasn't hex")]
    NotHex,
}

/// Work generation over the configured peers with local fallback.
pub struct WorkPool {
    threshold: u64,
    generator: WorkGenerator,
    work_peers: Vec<SocketAddrV6>,
    client: reqwest::Client,
}

impl WorkPool {
    pub fn new(threshold: u64, threads: usize, work_peers: Vec<SocketAddrV6>) -> Self {
        Self {
            threshold,
            generator: WorkGenerator::new(threads),
            work_peers,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client construction is infallible"),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Produce a nonce for `root` meeting this pool's threshold.
    pub async fn generate(&self, root: Root) -> u64 {
        if self.work_peers.is_empty() {
            return self.generate_local(root).await;
        }

        let urls: Vec<String> = self
            .work_peers
            .iter()
            .map(|peer| format!("http://{peer}/"))
            .collect();
        let outstanding: Arc<Mutex<HashSet<String>>> =
            Arc::new(Mutex::new(urls.iter().cloned().collect()));

        let (tx, mut rx) = mpsc::channel::<(String, Result<u64, WorkError>)>(urls.len());
        for url in &urls {
            let client = self.client.clone();
            let url = url.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = request_work(&client, &url, &root).await;
                let _ = tx.send((url, result)).await;
            });
        }
        drop(tx);

        let mut remaining = urls.len();
        while let Some((url, result)) = rx.recv().await {
            outstanding
                .lock()
                .expect("outstanding lock poisoned")
                .remove(&url);
            match result {
                Ok(nonce) if work_validate(&root, nonce, self.threshold) => {
                    self.cancel_outstanding(&outstanding, &root);
                    return nonce;
                }
                Ok(_) => {
                    tracing::warn!(peer = %url, %root, "incorrect work response");
                }
                Err(error) => {
                    tracing::warn!(peer = %url, %error, "work peer failed");
                }
            }
            remaining -= 1;
            if remaining == 0 {
                break;
            }
        }
        self.generate_local(root).await
    }

    async fn generate_local(&self, root: Root) -> u64 {
        let generator = self.generator.clone();
        let threshold = self.threshold;
        tokio::task::spawn_blocking(move || generator.generate(&root, threshold))
            .await
            .expect("work generation thread panicked")
    }

    /// Best-effort `work_cancel` to every peer still outstanding.
    fn cancel_outstanding(&self, outstanding: &Arc<Mutex<HashSet<String>>>, root: &Root) {
        let targets: Vec<String> = outstanding
            .lock()
            .expect("outstanding lock poisoned")
            .drain()
            .collect();
        for url in targets {
            let client = self.client.clone();
            let body = serde_json::json!({
                "action": "work_cancel",
                "hash": root.to_string(),
            });
            tokio::spawn(async move {
                let _ = client.post(&url).json(&body).send().await;
            });
        }
    }
}

async fn request_work(
    client: &reqwest::Client,
    url: &str,
    root: &Root,
) -> Result<u64, WorkError> {
    let body = serde_json::json!({
        "action": "work_generate",
        "hash": root.to_string(),
    });
    let response = client
        .post(url)
        .json(&body)
        .send()
        .await
        .map_err(|e| WorkError::Unreachable(e.to_string()))?;
    if !response.status().is_success() {
        return Err(WorkError::BadStatus(response.status().as_u16()));
    }
    let value: serde_json::Value = response
        .json()
        .await
        .map_err(|e| WorkError::BadBody(e.to_string()))?;
    let work_text = value
        .get("work")
        .and_then(|w| w.as_str())
        .ok_or_else(|| WorkError::BadBody("missing work field".into()))?;
    let bytes = hex::decode(work_text).map_err(|_| WorkError::NotHex)?;
    let arr: [u8; 8] = bytes.try_into().map_err(|_| WorkError::NotHex)?;
    Ok(u64::from_be_bytes(arr))
}
