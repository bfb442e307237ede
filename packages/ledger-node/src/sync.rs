//! Peer synchronization
//!
//! Replicas follow the authority's event journal and import every global
//! exit root it announces. The authority polls each rollup peer's `/root`
//! and folds the local exit root the peer last published into the rollup
//! exit tree.

use std::collections::HashMap;
use std::time::Duration;

use alloy_primitives::B256;
use eyre::{eyre, Result, WrapErr};
use exit_ledger::{rollup_network_id, EventBatch};
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{redact_url, RollupPeer};
use crate::dto::RootResponse;
use crate::error::ErrorResponse;
use crate::node::SharedNode;

/// Events requested per poll.
pub const SYNC_PAGE_SIZE: usize = 500;

pub struct PeerSync {
    node: SharedNode,
    client: Client,
    /// Last rollup root folded in per rollup index.
    rollup_roots: HashMap<u32, B256>,
}

impl PeerSync {
    pub fn new(node: SharedNode) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            node,
            client,
            rollup_roots: HashMap::new(),
        }
    }

    /// Main run loop
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let poll_interval = Duration::from_millis(self.node.config.sync_interval_ms);
        info!(
            interval_ms = self.node.config.sync_interval_ms,
            rollup_peers = self.node.config.rollup_peers.len(),
            "Peer sync starting"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Peer sync shutdown");
                    break;
                }
                _ = tokio::time::sleep(poll_interval) => {
                    self.poll_once().await;
                }
            }
        }

        Ok(())
    }

    /// One round against every configured peer.
    pub async fn poll_once(&mut self) {
        if let Some(peer_url) = self.node.config.peer_url.clone() {
            match self.sync_events(&peer_url).await {
                Ok(imported) => {
                    self.node.set_sync_status(true);
                    if imported > 0 {
                        debug!(imported, cursor = self.node.sync_cursor(), "Synced from authority");
                    }
                }
                Err(e) => {
                    self.node.set_sync_status(false);
                    self.node
                        .metrics
                        .sync_errors_total
                        .with_label_values(&["authority"])
                        .inc();
                    error!(peer = %redact_url(&peer_url), error = %e, "Error syncing events");
                }
            }
        }

        let peers = self.node.config.rollup_peers.clone();
        for peer in &peers {
            if let Err(e) = self.sync_rollup(peer).await {
                let label = peer.rollup_index.to_string();
                self.node
                    .metrics
                    .sync_errors_total
                    .with_label_values(&[label.as_str()])
                    .inc();
                error!(
                    rollup_index = peer.rollup_index,
                    peer = %redact_url(&peer.url),
                    error = %e,
                    "Error syncing rollup exit root"
                );
            }
        }
    }

    /// Drain the authority journal from the stored cursor.
    ///
    /// Returns the number of newly imported global exit roots.
    pub async fn sync_events(&self, peer_url: &str) -> Result<usize> {
        let mut imported = 0;
        loop {
            let batch = self.fetch_events(peer_url, self.node.sync_cursor()).await?;
            let page_len = batch.entries.len();
            imported += self
                .node
                .ingest(&batch)
                .map_err(|e| eyre!("Failed to ingest events: {}", e))?;
            if page_len < SYNC_PAGE_SIZE {
                return Ok(imported);
            }
        }
    }

    async fn fetch_events(&self, peer_url: &str, from: u64) -> Result<EventBatch> {
        let url = format!(
            "{}/events?from={}&limit={}",
            peer_url.trim_end_matches('/'),
            from,
            SYNC_PAGE_SIZE
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err("Failed to reach authority")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.json::<ErrorResponse>().await.ok();
            return Err(match body {
                Some(body) => eyre!("Authority returned {}: {} ({})", status, body.error, body.code),
                None => eyre!("Authority returned {}", status),
            });
        }

        response
            .json::<EventBatch>()
            .await
            .wrap_err("Failed to decode event batch")
    }

    /// Fold a rollup peer's published local exit root into the rollup tree.
    ///
    /// Returns the new rollup exit root when the peer moved.
    pub async fn sync_rollup(&mut self, peer: &RollupPeer) -> Result<Option<B256>> {
        let url = format!("{}/root", peer.url.trim_end_matches('/'));
        let root: RootResponse = self
            .client
            .get(&url)
            .send()
            .await
            .wrap_err("Failed to reach rollup peer")?
            .error_for_status()
            .wrap_err("Rollup peer rejected root query")?
            .json()
            .await
            .wrap_err("Failed to decode root response")?;

        let expected_network = rollup_network_id(peer.rollup_index)
            .map_err(|_| eyre!("Rollup index {} has no network id", peer.rollup_index))?;
        if root.network_id != expected_network {
            return Err(eyre!(
                "Rollup peer at index {} reports network {}, expected {}",
                peer.rollup_index,
                root.network_id,
                expected_network
            ));
        }

        let Some(local_exit_root) = root.last_local_exit_root else {
            warn!(
                rollup_index = peer.rollup_index,
                network_id = root.network_id,
                "Rollup peer is not a replica"
            );
            return Ok(None);
        };
        if self.rollup_roots.get(&peer.rollup_index) == Some(&local_exit_root)
            || (local_exit_root == B256::ZERO && !self.rollup_roots.contains_key(&peer.rollup_index))
        {
            return Ok(None);
        }

        let rollup_exit_root = self
            .node
            .update_rollup_exit_root(peer.rollup_index, local_exit_root)
            .map_err(|e| eyre!("Failed to update rollup exit root: {}", e))?;
        self.rollup_roots.insert(peer.rollup_index, local_exit_root);
        info!(
            rollup_index = peer.rollup_index,
            local_exit_root = %local_exit_root,
            rollup_exit_root = %rollup_exit_root,
            "Rollup exit root updated"
        );
        Ok(Some(rollup_exit_root))
    }
}

/// Publish the local exit root on a fixed interval when deposits are pending.
pub async fn run_root_updater(node: SharedNode, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
    let interval_ms = node.config.root_update_interval_ms;
    if interval_ms == 0 {
        debug!("Root updater disabled");
        return Ok(());
    }
    let interval = Duration::from_millis(interval_ms);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!("Root updater shutdown");
                break;
            }
            _ = tokio::time::sleep(interval) => {
                match node.update_global_exit_root(false) {
                    Ok(Some(root)) => debug!(global_exit_root = %root, "Published global exit root"),
                    Ok(None) => {}
                    Err(e) => warn!(code = e.code(), error = %e, "Root update failed"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::*;
    use crate::node::Node;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_unreachable_authority_marks_sync_failed() {
        let node = Arc::new(
            Node::new(replica_config(Some("http://127.0.0.1:1".to_string()))).unwrap(),
        );
        node.set_sync_status(true);

        let mut sync = PeerSync::new(node.clone());
        sync.poll_once().await;

        assert!(!node.last_sync_ok());
        assert_eq!(
            node.metrics
                .sync_errors_total
                .with_label_values(&["authority"])
                .get(),
            1
        );
    }

    #[test]
    fn test_root_updater_disabled_returns() {
        let node = Arc::new(Node::new(authority_config()).unwrap());
        let (_tx, rx) = mpsc::channel(1);
        tokio_test::block_on(run_root_updater(node, rx)).unwrap();
    }
}
