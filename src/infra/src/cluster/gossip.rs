// Copyright 2025 Alertmesh Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! UDP gossip membership and state replication. Every store stream maps to
//! one key in the local node state; setting the key bumps its version and
//! chitchat spreads it to the cluster. A key-change listener feeds remote
//! payloads into the per-stream subscriber channels.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use chitchat::{
    Chitchat, ChitchatConfig, ChitchatHandle, ChitchatId, FailureDetectorConfig, KeyChangeEvent,
    ListenerHandle, spawn_chitchat, transport::UdpTransport,
};
use config::meta::cluster::{Member, format_peer_id, parse_peer_id};
use tokio::sync::{Mutex, mpsc};

use super::Peer;
use crate::errors::{Error, Result};

const STATE_KEY_PREFIX: &str = "am/";
// roughly four hours of one-second gossip rounds
const MARKED_FOR_DELETION_GRACE_PERIOD: u32 = 15_000;

type Subscribers = Arc<parking_lot::Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Bytes>>>>>;

pub struct GossipPeer {
    id: u64,
    self_chitchat_id: ChitchatId,
    chitchat: Arc<Mutex<Chitchat>>,
    handle: Mutex<Option<ChitchatHandle>>,
    subs: Subscribers,
    _listener: ListenerHandle,
    gossip_interval: Duration,
}

impl GossipPeer {
    pub async fn join(cfg: &config::Cluster) -> Result<Arc<GossipPeer>> {
        let id = config::ider::local_peer_id();
        let node_id = format_peer_id(id);
        let listen_addr: SocketAddr = cfg
            .listen_addr
            .parse()
            .map_err(|e| Error::Peer(format!("invalid listen addr {:?}: {e}", cfg.listen_addr)))?;
        let self_chitchat_id = ChitchatId {
            node_id: node_id.clone(),
            generation_id: chrono::Utc::now().timestamp() as u64,
            gossip_advertise_addr: listen_addr,
        };
        let gossip_interval = Duration::from_millis(cfg.gossip_interval);

        log::info!(
            "[CLUSTER] joining cluster {} as {} on {}, seeds: {:?}",
            cfg.name,
            node_id,
            listen_addr,
            cfg.seed_addrs()
        );

        let chitchat_config = ChitchatConfig {
            cluster_id: cfg.name.clone(),
            chitchat_id: self_chitchat_id.clone(),
            gossip_interval,
            listen_addr,
            seed_nodes: cfg.seed_addrs(),
            failure_detector_config: FailureDetectorConfig::default(),
            marked_for_deletion_grace_period: gossip_interval * MARKED_FOR_DELETION_GRACE_PERIOD,
            catchup_callback: None,
            extra_liveness_predicate: None,
        };
        let handle = spawn_chitchat(chitchat_config, Vec::new(), &UdpTransport)
            .await
            .map_err(|e| Error::Peer(format!("failed to join cluster: {e}")))?;

        let chitchat = handle.chitchat();
        let subs: Subscribers = Default::default();
        let listener = {
            let subs = Arc::clone(&subs);
            let self_node = node_id.clone();
            // the listener gets keys with the subscribed prefix stripped,
            // so ev.key is exactly the stream name
            chitchat
                .lock()
                .await
                .subscribe_event(STATE_KEY_PREFIX, move |ev: KeyChangeEvent| {
                    if ev.node.node_id == self_node {
                        return;
                    }
                    let payload = match BASE64.decode(ev.value) {
                        Ok(p) => Bytes::from(p),
                        Err(e) => {
                            log::warn!(
                                "[CLUSTER] dropping undecodable gossip payload from {} on {}: {e}",
                                ev.node.node_id,
                                ev.key
                            );
                            return;
                        }
                    };
                    let mut subs = subs.lock();
                    if let Some(senders) = subs.get_mut(ev.key) {
                        senders.retain(|tx| tx.send(payload.clone()).is_ok());
                    }
                })
        };

        Ok(Arc::new(GossipPeer {
            id,
            self_chitchat_id,
            chitchat,
            handle: Mutex::new(Some(handle)),
            subs,
            _listener: listener,
            gossip_interval,
        }))
    }
}

#[async_trait]
impl Peer for GossipPeer {
    fn id(&self) -> u64 {
        self.id
    }

    async fn members(&self) -> Vec<Member> {
        let guard = self.chitchat.lock().await;
        let mut members: Vec<Member> = guard
            .live_nodes()
            .filter_map(|cid| {
                parse_peer_id(&cid.node_id).ok().map(|id| Member {
                    id,
                    addr: cid.gossip_advertise_addr.to_string(),
                })
            })
            .collect();
        drop(guard);
        if !members.iter().any(|m| m.id == self.id) {
            members.push(Member {
                id: self.id,
                addr: self.self_chitchat_id.gossip_advertise_addr.to_string(),
            });
        }
        members.sort();
        members.dedup();
        members
    }

    async fn broadcast(&self, stream: &str, payload: Bytes) -> Result<()> {
        let key = format!("{STATE_KEY_PREFIX}{stream}");
        let value = BASE64.encode(&payload);
        self.chitchat.lock().await.self_node_state().set(key, value);
        Ok(())
    }

    fn subscribe(&self, stream: &str) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subs
            .lock()
            .entry(stream.to_string())
            .or_default()
            .push(tx);
        rx
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut last_count = 0usize;
        loop {
            let count = self.members().await.len();
            if count == last_count && count > 0 {
                log::info!("[CLUSTER] membership settled with {count} members");
                return Ok(());
            }
            last_count = count;
            if tokio::time::Instant::now() + self.gossip_interval * 2 > deadline {
                log::warn!(
                    "[CLUSTER] membership did not settle within {timeout:?}, continuing with {count} members"
                );
                return Ok(());
            }
            tokio::time::sleep(self.gossip_interval * 2).await;
        }
    }

    async fn shutdown(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.shutdown().await {
                log::warn!("[CLUSTER] gossip shutdown error: {e}");
            }
        }
        self.subs.lock().clear();
    }
}
