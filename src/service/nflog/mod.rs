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

//! The notification log: which peer last notified which (group, receiver),
//! and with which firing/resolved alert sets. Replicated like the silence
//! store; entries supersede each other per (group, receiver, peer) by
//! timestamp, which makes the merge a CRDT.

use std::{path::PathBuf, sync::Arc, time::Duration};

use bytes::Bytes;
use config::{
    get_config,
    metrics,
    utils::time::{now_micros, seconds_micros},
};
use hashbrown::HashMap;
use infra::{
    cluster::{Peer, STREAM_NFLOG},
    errors::Result,
    snapshot,
};
use parking_lot::RwLock;
use proto::MeshLogEntry;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct NflogOptions {
    pub retention: i64,
    pub maintenance_interval: Duration,
    pub snapshot_path: PathBuf,
}

impl Default for NflogOptions {
    fn default() -> Self {
        let cfg = get_config();
        NflogOptions {
            retention: seconds_micros(cfg.nflog.retention),
            maintenance_interval: Duration::from_secs(cfg.nflog.maintenance_interval as u64),
            snapshot_path: PathBuf::from(format!(
                "{}{}",
                cfg.common.data_dir, cfg.nflog.snapshot_file
            )),
        }
    }
}

pub struct Nflog {
    opts: NflogOptions,
    peer: Arc<dyn Peer>,
    /// (group key, receiver) -> peer id -> latest entry
    st: RwLock<HashMap<(String, String), HashMap<u64, MeshLogEntry>>>,
}

impl Nflog {
    pub fn new(opts: NflogOptions, peer: Arc<dyn Peer>) -> Arc<Nflog> {
        Arc::new(Nflog {
            opts,
            peer,
            st: RwLock::new(HashMap::new()),
        })
    }

    pub async fn load(&self) -> Result<usize> {
        match snapshot::read(&self.opts.snapshot_path).await? {
            None => Ok(0),
            Some(data) => {
                let n = self.merge_bytes(&data)?;
                log::info!(
                    "[NFLOG] loaded {n} entries from {:?}",
                    self.opts.snapshot_path
                );
                Ok(n)
            }
        }
    }

    /// Record a successful notification by the local peer.
    pub async fn log(
        &self,
        group_key: &str,
        receiver: &str,
        firing_hash: u64,
        resolved_hash: u64,
    ) -> Result<()> {
        let now = now_micros();
        let entry = MeshLogEntry {
            group_key: group_key.to_string(),
            receiver: receiver.to_string(),
            peer: self.peer.id(),
            timestamp: now,
            firing_hash,
            resolved_hash,
            expires_at: now + self.opts.retention,
        };
        {
            let mut st = self.st.write();
            st.entry((group_key.to_string(), receiver.to_string()))
                .or_default()
                .insert(entry.peer, entry.clone());
        }
        let payload = Bytes::from(proto::encode_snapshot(std::iter::once(&entry)));
        metrics::NFLOG_GOSSIP_TOTAL.with_label_values(&["out"]).inc();
        if let Err(e) = self.peer.broadcast(STREAM_NFLOG, payload).await {
            log::warn!("[NFLOG] gossip broadcast failed: {e}");
        }
        Ok(())
    }

    /// Latest entry per peer for this (group, receiver).
    pub fn query(&self, group_key: &str, receiver: &str) -> HashMap<u64, MeshLogEntry> {
        self.st
            .read()
            .get(&(group_key.to_string(), receiver.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Later entries supersede earlier ones per (group, receiver, peer).
    pub fn merge_bytes(&self, data: &[u8]) -> Result<usize> {
        let entries: Vec<MeshLogEntry> = proto::decode_snapshot(data)?;
        let now = now_micros();
        let mut applied = 0;
        let mut st = self.st.write();
        for entry in entries {
            if entry.expires_at != 0 && entry.expires_at < now {
                continue;
            }
            let slot = st
                .entry((entry.group_key.clone(), entry.receiver.clone()))
                .or_default();
            match slot.get(&entry.peer) {
                Some(existing) if existing.timestamp >= entry.timestamp => {}
                _ => {
                    slot.insert(entry.peer, entry);
                    applied += 1;
                }
            }
        }
        Ok(applied)
    }

    /// Canonical encoding of the whole log, ordered by (group, receiver,
    /// peer).
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        let st = self.st.read();
        let mut items: Vec<MeshLogEntry> = st
            .values()
            .flat_map(|peers| peers.values().cloned())
            .collect();
        items.sort_by(|a, b| {
            (&a.group_key, &a.receiver, a.peer).cmp(&(&b.group_key, &b.receiver, b.peer))
        });
        proto::encode_snapshot(items.iter())
    }

    pub fn gc(&self) -> usize {
        let now = now_micros();
        let mut st = self.st.write();
        let mut removed = 0;
        st.retain(|_, peers| {
            let before = peers.len();
            peers.retain(|_, e| e.expires_at == 0 || e.expires_at > now);
            removed += before - peers.len();
            !peers.is_empty()
        });
        removed
    }

    pub async fn snapshot(&self) -> Result<()> {
        let data = self.snapshot_bytes();
        if let Err(e) = snapshot::write_atomic(&self.opts.snapshot_path, &data).await {
            metrics::SNAPSHOT_ERRORS_TOTAL
                .with_label_values(&["nflog"])
                .inc();
            return Err(e);
        }
        Ok(())
    }

    pub async fn run_maintenance(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.opts.maintenance_interval);
        interval.tick().await; // trigger the first run
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let removed = self.gc();
                    if removed > 0 {
                        log::debug!("[NFLOG] gc removed {removed} expired entries");
                    }
                    if let Err(e) = self.snapshot().await {
                        log::error!("[NFLOG] snapshot failed: {e}");
                    }
                    metrics::NFLOG_GOSSIP_TOTAL.with_label_values(&["out"]).inc();
                    if let Err(e) = self
                        .peer
                        .broadcast(STREAM_NFLOG, Bytes::from(self.snapshot_bytes()))
                        .await
                    {
                        log::warn!("[NFLOG] gossip broadcast failed: {e}");
                    }
                }
            }
        }
        if let Err(e) = self.snapshot().await {
            log::error!("[NFLOG] shutdown snapshot failed: {e}");
        }
    }

    pub async fn run_gossip(self: Arc<Self>, cancel: CancellationToken) {
        let mut rx = self.peer.subscribe(STREAM_NFLOG);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                payload = rx.recv() => {
                    let Some(payload) = payload else { break };
                    metrics::NFLOG_GOSSIP_TOTAL.with_label_values(&["in"]).inc();
                    match self.merge_bytes(&payload) {
                        Ok(n) if n > 0 => log::debug!("[NFLOG] merged {n} entries from gossip"),
                        Ok(_) => {}
                        Err(e) => log::warn!("[NFLOG] dropping bad gossip payload: {e}"),
                    }
                }
            }
        }
    }
}
