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

//! In-process cluster transport. A single-member mesh is the standalone
//! deployment; multi-member meshes drive the cluster paths in tests without
//! touching the network.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use config::meta::cluster::Member;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::Peer;
use crate::errors::Result;

#[derive(Default)]
pub struct MemMesh {
    peers: RwLock<Vec<Arc<MemPeer>>>,
}

impl MemMesh {
    pub fn new() -> Arc<MemMesh> {
        Arc::new(MemMesh::default())
    }

    /// A mesh of one: the standalone deployment.
    pub fn standalone() -> Arc<MemPeer> {
        let mesh = MemMesh::new();
        mesh.join(config::ider::local_peer_id())
    }

    pub fn join(self: &Arc<MemMesh>, id: u64) -> Arc<MemPeer> {
        let peer = Arc::new(MemPeer {
            id,
            mesh: Arc::clone(self),
            subs: Mutex::new(HashMap::new()),
        });
        self.peers.write().push(Arc::clone(&peer));
        peer
    }

    fn members(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .peers
            .read()
            .iter()
            .map(|p| Member {
                id: p.id,
                addr: "local".to_string(),
            })
            .collect();
        members.sort();
        members
    }

    fn deliver(&self, from: u64, stream: &str, payload: &Bytes) {
        let peers = self.peers.read().clone();
        for peer in peers {
            if peer.id == from {
                continue;
            }
            peer.receive(stream, payload.clone());
        }
    }
}

pub struct MemPeer {
    id: u64,
    mesh: Arc<MemMesh>,
    subs: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Bytes>>>>,
}

impl MemPeer {
    fn receive(&self, stream: &str, payload: Bytes) {
        let mut subs = self.subs.lock();
        if let Some(senders) = subs.get_mut(stream) {
            senders.retain(|tx| tx.send(payload.clone()).is_ok());
        }
    }
}

#[async_trait]
impl Peer for MemPeer {
    fn id(&self) -> u64 {
        self.id
    }

    async fn members(&self) -> Vec<Member> {
        self.mesh.members()
    }

    async fn broadcast(&self, stream: &str, payload: Bytes) -> Result<()> {
        self.mesh.deliver(self.id, stream, &payload);
        Ok(())
    }

    fn subscribe(&self, stream: &str) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subs.lock().entry(stream.to_string()).or_default().push(tx);
        rx
    }

    async fn wait_ready(&self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) {
        let id = self.id;
        self.mesh.peers.write().retain(|p| p.id != id);
        self.subs.lock().clear();
    }
}
