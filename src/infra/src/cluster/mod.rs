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

//! Cluster membership and the replication fan-out used by the CRDT stores.
//! A store broadcasts its canonical encoding on a named stream; every peer
//! receives remote payloads for that stream and merges them locally.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use config::meta::cluster::Member;
use tokio::sync::mpsc;

use crate::errors::Result;

pub mod gossip;
pub mod mem;

pub use gossip::GossipPeer;
pub use mem::{MemMesh, MemPeer};

/// Gossip stream carrying the silence store state.
pub const STREAM_SILENCES: &str = "silences";
/// Gossip stream carrying the notification log state.
pub const STREAM_NFLOG: &str = "nflog";

#[async_trait]
pub trait Peer: Send + Sync + 'static {
    /// The 64-bit random identity minted at process start.
    fn id(&self) -> u64;

    fn name(&self) -> String {
        config::meta::cluster::format_peer_id(self.id())
    }

    /// Current members including ourselves, sorted by peer id.
    async fn members(&self) -> Vec<Member>;

    /// Our index in the sorted member list. Lower positions notify first.
    async fn position(&self) -> usize {
        let id = self.id();
        self.members()
            .await
            .iter()
            .position(|m| m.id == id)
            .unwrap_or(0)
    }

    /// Replicate a payload to every other member of the stream.
    async fn broadcast(&self, stream: &str, payload: Bytes) -> Result<()>;

    /// Remote payloads for a stream. The channel is unbounded so gossip
    /// receipt never blocks the transport.
    fn subscribe(&self, stream: &str) -> mpsc::UnboundedReceiver<Bytes>;

    /// Block until the membership has settled or the timeout elapsed.
    async fn wait_ready(&self, timeout: Duration) -> Result<()>;

    async fn shutdown(&self);
}
