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

//! The silence store. Locally it is a keyed map with compiled matchers for
//! fast mute checks; across the cluster it is a last-writer-wins CRDT keyed
//! by silence id, replicated over the silences gossip stream and snapshotted
//! to disk on every maintenance tick.

use std::{path::PathBuf, sync::Arc, time::Duration};

use bytes::Bytes;
use config::{
    get_config, ider,
    meta::{
        alerts::LabelSet,
        matchers::{CompiledMatchers, Matcher},
        silences::{Silence, SilenceState},
    },
    metrics,
    utils::time::{now_micros, seconds_micros},
};
use hashbrown::HashMap;
use infra::{
    cluster::{Peer, STREAM_SILENCES},
    errors::{Error, Result},
    snapshot,
};
use parking_lot::RwLock;
use proto::{MeshMatcher, MeshSilence, matcher_type};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct SilencesOptions {
    /// How long expired silences are kept for the record, micros.
    pub retention: i64,
    pub maintenance_interval: Duration,
    pub snapshot_path: PathBuf,
}

impl Default for SilencesOptions {
    fn default() -> Self {
        let cfg = get_config();
        SilencesOptions {
            retention: seconds_micros(cfg.silences.retention),
            maintenance_interval: Duration::from_secs(cfg.silences.maintenance_interval as u64),
            snapshot_path: PathBuf::from(format!(
                "{}{}",
                cfg.common.data_dir, cfg.silences.snapshot_file
            )),
        }
    }
}

struct Entry {
    silence: Silence,
    matchers: CompiledMatchers,
    /// Canonical encoding, the merge tie-breaker.
    canonical: Vec<u8>,
    /// Deleted before it ever became active. The entry stays in the store
    /// so the deletion replicates, but it never mutes and is hidden from
    /// queries.
    deleted: bool,
}

impl Entry {
    fn build(silence: Silence, retention: i64, deleted: bool) -> Result<Entry> {
        let matchers = CompiledMatchers::compile(&silence.matchers)
            .map_err(|e| Error::Validation(e.to_string()))?;
        let canonical = proto::canonical_bytes(&to_mesh(&silence, retention, deleted));
        Ok(Entry {
            silence,
            matchers,
            canonical,
            deleted,
        })
    }

    fn is_tombstone(&self) -> bool {
        self.deleted
    }
}

#[derive(Clone, Debug, Default)]
pub struct SilenceFilter {
    pub ids: Vec<String>,
    /// Equality filter applied to the silence's own matcher set.
    pub matchers: Vec<Matcher>,
    pub states: Vec<SilenceState>,
}

pub struct Silences {
    opts: SilencesOptions,
    peer: Arc<dyn Peer>,
    st: RwLock<HashMap<String, Entry>>,
}

impl Silences {
    pub fn new(opts: SilencesOptions, peer: Arc<dyn Peer>) -> Arc<Silences> {
        Arc::new(Silences {
            opts,
            peer,
            st: RwLock::new(HashMap::new()),
        })
    }

    /// Load the on-disk snapshot, if any. Runs through the same merge path
    /// as gossip, so a corrupt tail entry fails without corrupting state.
    pub async fn load(&self) -> Result<usize> {
        match snapshot::read(&self.opts.snapshot_path).await? {
            None => Ok(0),
            Some(data) => {
                let n = self.merge_bytes(&data)?;
                log::info!(
                    "[SILENCES] loaded {n} silences from {:?}",
                    self.opts.snapshot_path
                );
                Ok(n)
            }
        }
    }

    /// Create a silence, or update one in place. Returns the id the silence
    /// is stored under, which differs from the input when an expired silence
    /// is recreated.
    pub async fn set(&self, mut silence: Silence) -> Result<String> {
        let now = now_micros();
        if silence.starts_at == 0 {
            silence.starts_at = now;
        }
        silence
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        if silence.ends_at <= now {
            return Err(Error::Validation(
                "silence would already be expired".to_string(),
            ));
        }

        if !silence.id.is_empty() {
            let st = self.st.read();
            match st.get(&silence.id) {
                None => {
                    return Err(Error::Validation(format!(
                        "silence {} not found",
                        silence.id
                    )));
                }
                Some(existing) => match existing.silence.state_at(now) {
                    // expired silences are immutable history, recreate
                    SilenceState::Expired => silence.id = String::new(),
                    SilenceState::Active => {
                        if !existing.silence.same_matchers(&silence) {
                            return Err(Error::Validation(
                                "matchers of an active silence cannot change".to_string(),
                            ));
                        }
                        if silence.starts_at != existing.silence.starts_at {
                            return Err(Error::Validation(
                                "start time of an active silence cannot change".to_string(),
                            ));
                        }
                        if silence.ends_at > existing.silence.ends_at {
                            return Err(Error::Validation(
                                "an active silence can only be expired earlier".to_string(),
                            ));
                        }
                    }
                    SilenceState::Pending => {
                        if !existing.silence.same_matchers(&silence) {
                            return Err(Error::Validation(
                                "matchers of a pending silence cannot change".to_string(),
                            ));
                        }
                    }
                },
            }
        }
        if silence.id.is_empty() {
            silence.id = ider::generate();
        }
        silence.updated_at = now;

        let id = silence.id.clone();
        let entry = Entry::build(silence, self.opts.retention, false)?;
        let payload = Bytes::from(proto::encode_snapshot(std::iter::once(&to_mesh(
            &entry.silence,
            self.opts.retention,
            false,
        ))));
        self.st.write().insert(id.clone(), entry);

        self.broadcast(payload).await;
        Ok(id)
    }

    /// Expire a silence right now. Active silences get their end time cut;
    /// pending ones are deleted.
    pub async fn expire(&self, id: &str) -> Result<()> {
        let now = now_micros();
        let payload = {
            let mut st = self.st.write();
            let entry = st
                .get_mut(id)
                .ok_or_else(|| Error::Validation(format!("silence {id} not found")))?;
            match entry.silence.state_at(now) {
                SilenceState::Expired => {
                    return Err(Error::Validation(format!("silence {id} already expired")));
                }
                SilenceState::Active => {
                    entry.silence.ends_at = now;
                }
                SilenceState::Pending => {
                    entry.silence.starts_at = now;
                    entry.silence.ends_at = now;
                    entry.deleted = true;
                }
            }
            entry.silence.updated_at = now;
            entry.canonical =
                proto::canonical_bytes(&to_mesh(&entry.silence, self.opts.retention, entry.deleted));
            Bytes::from(proto::encode_snapshot(std::iter::once(&to_mesh(
                &entry.silence,
                self.opts.retention,
                entry.deleted,
            ))))
        };
        self.broadcast(payload).await;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Silence> {
        let st = self.st.read();
        st.get(id)
            .filter(|e| !e.is_tombstone())
            .map(|e| e.silence.clone())
    }

    pub fn query(&self, filter: &SilenceFilter) -> Result<Vec<(Silence, SilenceState)>> {
        let now = now_micros();
        let matchers = CompiledMatchers::compile(&filter.matchers)
            .map_err(|e| Error::Validation(e.to_string()))?;
        let st = self.st.read();
        let mut out = Vec::new();
        for entry in st.values() {
            if entry.is_tombstone() {
                continue;
            }
            if !filter.ids.is_empty() && !filter.ids.contains(&entry.silence.id) {
                continue;
            }
            let state = entry.silence.state_at(now);
            if !filter.states.is_empty() && !filter.states.contains(&state) {
                continue;
            }
            if !matchers.is_empty() {
                // view the silence's own equality matchers as a label set
                let own_labels: LabelSet = entry
                    .silence
                    .matchers
                    .iter()
                    .filter(|m| !m.is_regex && !m.is_negative)
                    .map(|m| (m.name.clone(), m.value.clone()))
                    .collect();
                if !matchers.matches(&own_labels) {
                    continue;
                }
            }
            out.push((entry.silence.clone(), state));
        }
        out.sort_by(|(a, _), (b, _)| a.id.cmp(&b.id));
        Ok(out)
    }

    /// Ids of the active silences muting this label set.
    pub fn mutes(&self, labels: &LabelSet) -> Vec<String> {
        let now = now_micros();
        let st = self.st.read();
        let mut out: Vec<String> = st
            .values()
            .filter(|e| {
                !e.is_tombstone()
                    && e.silence.state_at(now) == SilenceState::Active
                    && e.matchers.matches(labels)
            })
            .map(|e| e.silence.id.clone())
            .collect();
        out.sort();
        out
    }

    /// Merge remote or loaded entries. Last writer wins per id by
    /// `updated_at`; ties fall to the bitwise greater canonical encoding so
    /// every replica picks the same winner.
    pub fn merge_bytes(&self, data: &[u8]) -> Result<usize> {
        let entries: Vec<MeshSilence> = proto::decode_snapshot(data)?;
        let now = now_micros();
        let mut applied = 0;
        let mut st = self.st.write();
        for mesh in entries {
            if mesh.expires_at != 0 && mesh.expires_at < now {
                continue;
            }
            let incoming = match from_mesh(&mesh)
                .and_then(|s| Entry::build(s, self.opts.retention, mesh.deleted))
            {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("[SILENCES] skipping unusable replicated silence {}: {e}", mesh.id);
                    continue;
                }
            };
            match st.get(&incoming.silence.id) {
                Some(existing)
                    if (existing.silence.updated_at, existing.canonical.as_slice())
                        >= (incoming.silence.updated_at, incoming.canonical.as_slice()) => {}
                _ => {
                    st.insert(incoming.silence.id.clone(), incoming);
                    applied += 1;
                }
            }
        }
        Ok(applied)
    }

    /// Canonical encoding of the whole store, ordered by id.
    pub fn snapshot_bytes(&self) -> Vec<u8> {
        let st = self.st.read();
        let mut items: Vec<MeshSilence> = st
            .values()
            .map(|e| to_mesh(&e.silence, self.opts.retention, e.deleted))
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        proto::encode_snapshot(items.iter())
    }

    /// Drop silences expired past the retention window. Returns the number
    /// removed.
    pub fn gc(&self) -> usize {
        let now = now_micros();
        let retention = self.opts.retention;
        let mut st = self.st.write();
        let before = st.len();
        st.retain(|_, e| e.silence.ends_at + retention > now);
        before - st.len()
    }

    pub async fn snapshot(&self) -> Result<()> {
        let data = self.snapshot_bytes();
        if let Err(e) = snapshot::write_atomic(&self.opts.snapshot_path, &data).await {
            metrics::SNAPSHOT_ERRORS_TOTAL
                .with_label_values(&["silences"])
                .inc();
            return Err(e);
        }
        Ok(())
    }

    async fn broadcast(&self, payload: Bytes) {
        metrics::SILENCES_GOSSIP_TOTAL
            .with_label_values(&["out"])
            .inc();
        if let Err(e) = self.peer.broadcast(STREAM_SILENCES, payload).await {
            log::warn!("[SILENCES] gossip broadcast failed: {e}");
        }
    }

    /// Periodic GC, snapshot and full-state broadcast.
    pub async fn run_maintenance(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.opts.maintenance_interval);
        interval.tick().await; // trigger the first run
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let removed = self.gc();
                    if removed > 0 {
                        log::debug!("[SILENCES] gc removed {removed} expired silences");
                    }
                    if let Err(e) = self.snapshot().await {
                        log::error!("[SILENCES] snapshot failed: {e}");
                    }
                    self.broadcast(Bytes::from(self.snapshot_bytes())).await;
                }
            }
        }
        // final snapshot on the way out
        if let Err(e) = self.snapshot().await {
            log::error!("[SILENCES] shutdown snapshot failed: {e}");
        }
    }

    /// Apply remote gossip until cancelled.
    pub async fn run_gossip(self: Arc<Self>, cancel: CancellationToken) {
        let mut rx = self.peer.subscribe(STREAM_SILENCES);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                payload = rx.recv() => {
                    let Some(payload) = payload else { break };
                    metrics::SILENCES_GOSSIP_TOTAL.with_label_values(&["in"]).inc();
                    match self.merge_bytes(&payload) {
                        Ok(n) if n > 0 => {
                            log::debug!("[SILENCES] merged {n} silences from gossip");
                        }
                        Ok(_) => {}
                        Err(e) => log::warn!("[SILENCES] dropping bad gossip payload: {e}"),
                    }
                }
            }
        }
    }
}

fn to_mesh(s: &Silence, retention: i64, deleted: bool) -> MeshSilence {
    let mut matchers: Vec<MeshMatcher> = s
        .matchers
        .iter()
        .map(|m| MeshMatcher {
            r#type: match (m.is_regex, m.is_negative) {
                (false, false) => matcher_type::EQUAL,
                (true, false) => matcher_type::REGEX,
                (false, true) => matcher_type::NOT_EQUAL,
                (true, true) => matcher_type::NOT_REGEX,
            },
            name: m.name.clone(),
            pattern: m.value.clone(),
        })
        .collect();
    matchers.sort_by(|a, b| {
        (&a.name, &a.pattern, a.r#type).cmp(&(&b.name, &b.pattern, b.r#type))
    });
    MeshSilence {
        id: s.id.clone(),
        matchers,
        starts_at: s.starts_at,
        ends_at: s.ends_at,
        updated_at: s.updated_at,
        created_by: s.created_by.clone(),
        comment: s.comment.clone(),
        expires_at: s.ends_at + retention,
        deleted,
    }
}

fn from_mesh(m: &MeshSilence) -> Result<Silence> {
    let matchers = m
        .matchers
        .iter()
        .map(|mm| {
            let (is_regex, is_negative) = match mm.r#type {
                matcher_type::EQUAL => (false, false),
                matcher_type::REGEX => (true, false),
                matcher_type::NOT_EQUAL => (false, true),
                matcher_type::NOT_REGEX => (true, true),
                other => {
                    return Err(Error::Permanent(format!(
                        "unknown matcher type {other} in replicated silence {}",
                        m.id
                    )));
                }
            };
            Ok(Matcher {
                name: mm.name.clone(),
                value: mm.pattern.clone(),
                is_regex,
                is_negative,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Silence {
        id: m.id.clone(),
        matchers,
        starts_at: m.starts_at,
        ends_at: m.ends_at,
        updated_at: m.updated_at,
        created_by: m.created_by.clone(),
        comment: m.comment.clone(),
    })
}

#[cfg(test)]
mod tests {
    use infra::cluster::MemMesh;

    use super::*;
    use crate::service::alerts::labels_from;

    fn opts(dir: &tempfile::TempDir) -> SilencesOptions {
        SilencesOptions {
            retention: seconds_micros(3600),
            maintenance_interval: Duration::from_secs(900),
            snapshot_path: dir.path().join("silences"),
        }
    }

    fn silence_for(name: &str, starts_at: i64, ends_at: i64) -> Silence {
        Silence {
            matchers: vec![Matcher::equal("alertname", name)],
            starts_at,
            ends_at,
            created_by: "ops".to_string(),
            comment: "test".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_set_and_mutes() {
        let dir = tempfile::tempdir().unwrap();
        let silences = Silences::new(opts(&dir), MemMesh::standalone());
        let now = now_micros();

        let id = silences
            .set(silence_for("x", now - 1, now + seconds_micros(60)))
            .await
            .unwrap();

        assert_eq!(silences.mutes(&labels_from(&[("alertname", "x")])), vec![id]);
        assert!(silences.mutes(&labels_from(&[("alertname", "y")])).is_empty());
    }

    #[tokio::test]
    async fn test_pending_silence_does_not_mute() {
        let dir = tempfile::tempdir().unwrap();
        let silences = Silences::new(opts(&dir), MemMesh::standalone());
        let now = now_micros();

        silences
            .set(silence_for("x", now + seconds_micros(60), now + seconds_micros(120)))
            .await
            .unwrap();
        assert!(silences.mutes(&labels_from(&[("alertname", "x")])).is_empty());
    }

    #[tokio::test]
    async fn test_identical_silences_do_not_collapse() {
        let dir = tempfile::tempdir().unwrap();
        let silences = Silences::new(opts(&dir), MemMesh::standalone());
        let now = now_micros();

        let a = silences
            .set(silence_for("x", now, now + seconds_micros(60)))
            .await
            .unwrap();
        let b = silences
            .set(silence_for("x", now, now + seconds_micros(60)))
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(silences.mutes(&labels_from(&[("alertname", "x")])).len(), 2);
    }

    #[tokio::test]
    async fn test_update_rules() {
        let dir = tempfile::tempdir().unwrap();
        let silences = Silences::new(opts(&dir), MemMesh::standalone());
        let now = now_micros();

        let id = silences
            .set(silence_for("x", now - 1, now + seconds_micros(600)))
            .await
            .unwrap();

        // active: matchers are frozen
        let mut changed = silence_for("y", now - 1, now + seconds_micros(600));
        changed.id = id.clone();
        assert!(silences.set(changed).await.is_err());

        // active: end time can only move earlier
        let mut extended = silence_for("x", now - 1, now + seconds_micros(1200));
        extended.id = id.clone();
        assert!(silences.set(extended).await.is_err());

        let mut tightened = silence_for("x", now - 1, now + seconds_micros(60));
        tightened.id = id.clone();
        tightened.starts_at = silences.get(&id).unwrap().starts_at;
        let same_id = silences.set(tightened).await.unwrap();
        assert_eq!(same_id, id);

        // unknown id
        let mut unknown = silence_for("x", now, now + seconds_micros(60));
        unknown.id = "no-such-id".to_string();
        assert!(silences.set(unknown).await.is_err());
    }

    #[tokio::test]
    async fn test_expire_active_and_pending() {
        let dir = tempfile::tempdir().unwrap();
        let silences = Silences::new(opts(&dir), MemMesh::standalone());
        let now = now_micros();

        let active = silences
            .set(silence_for("x", now - 1, now + seconds_micros(600)))
            .await
            .unwrap();
        silences.expire(&active).await.unwrap();
        assert!(silences.mutes(&labels_from(&[("alertname", "x")])).is_empty());
        // expiring twice fails
        assert!(silences.expire(&active).await.is_err());

        let pending = silences
            .set(silence_for("y", now + seconds_micros(60), now + seconds_micros(120)))
            .await
            .unwrap();
        silences.expire(&pending).await.unwrap();
        // a pending silence is deleted outright
        assert!(silences.get(&pending).is_none());
        assert!(silences.query(&SilenceFilter::default()).unwrap().iter().all(|(s, _)| s.id != pending));
    }

    #[tokio::test]
    async fn test_zero_width_silence_is_not_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let silences = Silences::new(opts(&dir), MemMesh::standalone());
        let now = now_micros();

        // starts_at == ends_at is accepted; it can never become active but
        // it must not be mistaken for a deletion
        let id = silences
            .set(silence_for("x", now + seconds_micros(10), now + seconds_micros(10)))
            .await
            .unwrap();
        assert!(silences.get(&id).is_some());
        assert_eq!(silences.query(&SilenceFilter::default()).unwrap().len(), 1);
        assert!(silences.mutes(&labels_from(&[("alertname", "x")])).is_empty());
    }

    #[tokio::test]
    async fn test_pending_deletion_replicates() {
        let dir1 = tempfile::tempdir().unwrap();
        let dir2 = tempfile::tempdir().unwrap();
        let s1 = Silences::new(opts(&dir1), MemMesh::standalone());
        let s2 = Silences::new(opts(&dir2), MemMesh::standalone());
        let now = now_micros();

        let id = s1
            .set(silence_for("x", now + seconds_micros(60), now + seconds_micros(120)))
            .await
            .unwrap();
        s1.expire(&id).await.unwrap();

        assert_eq!(s2.merge_bytes(&s1.snapshot_bytes()).unwrap(), 1);
        assert!(s2.get(&id).is_none());
        assert!(s2.query(&SilenceFilter::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_silence_is_immutable_history() {
        let dir = tempfile::tempdir().unwrap();
        let silences = Silences::new(opts(&dir), MemMesh::standalone());
        let now = now_micros();

        let id = silences
            .set(silence_for("x", now - 1, now + seconds_micros(600)))
            .await
            .unwrap();
        silences.expire(&id).await.unwrap();

        // setting with the expired id creates a fresh silence
        let mut again = silence_for("x", now, now + seconds_micros(600));
        again.id = id.clone();
        let new_id = silences.set(again).await.unwrap();
        assert_ne!(new_id, id);
        assert!(silences.get(&id).is_some());
        assert!(silences.get(&new_id).is_some());
    }

    #[tokio::test]
    async fn test_merge_lww_and_idempotent() {
        let dir1 = tempfile::tempdir().unwrap();
        let dir2 = tempfile::tempdir().unwrap();
        let mesh = MemMesh::new();
        let s1 = Silences::new(opts(&dir1), mesh.join(1));
        let s2 = Silences::new(opts(&dir2), mesh.join(2));
        let now = now_micros();

        s1.set(silence_for("x", now - 1, now + seconds_micros(600)))
            .await
            .unwrap();

        let state = s1.snapshot_bytes();
        assert_eq!(s2.merge_bytes(&state).unwrap(), 1);
        // idempotent
        assert_eq!(s2.merge_bytes(&state).unwrap(), 0);
        assert_eq!(s2.snapshot_bytes(), state);

        // the replica that saw a later update wins regardless of order
        let id = s1.query(&SilenceFilter::default()).unwrap()[0].0.id.clone();
        tokio::time::sleep(Duration::from_millis(2)).await;
        s1.expire(&id).await.unwrap();
        let newer = s1.snapshot_bytes();

        let dir3 = tempfile::tempdir().unwrap();
        let s3 = Silences::new(opts(&dir3), MemMesh::standalone());
        s3.merge_bytes(&newer).unwrap();
        s3.merge_bytes(&state).unwrap();
        assert_eq!(s3.snapshot_bytes(), newer);
    }

    #[tokio::test]
    async fn test_gossip_replicates_set() {
        let dir1 = tempfile::tempdir().unwrap();
        let dir2 = tempfile::tempdir().unwrap();
        let mesh = MemMesh::new();
        let s1 = Silences::new(opts(&dir1), mesh.join(1));
        let s2 = Silences::new(opts(&dir2), mesh.join(2));

        let cancel = CancellationToken::new();
        let gossip = tokio::spawn(Arc::clone(&s2).run_gossip(cancel.clone()));

        let now = now_micros();
        s1.set(silence_for("x", now - 1, now + seconds_micros(600)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(s2.mutes(&labels_from(&[("alertname", "x")])).len(), 1);

        cancel.cancel();
        gossip.await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let silences = Silences::new(opts(&dir), MemMesh::standalone());
        let now = now_micros();
        silences
            .set(silence_for("x", now - 1, now + seconds_micros(600)))
            .await
            .unwrap();
        silences.snapshot().await.unwrap();
        let bytes_before = silences.snapshot_bytes();

        let reloaded = Silences::new(opts(&dir), MemMesh::standalone());
        assert_eq!(reloaded.load().await.unwrap(), 1);
        assert_eq!(reloaded.snapshot_bytes(), bytes_before);
    }

    #[tokio::test]
    async fn test_gc_respects_retention() {
        let dir = tempfile::tempdir().unwrap();
        let silences = Silences::new(
            SilencesOptions {
                retention: 1,
                ..opts(&dir)
            },
            MemMesh::standalone(),
        );
        let now = now_micros();
        let id = silences
            .set(silence_for("x", now - 1, now + seconds_micros(1)))
            .await
            .unwrap();
        silences.expire(&id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(silences.gc(), 1);
        assert!(silences.get(&id).is_none());
    }
}
