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

//! Canonical binary encodings for the replicated stores. Both gossip payloads
//! and on-disk snapshots are a length-delimited sequence of these messages.
//! Replica merges compare encodings byte for byte, so encoding stability
//! matters: repeated fields must be written in a deterministic order by the
//! caller and map fields are avoided entirely.

use bytes::Buf;
use prost::Message;

pub mod cluster;

pub use cluster::{MeshLogEntry, MeshMatcher, MeshSilence, matcher_type};

/// Append one message, length-prefixed, to `buf`.
pub fn encode_entry<M: Message>(msg: &M, buf: &mut Vec<u8>) {
    msg.encode_length_delimited(buf)
        .expect("Vec<u8> buffer cannot run out of capacity");
}

/// Encode a sequence of messages as a snapshot payload.
pub fn encode_snapshot<'a, M, I>(items: I) -> Vec<u8>
where
    M: Message + 'a,
    I: IntoIterator<Item = &'a M>,
{
    let mut buf = Vec::new();
    for item in items {
        encode_entry(item, &mut buf);
    }
    buf
}

/// Decode a snapshot payload back into messages. Fails on the first
/// truncated or malformed entry.
pub fn decode_snapshot<M: Message + Default>(mut buf: &[u8]) -> Result<Vec<M>, prost::DecodeError> {
    let mut out = Vec::new();
    while buf.has_remaining() {
        let msg = M::decode_length_delimited(&mut buf)?;
        out.push(msg);
    }
    Ok(out)
}

/// The canonical single-message encoding, used for merge tie-breaking.
pub fn canonical_bytes<M: Message>(msg: &M) -> Vec<u8> {
    let mut buf = Vec::with_capacity(msg.encoded_len());
    msg.encode(&mut buf)
        .expect("Vec<u8> buffer cannot run out of capacity");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_silence(id: &str) -> MeshSilence {
        MeshSilence {
            id: id.to_string(),
            matchers: vec![MeshMatcher {
                r#type: matcher_type::EQUAL,
                name: "alertname".to_string(),
                pattern: "HighLatency".to_string(),
            }],
            starts_at: 1,
            ends_at: 2,
            updated_at: 3,
            created_by: "ops".to_string(),
            comment: "planned".to_string(),
            expires_at: 4,
            deleted: false,
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let items = vec![sample_silence("a"), sample_silence("b")];
        let buf = encode_snapshot(items.iter());
        let decoded: Vec<MeshSilence> = decode_snapshot(&buf).unwrap();
        assert_eq!(items, decoded);
    }

    #[test]
    fn test_snapshot_byte_stable() {
        let items = vec![sample_silence("a")];
        let a = encode_snapshot(items.iter());
        let b = encode_snapshot(items.iter());
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let buf = encode_snapshot(vec![sample_silence("a")].iter());
        assert!(decode_snapshot::<MeshSilence>(&buf[..buf.len() - 1]).is_err());
    }

    #[test]
    fn test_canonical_bytes_orders_by_content() {
        let a = canonical_bytes(&sample_silence("a"));
        let b = canonical_bytes(&sample_silence("b"));
        assert_ne!(a, b);
        assert_eq!(a, canonical_bytes(&sample_silence("a")));
    }

    #[test]
    fn test_log_entry_round_trip() {
        let entry = MeshLogEntry {
            group_key: "{}/{alertname=\"x\"}:{}".to_string(),
            receiver: "default".to_string(),
            peer: 42,
            timestamp: 123_456,
            firing_hash: 7,
            resolved_hash: 8,
            expires_at: 999,
        };
        let buf = encode_snapshot(vec![entry.clone()].iter());
        let decoded: Vec<MeshLogEntry> = decode_snapshot(&buf).unwrap();
        assert_eq!(decoded, vec![entry]);
    }
}
