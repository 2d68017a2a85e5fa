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

use serde::{Deserialize, Serialize};

/// A cluster member as seen by the local node. Members sort by id; a peer's
/// position in that order decides how long it holds back before notifying.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Member {
    pub id: u64,
    #[serde(default)]
    pub addr: String,
}

pub fn format_peer_id(id: u64) -> String {
    format!("{id:016x}")
}

pub fn parse_peer_id(s: &str) -> Result<u64, anyhow::Error> {
    u64::from_str_radix(s, 16).map_err(|e| anyhow::anyhow!("invalid peer id {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_round_trip() {
        for id in [0u64, 1, u64::MAX, 0xdead_beef] {
            assert_eq!(parse_peer_id(&format_peer_id(id)).unwrap(), id);
        }
        assert!(parse_peer_id("not-hex").is_err());
    }

    #[test]
    fn test_member_ordering() {
        let mut members = vec![
            Member { id: 9, addr: "c".into() },
            Member { id: 1, addr: "a".into() },
            Member { id: 5, addr: "b".into() },
        ];
        members.sort();
        let ids: Vec<u64> = members.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 5, 9]);
    }
}
