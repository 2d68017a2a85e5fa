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

use once_cell::sync::Lazy;

use crate::utils::rand::generate_random_u64;

// process-wide peer identity, minted once at startup
static LOCAL_PEER_ID: Lazy<u64> = Lazy::new(generate_random_u64);

pub fn generate() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn local_peer_id() -> u64 {
    *LOCAL_PEER_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id() {
        let id = generate();
        assert_eq!(id.len(), 36);
        assert_ne!(id, generate());
    }

    #[test]
    fn test_local_peer_id_stable() {
        assert_eq!(local_peer_id(), local_peer_id());
    }
}
