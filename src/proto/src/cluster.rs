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

/// Matcher kinds on the wire. Kept as a plain i32 so unknown future kinds
/// survive a round trip through an older peer.
pub mod matcher_type {
    pub const EQUAL: i32 = 0;
    pub const REGEX: i32 = 1;
    pub const NOT_EQUAL: i32 = 2;
    pub const NOT_REGEX: i32 = 3;
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MeshMatcher {
    #[prost(int32, tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub pattern: ::prost::alloc::string::String,
}

/// A silence as replicated between peers. Matchers are written sorted by
/// (name, pattern, type) so the encoding is canonical.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MeshSilence {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub matchers: ::prost::alloc::vec::Vec<MeshMatcher>,
    #[prost(int64, tag = "3")]
    pub starts_at: i64,
    #[prost(int64, tag = "4")]
    pub ends_at: i64,
    #[prost(int64, tag = "5")]
    pub updated_at: i64,
    #[prost(string, tag = "6")]
    pub created_by: ::prost::alloc::string::String,
    #[prost(string, tag = "7")]
    pub comment: ::prost::alloc::string::String,
    /// When the entry may be dropped from replicas, end time plus retention.
    #[prost(int64, tag = "8")]
    pub expires_at: i64,
    /// Set when the silence was deleted before it ever became active. The
    /// record keeps replicating so the deletion wins on every peer.
    #[prost(bool, tag = "9")]
    pub deleted: bool,
}

/// One notification-log record: this peer notified this receiver for this
/// group, with these firing and resolved alert set hashes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MeshLogEntry {
    #[prost(string, tag = "1")]
    pub group_key: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub receiver: ::prost::alloc::string::String,
    #[prost(fixed64, tag = "3")]
    pub peer: u64,
    #[prost(int64, tag = "4")]
    pub timestamp: i64,
    #[prost(fixed64, tag = "5")]
    pub firing_hash: u64,
    #[prost(fixed64, tag = "6")]
    pub resolved_hash: u64,
    #[prost(int64, tag = "7")]
    pub expires_at: i64,
}
