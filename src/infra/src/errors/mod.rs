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

use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("IoError# {0}")]
    IoError(#[from] std::io::Error),
    #[error("SerdeJsonError# {0}")]
    SerdeJsonError(#[from] serde_json::Error),
    /// Malformed input from a client; reported back, never retried.
    #[error("ValidationError# {0}")]
    Validation(String),
    /// Temporary delivery failure; the pipeline retries within its deadline.
    #[error("TransientError# {0}")]
    Transient(String),
    /// Definite failure; retrying would not help.
    #[error("PermanentError# {0}")]
    Permanent(String),
    /// A subscriber fell behind and its subscription was severed.
    #[error("OverflowError# subscriber {0} queue full, subscription closed")]
    Overflow(String),
    /// Snapshot persistence failed; the in-memory store stays authoritative.
    #[error("StorageError# {0}")]
    Storage(String),
    /// Gossip exchange failure; replicas converge on the next exchange.
    #[error("PeerError# {0}")]
    Peer(String),
    #[error("Error# {0}")]
    Message(String),
}

impl Error {
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::IoError(_))
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Permanent(format!("decode: {e}"))
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Message(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("label set empty".to_string());
        assert_eq!(err.to_string(), "ValidationError# label set empty");

        let err = Error::Overflow("dispatcher".to_string());
        assert!(err.to_string().contains("dispatcher"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Transient("timeout".into()).is_transient());
        assert!(!Error::Permanent("bad request".into()).is_transient());
        assert!(Error::Permanent("bad request".into()).is_permanent());
        assert!(Error::Validation("x".into()).is_permanent());
    }
}
