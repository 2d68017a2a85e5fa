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

//! Atomic snapshot files for the replicated stores. A snapshot is written to
//! a temp file in the destination directory, fsynced, then renamed over the
//! target so readers never observe a partial file.

use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::errors::{Error, Result};

pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage(format!("snapshot path {path:?} has no parent")))?;
    tokio::fs::create_dir_all(dir).await.map_err(storage)?;

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await.map_err(storage)?;
    file.write_all(data).await.map_err(storage)?;
    file.sync_all().await.map_err(storage)?;
    drop(file);

    tokio::fs::rename(&tmp, path).await.map_err(storage)?;
    Ok(())
}

/// Missing file means a fresh start, not an error.
pub async fn read(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(storage(e)),
    }
}

fn storage(e: std::io::Error) -> Error {
    Error::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silences");

        assert_eq!(read(&path).await.unwrap(), None);

        write_atomic(&path, b"one").await.unwrap();
        assert_eq!(read(&path).await.unwrap(), Some(b"one".to_vec()));

        // overwrite is atomic, last writer wins
        write_atomic(&path, b"two").await.unwrap();
        assert_eq!(read(&path).await.unwrap(), Some(b"two".to_vec()));

        // no temp file left behind
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_write_creates_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/nflog");
        write_atomic(&path, b"x").await.unwrap();
        assert_eq!(read(&path).await.unwrap(), Some(b"x".to_vec()));
    }
}
