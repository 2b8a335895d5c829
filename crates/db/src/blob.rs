// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    #[error("Retrieval error from blob store: {0}")]
    RetrievalFailure(String),
    #[error("Store failure when writing blob: {0}")]
    StorageFailure(String),
}

/// A named external byte container whose current value survives restart and
/// replaces the in-memory copy on startup. The replicable buffer and the
/// relation catalog each own one.
pub trait DurableBlob: Send + Sync + 'static {
    fn get(&self) -> impl Future<Output = Result<Option<Vec<u8>>, BlobError>> + Send;
    fn set(&self, bytes: &[u8]) -> impl Future<Output = Result<(), BlobError>> + Send;
}

pub struct InMemoryBlob {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl InMemoryBlob {
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new(None),
        }
    }

    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes)),
        }
    }
}

impl Default for InMemoryBlob {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableBlob for InMemoryBlob {
    async fn get(&self) -> Result<Option<Vec<u8>>, BlobError> {
        Ok(self.bytes.lock().unwrap().clone())
    }

    async fn set(&self, bytes: &[u8]) -> Result<(), BlobError> {
        *self.bytes.lock().unwrap() = Some(bytes.to_vec());
        Ok(())
    }
}

const BLOB_KEY: &[u8] = b"blob";

/// Durable blob on a fjall partition, one key per blob. Writes are synced
/// before return, so a value handed back by `set` is crash-safe.
pub struct FjallBlob {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

impl FjallBlob {
    pub fn open(path: &Path, name: &str) -> Result<Self, BlobError> {
        let keyspace = Config::new(path)
            .open()
            .map_err(|e| BlobError::StorageFailure(e.to_string()))?;
        let partition = keyspace
            .open_partition(name, PartitionCreateOptions::default())
            .map_err(|e| BlobError::StorageFailure(e.to_string()))?;
        Ok(Self {
            keyspace,
            partition,
        })
    }
}

impl DurableBlob for FjallBlob {
    async fn get(&self) -> Result<Option<Vec<u8>>, BlobError> {
        let value = self
            .partition
            .get(BLOB_KEY)
            .map_err(|e| BlobError::RetrievalFailure(e.to_string()))?;
        Ok(value.map(|slice| slice.to_vec()))
    }

    async fn set(&self, bytes: &[u8]) -> Result<(), BlobError> {
        self.partition
            .insert(BLOB_KEY, bytes)
            .map_err(|e| BlobError::StorageFailure(e.to_string()))?;
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(|e| BlobError::StorageFailure(e.to_string()))?;
        Ok(())
    }
}
