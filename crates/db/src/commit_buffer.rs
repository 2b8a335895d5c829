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

//! Size-and-time bounded batcher of prepared commits. A batch is released
//! when the pending count reaches `overflow_len`, or when `overflow_timeout`
//! has elapsed since the last release and anything is pending. The whole
//! batch is persisted to the durable blob before it is yielded, so the
//! consumer only ever sees batches that a restart would re-emit.
//!
//! The blob holds a single batch: each release overwrites the previous one.
//! The output stage does not come back for the next batch until the heap has
//! acknowledged the current one, so an overwritten batch is always already
//! applied.

use crate::blob::{BlobError, DurableBlob};
use crate::transaction::PreparedCommit;
use ahash::AHasher;
use chatdb_common::Xid;
use std::collections::{HashSet, VecDeque};
use std::hash::BuildHasherDefault;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error("Encoding failure for commit batch: {0}")]
    EncodingFailure(String),
}

struct BufferState {
    pending: VecDeque<PreparedCommit>,
    /// XIDs currently pending, for replay deduplication: log recovery may
    /// re-prepare a commit the blob already restored.
    xids: HashSet<Xid, BuildHasherDefault<AHasher>>,
    last_release: Instant,
}

pub struct CommitBuffer<B: DurableBlob> {
    blob: B,
    overflow_len: usize,
    overflow_timeout: Duration,
    state: Mutex<BufferState>,
    overflowed: Notify,
}

impl<B: DurableBlob> CommitBuffer<B> {
    pub fn new(blob: B, overflow_len: usize, overflow_timeout: Duration) -> Self {
        Self {
            blob,
            overflow_len,
            overflow_timeout,
            state: Mutex::new(BufferState {
                pending: VecDeque::new(),
                xids: HashSet::default(),
                last_release: Instant::now(),
            }),
            overflowed: Notify::new(),
        }
    }

    /// Restore the batch persisted by a previous incarnation, if any. Runs
    /// before the stages start accepting new writes.
    pub async fn replay(&self) -> Result<usize, BufferError> {
        let Some(bytes) = self.blob.get().await? else {
            return Ok(0);
        };
        let batch: Vec<PreparedCommit> = serde_json::from_slice(&bytes)
            .map_err(|e| BufferError::EncodingFailure(e.to_string()))?;

        let mut count = 0;
        {
            let mut state = self.state.lock().unwrap();
            for commit in batch {
                if state.xids.insert(commit.xid) {
                    state.pending.push_back(commit);
                    count += 1;
                }
            }
        }
        if count > 0 {
            self.overflowed.notify_one();
        }
        Ok(count)
    }

    pub fn add(&self, commit: PreparedCommit) {
        {
            let mut state = self.state.lock().unwrap();
            if !state.xids.insert(commit.xid) {
                debug!(xid = %commit.xid, "Prepared commit already pending; skipping duplicate");
                return;
            }
            state.pending.push_back(commit);
        }
        self.overflowed.notify_one();
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Wait for the next batch to come due, persist it, and hand it over.
    /// Single consumer.
    pub async fn next_batch(&self) -> Result<Vec<PreparedCommit>, BufferError> {
        loop {
            let (due, deadline) = {
                let state = self.state.lock().unwrap();
                let deadline = state.last_release + self.overflow_timeout;
                let due = state.pending.len() >= self.overflow_len
                    || (!state.pending.is_empty() && Instant::now() >= deadline);
                (due, deadline)
            };
            if due {
                return self.release().await;
            }

            let overflowed = self.overflowed.notified();
            if Instant::now() >= deadline {
                // Timeout already elapsed with nothing pending; only a new
                // add can make a batch due.
                overflowed.await;
            } else {
                tokio::select! {
                    _ = overflowed => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
        }
    }

    async fn release(&self) -> Result<Vec<PreparedCommit>, BufferError> {
        let batch: Vec<PreparedCommit> = {
            let mut state = self.state.lock().unwrap();
            let n = state.pending.len().min(self.overflow_len);
            let batch: Vec<_> = state.pending.drain(..n).collect();
            for commit in &batch {
                state.xids.remove(&commit.xid);
            }
            state.last_release = Instant::now();
            batch
        };

        let encoded = serde_json::to_vec(&batch)
            .map_err(|e| BufferError::EncodingFailure(e.to_string()))?;
        self.blob.set(&encoded).await?;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::InMemoryBlob;
    use chatdb_common::Xid;
    use uuid::Uuid;

    fn commit(n: u128) -> PreparedCommit {
        PreparedCommit {
            xid: Xid(Uuid::from_u128(n)),
            effect: vec![],
        }
    }

    fn buffer(overflow_len: usize, timeout_ms: u64) -> CommitBuffer<InMemoryBlob> {
        CommitBuffer::new(
            InMemoryBlob::new(),
            overflow_len,
            Duration::from_millis(timeout_ms),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_triggered_release() {
        let buffer = buffer(2, 60_000);
        buffer.add(commit(1));
        buffer.add(commit(2));
        buffer.add(commit(3));

        let batch = buffer.next_batch().await.unwrap();
        assert_eq!(batch, vec![commit(1), commit(2)]);
        assert_eq!(buffer.pending_len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_triggered_release() {
        let buffer = buffer(10, 100);
        buffer.add(commit(1));

        let start = Instant::now();
        let batch = buffer.next_batch().await.unwrap();
        assert_eq!(batch, vec![commit(1)]);
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    /// The timeout measures from the last release, not from the last add.
    #[tokio::test(start_paused = true)]
    async fn test_timeout_resets_only_on_release() {
        let buffer = buffer(10, 100);
        buffer.add(commit(1));
        let first_release = {
            buffer.next_batch().await.unwrap();
            Instant::now()
        };

        tokio::time::advance(Duration::from_millis(60)).await;
        buffer.add(commit(2));
        let batch = buffer.next_batch().await.unwrap();
        assert_eq!(batch, vec![commit(2)]);
        // Due 100ms after the first release, not 100ms after the add.
        assert_eq!(first_release.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_is_persisted_before_yield() {
        let buffer = buffer(1, 60_000);
        buffer.add(commit(7));
        let batch = buffer.next_batch().await.unwrap();

        let bytes = buffer.blob.get().await.unwrap().expect("batch persisted");
        let persisted: Vec<PreparedCommit> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(persisted, batch);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_restores_and_deduplicates() {
        let blob = InMemoryBlob::with_bytes(
            serde_json::to_vec(&vec![commit(1), commit(2)]).unwrap(),
        );
        let buffer = CommitBuffer::new(blob, 2, Duration::from_millis(100));
        assert_eq!(buffer.replay().await.unwrap(), 2);

        // Recovery re-prepares commit 1; the pending batch already has it.
        buffer.add(commit(1));
        assert_eq!(buffer.pending_len(), 2);

        let batch = buffer.next_batch().await.unwrap();
        assert_eq!(batch, vec![commit(1), commit(2)]);
    }
}
