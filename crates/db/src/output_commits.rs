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

//! The output stage: takes released batches from the commit buffer, waits
//! for the heap stage to apply each one, then completes its commits in the
//! horizon and publishes the per-transaction outcomes to the waiters.

use crate::blob::DurableBlob;
use crate::channel::CommitChannel;
use crate::clock::LogicClock;
use crate::commit_buffer::{BufferError, CommitBuffer};
use crate::queue::SyncQueue;
use crate::shared_horizon::SharedHorizon;
use crate::transaction::PreparedCommit;
use std::sync::Arc;
use tracing::debug;

pub struct OutputCommits<B: DurableBlob> {
    buffer: Arc<CommitBuffer<B>>,
    output: Arc<SyncQueue<Vec<PreparedCommit>>>,
    horizon: SharedHorizon,
    channel: Arc<CommitChannel>,
    clock: Arc<LogicClock>,
}

impl<B: DurableBlob> OutputCommits<B> {
    pub fn new(
        buffer: Arc<CommitBuffer<B>>,
        output: Arc<SyncQueue<Vec<PreparedCommit>>>,
        horizon: SharedHorizon,
        channel: Arc<CommitChannel>,
        clock: Arc<LogicClock>,
    ) -> Self {
        Self {
            buffer,
            output,
            horizon,
            channel,
            clock,
        }
    }

    pub async fn run(self) -> Result<(), BufferError> {
        loop {
            let batch = self.buffer.next_batch().await?;
            if batch.is_empty() {
                continue;
            }

            // The heap must have applied the batch before any of its commits
            // complete; completion is what lets the log offset advance past
            // them. sync releases on the heap stage's acknowledgment, not on
            // the dequeue.
            self.output.push(batch.clone());
            self.output.sync().await;

            let mut ok_xids = Vec::with_capacity(batch.len());
            let mut errors = Vec::new();
            {
                let mut horizon = self.horizon.acquire().await;
                for prepared in &batch {
                    let time = self.clock.tick();
                    match horizon.complete_commit(time, prepared.xid) {
                        Ok(_) => ok_xids.push(prepared.xid),
                        Err(error) => {
                            debug!(xid = %prepared.xid, %error, "Commit did not complete");
                            errors.push((prepared.xid, error));
                        }
                    }
                }
            }
            self.channel.publish(&ok_xids, errors);
        }
    }
}
