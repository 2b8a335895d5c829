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

//! Replicates committed effects into the tuple heap, in commit-completion
//! order. The first batch after a restart may already have been partially
//! applied by the previous incarnation, so it goes through the idempotent
//! path; every later batch is known to be fresh.

use crate::effect::TupleEffect;
use crate::heap::{Heap, HeapError};
use crate::queue::SyncQueue;
use crate::transaction::PreparedCommit;
use std::sync::Arc;
use tracing::debug;

pub struct HeapWriter<H: Heap> {
    heap: Arc<H>,
    output: Arc<SyncQueue<Vec<PreparedCommit>>>,
}

impl<H: Heap> HeapWriter<H> {
    pub fn new(heap: Arc<H>, output: Arc<SyncQueue<Vec<PreparedCommit>>>) -> Self {
        Self { heap, output }
    }

    pub async fn run(self) -> Result<(), HeapError> {
        let mut first_batch_after_startup = true;
        loop {
            let batch = self.output.next().await;
            let effects: Vec<TupleEffect> = batch
                .into_iter()
                .flat_map(|commit| commit.effect)
                .collect();

            if first_batch_after_startup {
                debug!(
                    effects = effects.len(),
                    "Applying first batch since startup idempotently"
                );
                self.heap.map_idempotently(&effects).await?;
                first_batch_after_startup = false;
            } else {
                self.heap.map(&effects).await?;
            }

            // Acknowledged only once the heap accepted the batch; a failed
            // apply leaves it unacknowledged, so the output stage's sync
            // never releases and the offset cannot advance past it.
            self.output.ack();
        }
    }
}
