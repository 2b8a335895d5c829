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

//! The transactional concurrency engine. The horizon of active transactions
//! is the one authoritative mutable structure; around it sits a pipeline that
//! linearizes operators through a durable log, batches prepared commits into
//! a replicable buffer, completes them, notifies submitters, and replicates
//! committed effects into the tuple heap with at-least-once replay semantics
//! after a crash.

mod blob;
mod channel;
mod clock;
mod commit_buffer;
mod config;
mod db;
mod effect;
mod heap;
mod heap_writer;
mod horizon;
#[cfg(test)]
mod horizon_tests;
mod log;
mod operator;
mod output_commits;
mod queue;
mod relations;
mod serializer;
mod shared_horizon;
mod transaction;

pub use blob::{BlobError, DurableBlob, FjallBlob, InMemoryBlob};
pub use channel::{CommitChannel, Notification};
pub use clock::LogicClock;
pub use commit_buffer::{BufferError, CommitBuffer};
pub use config::DbConfig;
pub use db::{ChatDb, DbError, TupleOperator};
pub use effect::{Claim, Effect, TupleEffect, deleted_tuple, fold, mutated_tuple, new_tuple, viewed_tuple};
pub use heap::{Heap, HeapError, InMemoryHeap};
pub use heap_writer::HeapWriter;
pub use horizon::{Horizon, HorizonError};
pub use log::{InMemoryLog, Log, LogError};
pub use operator::{AppliedOperator, Operator};
pub use output_commits::OutputCommits;
pub use queue::SyncQueue;
pub use relations::{RelationStore, RelationStoreError};
pub use serializer::{Serializer, SerializerError};
pub use shared_horizon::SharedHorizon;
pub use transaction::{
    Commit, ConflictError, IsolationLevel, PreparedCommit, TransactionState,
};
