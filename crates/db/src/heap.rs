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

use crate::effect::TupleEffect;
use ahash::AHasher;
use chatdb_common::{RelationNumber, Scalar, Tid, Tuple};
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("Tuple {0} already exists in the heap")]
    DuplicateTuple(Tid),
    #[error("Tuple {0} is not in the heap")]
    MissingTuple(Tid),
    #[error("Store failure when mutating the heap: {0}")]
    StorageFailure(String),
}

/// The materialized tuple store. Committed effects are applied in
/// commit-completion order; `map_idempotently` is the replay-tolerant
/// variant used for the first batch after a restart, when part of the batch
/// may already have been applied before the crash: `New` on an existing TID
/// behaves as `Mutated`, `Mutated` on an absent TID re-creates, and
/// `Deleted` on an absent TID is a no-op.
pub trait Heap: Send + Sync + 'static {
    fn map(&self, effects: &[TupleEffect]) -> impl Future<Output = Result<(), HeapError>> + Send;

    fn map_idempotently(
        &self,
        effects: &[TupleEffect],
    ) -> impl Future<Output = Result<(), HeapError>> + Send;

    /// Full-scan equality search over one attribute of one relation.
    fn tuples_with_attribute(
        &self,
        relation: RelationNumber,
        attribute: usize,
        scalar: &Scalar,
    ) -> impl Future<Output = Result<Vec<Tuple>, HeapError>> + Send;
}

pub struct InMemoryHeap {
    tuples: Mutex<HashMap<Tid, Tuple, BuildHasherDefault<AHasher>>>,
}

impl InMemoryHeap {
    pub fn new() -> Self {
        Self {
            tuples: Mutex::new(HashMap::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.tuples.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.lock().unwrap().is_empty()
    }

    pub fn tuple(&self, tid: Tid) -> Option<Tuple> {
        self.tuples.lock().unwrap().get(&tid).cloned()
    }
}

impl Default for InMemoryHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap for InMemoryHeap {
    async fn map(&self, effects: &[TupleEffect]) -> Result<(), HeapError> {
        let mut tuples = self.tuples.lock().unwrap();
        for effect in effects {
            match effect {
                TupleEffect::New(tuple) => {
                    if tuples.contains_key(&tuple.tid()) {
                        return Err(HeapError::DuplicateTuple(tuple.tid()));
                    }
                    tuples.insert(tuple.tid(), tuple.clone());
                }
                TupleEffect::Mutated(tuple) => {
                    if !tuples.contains_key(&tuple.tid()) {
                        return Err(HeapError::MissingTuple(tuple.tid()));
                    }
                    tuples.insert(tuple.tid(), tuple.clone());
                }
                TupleEffect::Deleted(tid) => {
                    if tuples.remove(tid).is_none() {
                        return Err(HeapError::MissingTuple(*tid));
                    }
                }
                TupleEffect::Viewed(_) => {}
            }
        }
        Ok(())
    }

    async fn map_idempotently(&self, effects: &[TupleEffect]) -> Result<(), HeapError> {
        let mut tuples = self.tuples.lock().unwrap();
        for effect in effects {
            match effect {
                TupleEffect::New(tuple) | TupleEffect::Mutated(tuple) => {
                    tuples.insert(tuple.tid(), tuple.clone());
                }
                TupleEffect::Deleted(tid) => {
                    tuples.remove(tid);
                }
                TupleEffect::Viewed(_) => {}
            }
        }
        Ok(())
    }

    async fn tuples_with_attribute(
        &self,
        relation: RelationNumber,
        attribute: usize,
        scalar: &Scalar,
    ) -> Result<Vec<Tuple>, HeapError> {
        let tuples = self.tuples.lock().unwrap();
        Ok(tuples
            .values()
            .filter(|tuple| {
                tuple.relation_version().relation == relation
                    && tuple.scalars().get(attribute) == Some(scalar)
            })
            .cloned()
            .collect())
    }
}
