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

//! The engine facade. Wires the horizon, clock, buffer, channel, and the
//! three pipeline stages together, runs crash recovery, and exposes the
//! submitting-client surface: start, commit, rollback, view, and relation
//! creation. Transports sit on top of this and are out of scope here.

use crate::blob::DurableBlob;
use crate::channel::CommitChannel;
use crate::clock::LogicClock;
use crate::commit_buffer::CommitBuffer;
use crate::config::DbConfig;
use crate::effect::{self, Effect, deleted_tuple, mutated_tuple, new_tuple, viewed_tuple};
use crate::heap::{Heap, HeapError};
use crate::heap_writer::HeapWriter;
use crate::horizon::{Horizon, HorizonError};
use crate::log::Log;
use crate::operator::Operator;
use crate::output_commits::OutputCommits;
use crate::queue::SyncQueue;
use crate::relations::{RelationStore, RelationStoreError};
use crate::serializer::{Serializer, SerializerError};
use crate::shared_horizon::SharedHorizon;
use crate::transaction::{IsolationLevel, TransactionState};
use chatdb_common::{Relation, RelationError, RelationNumber, Scalar, Tid, Tuple, Xid};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbError {
    #[error(transparent)]
    Horizon(#[from] HorizonError),
    #[error(transparent)]
    Relation(#[from] RelationError),
    #[error(transparent)]
    Catalog(#[from] RelationStoreError),
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error(transparent)]
    Recovery(#[from] SerializerError),
    #[error("Engine is shut down")]
    Shutdown,
}

/// A client-submitted relational operation, resolved against the relation
/// catalog into an effect before it enters the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TupleOperator {
    New {
        relation: RelationNumber,
        scalars: Vec<Scalar>,
    },
    Mutate {
        tid: Tid,
        relation: RelationNumber,
        scalars: Vec<Scalar>,
    },
    Delete {
        tid: Tid,
    },
    Claim {
        id: Uuid,
        object: String,
    },
}

pub struct ChatDb<H: Heap, RB: DurableBlob> {
    pub(crate) input: flume::Sender<Operator>,
    pub(crate) channel: Arc<CommitChannel>,
    pub(crate) horizon: SharedHorizon,
    pub(crate) relations: Arc<RelationStore<RB>>,
    pub(crate) heap: Arc<H>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<H: Heap, RB: DurableBlob> ChatDb<H, RB> {
    /// Open the engine over its external collaborators: run crash recovery
    /// to completion, then launch the pipeline stages. No client operator is
    /// accepted until the buffer blob and the log have been replayed.
    pub async fn launch<L: Log, BB: DurableBlob>(
        log: Arc<L>,
        heap: Arc<H>,
        buffer_blob: BB,
        relations_blob: RB,
        config: DbConfig,
    ) -> Result<Arc<Self>, DbError> {
        let relations = Arc::new(RelationStore::open(relations_blob).await?);
        let horizon = SharedHorizon::new(Horizon::new(
            config.horizon_max_len,
            config.horizon_max_age,
        ));
        let clock = Arc::new(LogicClock::new());
        let channel = Arc::new(CommitChannel::new());
        let buffer = Arc::new(CommitBuffer::new(
            buffer_blob,
            config.buffer_overflow_len,
            config.buffer_overflow_timeout,
        ));
        let output = Arc::new(SyncQueue::new());
        let (input, input_receiver) = flume::unbounded();

        let serializer = Serializer::new(
            log,
            horizon.clone(),
            buffer.clone(),
            channel.clone(),
            clock.clone(),
            input_receiver,
        );
        serializer.recover().await?;

        let output_commits = OutputCommits::new(
            buffer,
            output.clone(),
            horizon.clone(),
            channel.clone(),
            clock,
        );
        let heap_writer = HeapWriter::new(heap.clone(), output);

        let tasks = vec![
            tokio::spawn(async move {
                if let Err(error) = serializer.run().await {
                    error!(%error, "Serialization stage failed");
                }
            }),
            tokio::spawn(async move {
                if let Err(error) = output_commits.run().await {
                    error!(%error, "Output commits stage failed");
                }
            }),
            tokio::spawn(async move {
                if let Err(error) = heap_writer.run().await {
                    error!(%error, "Heap replication stage failed");
                }
            }),
        ];

        Ok(Arc::new(Self {
            input,
            channel,
            horizon,
            relations,
            heap,
            tasks: Mutex::new(tasks),
        }))
    }

    /// Begin a transaction under the given isolation level.
    pub fn start(&self, isolation: IsolationLevel) -> Result<Xid, DbError> {
        let xid = Xid(Uuid::new_v4());
        self.input_operator(Operator::Start { xid, isolation })?;
        Ok(xid)
    }

    /// Resolve the client operations into effects, submit the commit
    /// operator, and wait for the attempt's outcome. The subscription is
    /// registered before the operator enters the pipeline, so the waiter
    /// observes exactly this attempt.
    pub async fn commit(&self, xid: Xid, operators: Vec<TupleOperator>) -> Result<(), DbError> {
        let mut effects = Vec::with_capacity(operators.len());
        for operator in operators {
            effects.push(self.effect_of(operator)?);
        }

        let waiter = self.channel.subscribe(xid);
        self.input_operator(Operator::Commit { xid, effects })?;

        let notification = waiter.await.map_err(|_| DbError::Shutdown)?;
        match notification.error {
            None => Ok(()),
            Some(error) => Err(error.into()),
        }
    }

    /// Roll back an active transaction. Fire-and-forget: a rollback that
    /// races transaction eviction has nothing left to undo.
    pub fn rollback(&self, xid: Xid) -> Result<(), DbError> {
        self.input_operator(Operator::Rollback { xid })
    }

    /// Equality search over one attribute, recording a view of every tuple
    /// returned so later writers of those tuples conflict with us.
    pub async fn view(
        &self,
        xid: Xid,
        relation_number: RelationNumber,
        attribute: usize,
        scalar: &Scalar,
    ) -> Result<Vec<Tuple>, DbError> {
        {
            let horizon = self.horizon.acquire().await;
            match horizon.transaction_state(xid) {
                Some(TransactionState::Active) => {}
                Some(_) => return Err(HorizonError::InvalidTransactionState(xid).into()),
                None => return Err(HorizonError::NoTransaction(xid).into()),
            }
        }

        let relation = self.relations.relation(relation_number)?;
        let tuples = self
            .heap
            .tuples_with_attribute(relation_number, attribute, scalar)
            .await?;

        for tuple in &tuples {
            let viewed = viewed_tuple(tuple, &relation)?;
            self.input_operator(Operator::Intermediate {
                xid,
                effect: Effect::Tuple(viewed),
            })?;
        }
        Ok(tuples)
    }

    pub async fn create_relation(&self, relation: Relation) -> Result<(), DbError> {
        self.relations.add(relation).await?;
        Ok(())
    }

    /// Feed one raw operator into the linearized stream. This is the seam
    /// replication and test harnesses use; the typed surface above goes
    /// through it too.
    pub fn input_operator(&self, operator: Operator) -> Result<(), DbError> {
        self.input.send(operator).map_err(|_| DbError::Shutdown)
    }

    pub fn stop(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    fn effect_of(&self, operator: TupleOperator) -> Result<Effect, DbError> {
        Ok(match operator {
            TupleOperator::New { relation, scalars } => {
                let relation = self.relations.relation(relation)?;
                let tid = Tid(Uuid::new_v4());
                Effect::Tuple(new_tuple(tid, scalars, &relation)?)
            }
            TupleOperator::Mutate {
                tid,
                relation,
                scalars,
            } => {
                let relation = self.relations.relation(relation)?;
                Effect::Tuple(mutated_tuple(tid, scalars, &relation)?)
            }
            TupleOperator::Delete { tid } => Effect::Tuple(deleted_tuple(tid)),
            TupleOperator::Claim { id, object } => Effect::Claim(effect::Claim { id, object }),
        })
    }
}

impl<H: Heap, RB: DurableBlob> Drop for ChatDb<H, RB> {
    fn drop(&mut self) {
        self.stop();
    }
}
