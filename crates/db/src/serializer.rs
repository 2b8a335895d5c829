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

//! The serialization stage: the single task that feeds operators into the
//! horizon. Recovery first drains the log from its committed offset to
//! rebuild the horizon; steady state then stamps each incoming operator,
//! appends it durably, and only then applies it, so a crash can always
//! reconstruct the horizon from the log.

use crate::blob::DurableBlob;
use crate::channel::CommitChannel;
use crate::clock::LogicClock;
use crate::commit_buffer::{BufferError, CommitBuffer};
use crate::log::{Log, LogError};
use crate::operator::{AppliedOperator, Operator};
use crate::shared_horizon::SharedHorizon;
use chatdb_common::LogicTime;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SerializerError {
    #[error(transparent)]
    Log(#[from] LogError),
    #[error(transparent)]
    Buffer(#[from] BufferError),
}

pub struct Serializer<L: Log, B: DurableBlob> {
    log: Arc<L>,
    horizon: SharedHorizon,
    buffer: Arc<CommitBuffer<B>>,
    channel: Arc<CommitChannel>,
    clock: Arc<LogicClock>,
    input: flume::Receiver<Operator>,
}

impl<L: Log, B: DurableBlob> Serializer<L, B> {
    pub fn new(
        log: Arc<L>,
        horizon: SharedHorizon,
        buffer: Arc<CommitBuffer<B>>,
        channel: Arc<CommitChannel>,
        clock: Arc<LogicClock>,
        input: flume::Receiver<Operator>,
    ) -> Self {
        Self {
            log,
            horizon,
            buffer,
            channel,
            clock,
            input,
        }
    }

    /// Crash recovery. Restores the buffer's persisted batch, then re-applies
    /// every logged operator past the committed offset; prepared commits
    /// produced again on the way are deduplicated by the buffer. Runs to
    /// completion before any new operator is accepted.
    pub async fn recover(&self) -> Result<(), SerializerError> {
        let restored = self.buffer.replay().await?;
        if restored > 0 {
            info!(restored, "Restored prepared commits from the buffer blob");
        }

        let operators = self.log.replay().await?;
        let replayed = operators.len();
        for applied in operators {
            self.clock.advance_to(applied.time);
            self.apply(&applied).await?;
        }
        if replayed > 0 {
            info!(replayed, "Re-applied logged operators into the horizon");
        }
        Ok(())
    }

    /// Steady state: consume the intake queue until it disconnects. The
    /// operator must be durable in the log before it touches the horizon.
    pub async fn run(self) -> Result<(), SerializerError> {
        while let Ok(operator) = self.input.recv_async().await {
            let applied = AppliedOperator {
                time: self.clock.tick(),
                operator,
            };
            self.log.push(&applied).await?;
            self.apply(&applied).await?;
        }
        debug!("Operator intake disconnected; serialization stage stopping");
        Ok(())
    }

    async fn apply(&self, applied: &AppliedOperator) -> Result<(), SerializerError> {
        let mut prepared = None;
        let mut failed_commit = None;

        let offset = {
            let mut horizon = self.horizon.acquire().await;
            match &applied.operator {
                Operator::Start { xid, isolation } => {
                    if let Err(error) = horizon.start_transaction(applied.time, *xid, *isolation) {
                        warn!(%xid, %error, "Dropping start operator");
                    }
                }
                Operator::Intermediate { xid, effect } => {
                    if let Err(error) = horizon.include(applied.time, *xid, effect.clone()) {
                        warn!(%xid, %error, "Dropping intermediate operator");
                    }
                }
                Operator::Commit { xid, effects } => {
                    match horizon.commit_transaction(applied.time, *xid, effects.clone()) {
                        Ok(commit) => prepared = Some(commit),
                        Err(error) => failed_commit = Some((*xid, error)),
                    }
                }
                Operator::Rollback { xid } => {
                    if let Err(error) = horizon.rollback_transaction(applied.time, *xid) {
                        warn!(%xid, %error, "Dropping rollback operator");
                    }
                }
            }

            // Restart must be able to rebuild every transaction still
            // resident, so the acknowledged offset trails just behind the
            // oldest of them; with the horizon empty, this operator itself
            // is the frontier.
            horizon
                .oldest_start()
                .map(LogicTime::prev)
                .unwrap_or(applied.time)
        };

        if let Some(commit) = prepared {
            self.buffer.add(commit);
        }
        if let Some((xid, error)) = failed_commit {
            self.channel.publish_error(xid, error);
        }

        if self.log.current_offset().await? != Some(offset) {
            self.log.commit_offset(offset).await?;
        }
        Ok(())
    }
}
