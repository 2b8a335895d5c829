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

use crate::operator::AppliedOperator;
use chatdb_common::LogicTime;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LogError {
    #[error("Retrieval error from log: {0}")]
    RetrievalFailure(String),
    #[error("Store failure when appending to log: {0}")]
    StorageFailure(String),
}

/// The durable, append-only operator log. Append order is the linearization
/// order of the engine; `push` must not return before the operator is
/// durable.
///
/// The committed offset is advisory: it only governs where `replay` resumes
/// after a restart, and it always trails far enough behind to reconstruct
/// every transaction that was still resident in the horizon.
pub trait Log: Send + Sync + 'static {
    fn push(&self, operator: &AppliedOperator) -> impl Future<Output = Result<(), LogError>> + Send;

    /// All operators stamped strictly after the committed offset, in append
    /// order.
    fn replay(&self) -> impl Future<Output = Result<Vec<AppliedOperator>, LogError>> + Send;

    fn commit_offset(&self, offset: LogicTime)
    -> impl Future<Output = Result<(), LogError>> + Send;

    fn current_offset(&self) -> impl Future<Output = Result<Option<LogicTime>, LogError>> + Send;
}

struct LogState {
    entries: Vec<AppliedOperator>,
    committed: Option<LogicTime>,
}

/// In-process log for tests and crash simulation; shared between engine
/// incarnations via `Arc` to model a log that outlives the process.
pub struct InMemoryLog {
    state: Mutex<LogState>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LogState {
                entries: Vec::new(),
                committed: None,
            }),
        }
    }

    /// Seed the log with pre-existing operators, as if a prior process had
    /// appended them.
    pub fn with_entries(entries: Vec<AppliedOperator>) -> Self {
        Self {
            state: Mutex::new(LogState {
                entries,
                committed: None,
            }),
        }
    }

    pub fn entries(&self) -> Vec<AppliedOperator> {
        self.state.lock().unwrap().entries.clone()
    }

    /// The committed offset, observable without going through the async
    /// trait surface. Test harnesses poll this.
    pub fn committed(&self) -> Option<LogicTime> {
        self.state.lock().unwrap().committed
    }
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for InMemoryLog {
    async fn push(&self, operator: &AppliedOperator) -> Result<(), LogError> {
        self.state.lock().unwrap().entries.push(operator.clone());
        Ok(())
    }

    async fn replay(&self) -> Result<Vec<AppliedOperator>, LogError> {
        let state = self.state.lock().unwrap();
        let operators = state
            .entries
            .iter()
            .filter(|applied| match state.committed {
                Some(offset) => applied.time > offset,
                None => true,
            })
            .cloned()
            .collect();
        Ok(operators)
    }

    async fn commit_offset(&self, offset: LogicTime) -> Result<(), LogError> {
        self.state.lock().unwrap().committed = Some(offset);
        Ok(())
    }

    async fn current_offset(&self) -> Result<Option<LogicTime>, LogError> {
        Ok(self.state.lock().unwrap().committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Operator;
    use chatdb_common::Xid;
    use uuid::Uuid;

    fn applied(time: i64, xid: u128) -> AppliedOperator {
        AppliedOperator {
            time: LogicTime(time),
            operator: Operator::Rollback {
                xid: Xid(Uuid::from_u128(xid)),
            },
        }
    }

    #[tokio::test]
    async fn test_replay_resumes_after_committed_offset() {
        let log = InMemoryLog::new();
        for time in 1..=4 {
            log.push(&applied(time, time as u128)).await.unwrap();
        }
        assert_eq!(log.replay().await.unwrap().len(), 4);

        log.commit_offset(LogicTime(2)).await.unwrap();
        let replayed = log.replay().await.unwrap();
        assert_eq!(
            replayed.iter().map(|a| a.time).collect::<Vec<_>>(),
            vec![LogicTime(3), LogicTime(4)]
        );
        assert_eq!(log.current_offset().await.unwrap(), Some(LogicTime(2)));
    }
}
