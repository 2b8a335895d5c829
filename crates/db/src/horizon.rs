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

//! The horizon: the ordered collection of active transactions, the arena
//! through which their neighborhood links resolve, and the enforcement of
//! the size and age bounds. Insertion order is start order, so the first
//! entry of each arena is its oldest; limits always evict the globally
//! oldest transaction.
//!
//! Every operation takes the caller's logical time and advances the
//! horizon's own time strictly; a non-increasing time is a contract
//! violation, not a recoverable condition.

use crate::effect::{Claim, Effect};
use crate::transaction::{
    Commit, IsolationLevel, PreparedCommit, ReadTransaction, SerializableTransaction,
    TransactionState,
};
use ahash::AHasher;
use chatdb_common::{LogicTime, Xid};
use indexmap::IndexMap;
use std::hash::BuildHasherDefault;
use thiserror::Error;
use tracing::warn;

type Hasher = BuildHasherDefault<AHasher>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HorizonError {
    #[error("No transaction {0}")]
    NoTransaction(Xid),
    #[error("Invalid state for transaction {0}")]
    InvalidTransactionState(Xid),
    #[error("Conflict for transaction {xid}; {} claim(s) rejected", rejected_claims.len())]
    Conflict {
        xid: Xid,
        rejected_claims: Vec<Claim>,
    },
    #[error("Write effects included in non-serializable read transaction {0}")]
    NonSerializableWriteTransaction(Xid),
    #[error("Time {proposed} does not advance the horizon past {current}")]
    NotMonotonicTime {
        current: LogicTime,
        proposed: LogicTime,
    },
}

/// How a serializable transaction leaves the arena. A rollback withdraws the
/// conflict sets it deposited at prepare; completion leaves them in place so
/// the committed transaction still defeats overlapping concurrent ones.
#[derive(PartialEq)]
enum Removal {
    Rollback,
    Complete,
}

pub struct Horizon {
    max_len: usize,
    max_age: i64,
    time: Option<LogicTime>,
    serializable: IndexMap<Xid, SerializableTransaction, Hasher>,
    read_only: IndexMap<Xid, ReadTransaction, Hasher>,
}

impl Horizon {
    pub fn new(max_len: usize, max_age: i64) -> Self {
        Self {
            max_len,
            max_age,
            time: None,
            serializable: IndexMap::default(),
            read_only: IndexMap::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.serializable.len() + self.read_only.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serializable.is_empty() && self.read_only.is_empty()
    }

    pub fn time(&self) -> Option<LogicTime> {
        self.time
    }

    /// Start time of the oldest resident transaction, across both isolation
    /// variants. The log's committed offset trails one tick behind this.
    pub fn oldest_start(&self) -> Option<LogicTime> {
        self.oldest().map(|(_, start)| start)
    }

    pub fn transaction_state(&self, xid: Xid) -> Option<TransactionState> {
        self.serializable
            .get(&xid)
            .map(SerializableTransaction::state)
            .or_else(|| self.read_only.get(&xid).map(ReadTransaction::state))
    }

    pub fn start_transaction(
        &mut self,
        time: LogicTime,
        xid: Xid,
        isolation: IsolationLevel,
    ) -> Result<(), HorizonError> {
        self.advance(time)?;
        if self.serializable.contains_key(&xid) || self.read_only.contains_key(&xid) {
            return Err(HorizonError::InvalidTransactionState(xid));
        }

        match isolation {
            IsolationLevel::Serializable => {
                let mut txn = SerializableTransaction::start(xid, time);
                for (oxid, other) in self.serializable.iter_mut() {
                    other.concurrent.insert(xid);
                    txn.concurrent.insert(*oxid);
                    if other.state() == TransactionState::Prepared {
                        txn.possible_conflict.insert(*oxid, other.conflict_set());
                    }
                }
                self.serializable.insert(xid, txn);
            }
            IsolationLevel::NonSerializableRead => {
                self.read_only.insert(xid, ReadTransaction::start(xid, time));
            }
        }

        self.limit_len();
        self.limit_age();
        Ok(())
    }

    pub fn include(
        &mut self,
        time: LogicTime,
        xid: Xid,
        effect: Effect,
    ) -> Result<(), HorizonError> {
        self.advance(time)?;
        if let Some(txn) = self.serializable.get_mut(&xid) {
            if txn.state() != TransactionState::Active {
                return Err(HorizonError::InvalidTransactionState(xid));
            }
            txn.include(effect);
            Ok(())
        } else if let Some(txn) = self.read_only.get_mut(&xid) {
            if txn.state() != TransactionState::Active {
                return Err(HorizonError::InvalidTransactionState(xid));
            }
            txn.include(&effect);
            Ok(())
        } else {
            Err(HorizonError::NoTransaction(xid))
        }
    }

    /// Apply the commit-time effects and run conflict detection. On success
    /// the transaction transitions to prepared and every still-active
    /// concurrent transaction learns about its frozen effect set. On any
    /// failure the transaction is removed before the error is returned, so
    /// an error implies the horizon no longer holds it.
    pub fn commit_transaction(
        &mut self,
        time: LogicTime,
        xid: Xid,
        effects: Vec<Effect>,
    ) -> Result<PreparedCommit, HorizonError> {
        self.advance(time)?;

        if self.serializable.contains_key(&xid) {
            {
                let txn = self.serializable.get_mut(&xid).expect("present");
                if txn.state() != TransactionState::Active {
                    return Err(HorizonError::InvalidTransactionState(xid));
                }
                for effect in effects {
                    txn.include(effect);
                }
            }

            let txn = self.serializable.get(&xid).expect("present");
            if let Some(conflict) = txn.conflict() {
                self.remove_serializable(xid, Removal::Rollback);
                return Err(HorizonError::Conflict {
                    xid: conflict.xid,
                    rejected_claims: conflict.rejected_claims,
                });
            }

            let txn = self.serializable.get_mut(&xid).expect("present");
            let prepared = txn.prepare();
            let conflict_set = txn.conflict_set();
            let neighbors: Vec<Xid> = txn.concurrent.iter().copied().collect();
            for oxid in neighbors {
                if let Some(other) = self.serializable.get_mut(&oxid) {
                    if other.state() == TransactionState::Active {
                        other.possible_conflict.insert(xid, conflict_set.clone());
                    }
                }
            }
            Ok(prepared)
        } else if self.read_only.contains_key(&xid) {
            let txn = self.read_only.get_mut(&xid).expect("present");
            if txn.state() != TransactionState::Active {
                return Err(HorizonError::InvalidTransactionState(xid));
            }
            for effect in &effects {
                txn.include(effect);
            }
            if txn.is_readonly() {
                Ok(txn.prepare())
            } else {
                if let Some(mut txn) = self.read_only.shift_remove(&xid) {
                    txn.rollback();
                }
                Err(HorizonError::NonSerializableWriteTransaction(xid))
            }
        } else {
            Err(HorizonError::NoTransaction(xid))
        }
    }

    /// Finish a prepared commit and drop the transaction from the horizon.
    /// Only the output stage calls this, after the batch holding the
    /// prepared commit became durable.
    pub fn complete_commit(&mut self, time: LogicTime, xid: Xid) -> Result<Commit, HorizonError> {
        self.advance(time)?;
        if let Some(txn) = self.serializable.get_mut(&xid) {
            if txn.state() != TransactionState::Prepared {
                return Err(HorizonError::InvalidTransactionState(xid));
            }
            let commit = txn.commit();
            self.remove_serializable(xid, Removal::Complete);
            Ok(commit)
        } else if let Some(txn) = self.read_only.get_mut(&xid) {
            if txn.state() != TransactionState::Prepared {
                return Err(HorizonError::InvalidTransactionState(xid));
            }
            let commit = txn.commit();
            self.read_only.shift_remove(&xid);
            Ok(commit)
        } else {
            Err(HorizonError::NoTransaction(xid))
        }
    }

    /// Roll back an active transaction. A prepared commit cannot be rolled
    /// back by callers once it has entered the buffer; only limit eviction
    /// may take it down.
    pub fn rollback_transaction(&mut self, time: LogicTime, xid: Xid) -> Result<(), HorizonError> {
        self.advance(time)?;
        if let Some(txn) = self.serializable.get(&xid) {
            if txn.state() != TransactionState::Active {
                return Err(HorizonError::InvalidTransactionState(xid));
            }
            self.remove_serializable(xid, Removal::Rollback);
            Ok(())
        } else if let Some(txn) = self.read_only.get(&xid) {
            if txn.state() != TransactionState::Active {
                return Err(HorizonError::InvalidTransactionState(xid));
            }
            if let Some(mut txn) = self.read_only.shift_remove(&xid) {
                txn.rollback();
            }
            Ok(())
        } else {
            Err(HorizonError::NoTransaction(xid))
        }
    }

    /// Advance the horizon's time without applying an operator, reclaiming
    /// anything the age bound no longer admits.
    pub fn move_to_future(&mut self, time: LogicTime) -> Result<(), HorizonError> {
        self.advance(time)?;
        self.limit_age();
        Ok(())
    }

    fn advance(&mut self, time: LogicTime) -> Result<(), HorizonError> {
        if let Some(current) = self.time {
            if time <= current {
                return Err(HorizonError::NotMonotonicTime {
                    current,
                    proposed: time,
                });
            }
        }
        self.time = Some(time);
        Ok(())
    }

    fn oldest(&self) -> Option<(Xid, LogicTime)> {
        let serializable = self
            .serializable
            .first()
            .map(|(xid, txn)| (*xid, txn.start_time()));
        let read_only = self
            .read_only
            .first()
            .map(|(xid, txn)| (*xid, txn.start_time()));
        match (serializable, read_only) {
            (Some(s), Some(r)) => Some(if r.1 < s.1 { r } else { s }),
            (s, None) => s,
            (None, r) => r,
        }
    }

    fn limit_len(&mut self) {
        while self.len() > self.max_len {
            let Some((xid, _)) = self.oldest() else {
                return;
            };
            warn!(%xid, max_len = self.max_len, "Evicting oldest transaction; horizon over size limit");
            self.evict(xid);
        }
    }

    fn limit_age(&mut self) {
        let Some(now) = self.time else {
            return;
        };
        while let Some((xid, start)) = self.oldest() {
            if now - start <= self.max_age {
                break;
            }
            warn!(%xid, age = now - start, max_age = self.max_age, "Evicting transaction over age limit");
            self.evict(xid);
        }
    }

    fn evict(&mut self, xid: Xid) {
        if self.serializable.contains_key(&xid) {
            self.remove_serializable(xid, Removal::Rollback);
        } else if let Some(mut txn) = self.read_only.shift_remove(&xid) {
            txn.rollback();
        }
    }

    /// Drop a serializable transaction from the arena and sever its
    /// neighborhood links. Rollback also withdraws its deposited conflict
    /// sets; completion leaves them with the neighbors.
    fn remove_serializable(&mut self, xid: Xid, removal: Removal) {
        let Some(mut txn) = self.serializable.shift_remove(&xid) else {
            return;
        };
        if removal == Removal::Rollback {
            txn.rollback();
        }
        for oxid in txn.concurrent.iter() {
            if let Some(other) = self.serializable.get_mut(oxid) {
                other.concurrent.shift_remove(&xid);
                if removal == Removal::Rollback {
                    other.possible_conflict.shift_remove(&xid);
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn serializable_transaction(&self, xid: Xid) -> Option<&SerializableTransaction> {
        self.serializable.get(&xid)
    }
}
