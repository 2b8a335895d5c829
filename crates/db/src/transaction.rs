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

//! Per-transaction state. Two isolation variants: the serializable variant
//! carries the folded effect space, the claim set, and the neighborhood links
//! used for first-committer-wins conflict detection; the non-serializable
//! read variant carries a single read-only bit and no cross-transaction
//! links.
//!
//! Links are XID sets resolved through the horizon's arena, never owned
//! references. When a neighbor prepares, it deposits a frozen copy of its
//! claim and TID sets here; that copy is what `conflict` intersects against,
//! and it outlives the neighbor's completion so that a committed transaction
//! still defeats overlapping concurrent ones.

use crate::effect::{Claim, Effect, TupleEffect};
use ahash::AHasher;
use chatdb_common::{LogicTime, Tid, Xid};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::hash::BuildHasherDefault;

type Hasher = BuildHasherDefault<AHasher>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    Serializable,
    NonSerializableRead,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    RolledBack,
    Prepared,
    Committed,
}

/// A commit that has passed conflict detection but has not yet been
/// completed. Its effect set carries no `Viewed` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedCommit {
    pub xid: Xid,
    pub effect: Vec<TupleEffect>,
}

/// Emitted by completion; same shape as the prepared commit that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub xid: Xid,
    pub effect: Vec<TupleEffect>,
}

/// The outcome of a failed conflict check: which transaction lost, and the
/// claim overlap that contributed to the loss (empty when the overlap was on
/// tuples alone).
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictError {
    pub xid: Xid,
    pub rejected_claims: Vec<Claim>,
}

/// A prepared neighbor's claim and TID sets, frozen at its prepare.
#[derive(Debug, Clone)]
pub(crate) struct ConflictSet {
    pub(crate) claims: IndexSet<Claim, Hasher>,
    pub(crate) tids: IndexSet<Tid, Hasher>,
}

pub(crate) struct SerializableTransaction {
    xid: Xid,
    start_time: LogicTime,
    state: TransactionState,
    /// TID to folded effect.
    space: IndexMap<Tid, TupleEffect, Hasher>,
    claims: IndexSet<Claim, Hasher>,
    /// Serializable transactions alive at our start, plus those that started
    /// while we were alive. Symmetric while both sides live.
    pub(crate) concurrent: IndexSet<Xid, Hasher>,
    /// Neighbors that reached prepared while we were active, with their
    /// frozen conflict sets.
    pub(crate) possible_conflict: IndexMap<Xid, ConflictSet, Hasher>,
}

impl SerializableTransaction {
    pub(crate) fn start(xid: Xid, start_time: LogicTime) -> Self {
        Self {
            xid,
            start_time,
            state: TransactionState::Active,
            space: IndexMap::default(),
            claims: IndexSet::default(),
            concurrent: IndexSet::default(),
            possible_conflict: IndexMap::default(),
        }
    }

    pub(crate) fn start_time(&self) -> LogicTime {
        self.start_time
    }

    pub(crate) fn state(&self) -> TransactionState {
        self.state
    }

    /// Fold an effect into the accumulator. Claims go to the claim set;
    /// tuple effects fold into the space by TID.
    pub(crate) fn include(&mut self, effect: Effect) {
        match effect {
            Effect::Claim(claim) => {
                self.claims.insert(claim);
            }
            Effect::Tuple(tuple_effect) => {
                let tid = tuple_effect.tid();
                let folded = match self.space.shift_remove(&tid) {
                    Some(prior) => prior.fold(tuple_effect),
                    None => tuple_effect,
                };
                self.space.insert(tid, folded);
            }
        }
    }

    /// First-committer-wins check against every neighbor that prepared while
    /// we were active. Any claim or TID overlap loses.
    pub(crate) fn conflict(&self) -> Option<ConflictError> {
        for conflict_set in self.possible_conflict.values() {
            let rejected_claims: Vec<_> = self
                .claims
                .iter()
                .filter(|claim| conflict_set.claims.contains(*claim))
                .cloned()
                .collect();
            let space_overlap = self
                .space
                .keys()
                .any(|tid| conflict_set.tids.contains(tid));
            if !rejected_claims.is_empty() || space_overlap {
                return Some(ConflictError {
                    xid: self.xid,
                    rejected_claims,
                });
            }
        }
        None
    }

    /// The frozen copy deposited into neighbors when we prepare.
    pub(crate) fn conflict_set(&self) -> ConflictSet {
        ConflictSet {
            claims: self.claims.clone(),
            tids: self.space.keys().copied().collect(),
        }
    }

    /// Transition to prepared and emit the commit-to-be. Assumes the
    /// conflict check already passed.
    pub(crate) fn prepare(&mut self) -> PreparedCommit {
        self.state = TransactionState::Prepared;
        PreparedCommit {
            xid: self.xid,
            effect: self.effect(),
        }
    }

    pub(crate) fn commit(&mut self) -> Commit {
        self.state = TransactionState::Committed;
        Commit {
            xid: self.xid,
            effect: self.effect(),
        }
    }

    pub(crate) fn rollback(&mut self) {
        self.state = TransactionState::RolledBack;
    }

    /// The materialized effect set: everything in the space except bare
    /// views.
    fn effect(&self) -> Vec<TupleEffect> {
        self.space
            .values()
            .filter(|effect| !effect.is_viewed())
            .cloned()
            .collect()
    }
}

/// The non-serializable read variant: no links, no space, just the
/// observation of whether anything other than a view was ever included.
pub(crate) struct ReadTransaction {
    xid: Xid,
    start_time: LogicTime,
    state: TransactionState,
    is_readonly: bool,
}

impl ReadTransaction {
    pub(crate) fn start(xid: Xid, start_time: LogicTime) -> Self {
        Self {
            xid,
            start_time,
            state: TransactionState::Active,
            is_readonly: true,
        }
    }

    pub(crate) fn start_time(&self) -> LogicTime {
        self.start_time
    }

    pub(crate) fn state(&self) -> TransactionState {
        self.state
    }

    pub(crate) fn is_readonly(&self) -> bool {
        self.is_readonly
    }

    pub(crate) fn include(&mut self, effect: &Effect) {
        match effect {
            Effect::Tuple(TupleEffect::Viewed(_)) => {}
            _ => self.is_readonly = false,
        }
    }

    /// An empty prepared commit; the caller must have verified the
    /// transaction is still read-only.
    pub(crate) fn prepare(&mut self) -> PreparedCommit {
        self.state = TransactionState::Prepared;
        PreparedCommit {
            xid: self.xid,
            effect: vec![],
        }
    }

    pub(crate) fn commit(&mut self) -> Commit {
        self.state = TransactionState::Committed;
        Commit {
            xid: self.xid,
            effect: vec![],
        }
    }

    pub(crate) fn rollback(&mut self) {
        self.state = TransactionState::RolledBack;
    }
}
