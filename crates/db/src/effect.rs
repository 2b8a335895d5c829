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

//! The per-tuple effect algebra. A transaction's buffered work is a map from
//! TID to a single folded effect; folding two effects on the same TID always
//! yields the one effect that is equivalent to applying both in order.

use chatdb_common::{Relation, RelationError, RelationVersionId, Scalar, Tid, Tuple};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An application-level mutex token. Two transactions holding an equal claim
/// conflict at prepare time regardless of tuple overlap. Claims never
/// produce tuple changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Claim {
    pub id: Uuid,
    pub object: String,
}

/// What a transaction did to one tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TupleEffect {
    /// Read-only observation. Identity for the fold; dropped from prepared
    /// commits.
    Viewed(Tid),
    New(Tuple),
    Mutated(Tuple),
    Deleted(Tid),
}

impl TupleEffect {
    pub fn tid(&self) -> Tid {
        match self {
            TupleEffect::Viewed(tid) | TupleEffect::Deleted(tid) => *tid,
            TupleEffect::New(tuple) | TupleEffect::Mutated(tuple) => tuple.tid(),
        }
    }

    pub fn is_viewed(&self) -> bool {
        matches!(self, TupleEffect::Viewed(_))
    }

    /// Combine this effect with a `later` effect on the same TID.
    #[must_use]
    pub fn fold(self, later: TupleEffect) -> TupleEffect {
        use TupleEffect::*;
        match (self, later) {
            (Viewed(_), later) => later,
            (prior, Viewed(_)) => prior,

            (New(_), New(t2)) => New(t2),
            (New(_), Mutated(t2)) => New(t2),
            (New(_), Deleted(tid)) => Deleted(tid),

            (Mutated(_), New(t2)) => Mutated(t2),
            (Mutated(_), Mutated(t2)) => Mutated(t2),
            (Mutated(_), Deleted(tid)) => Deleted(tid),

            (Deleted(_), New(t2)) => Mutated(t2),
            (prior @ Deleted(_), Mutated(_)) => prior,
            (prior @ Deleted(_), Deleted(_)) => prior,
        }
    }
}

/// Reduce a sequence of effects on one TID to the single equivalent effect.
pub fn fold(effects: &[TupleEffect]) -> Option<TupleEffect> {
    let mut iter = effects.iter().cloned();
    let first = iter.next()?;
    Some(iter.fold(first, TupleEffect::fold))
}

/// One conflictable element of a transaction's effect set: either a tuple
/// effect or a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Tuple(TupleEffect),
    Claim(Claim),
}

fn latest_version_tuple(
    tid: Tid,
    scalars: Vec<Scalar>,
    relation: &Relation,
) -> Result<Tuple, RelationError> {
    let version = relation.last_version();
    let tuple = Tuple::new(
        tid,
        RelationVersionId {
            relation: relation.number(),
            version: version.number(),
        },
        scalars,
    );
    if !tuple.matches(version.schema()) {
        return Err(RelationError::InvalidTuple {
            relation: relation.number(),
            tid,
        });
    }
    Ok(tuple)
}

/// Build a creation effect, validating the scalars against the relation's
/// latest-version schema.
pub fn new_tuple(
    tid: Tid,
    scalars: Vec<Scalar>,
    relation: &Relation,
) -> Result<TupleEffect, RelationError> {
    Ok(TupleEffect::New(latest_version_tuple(tid, scalars, relation)?))
}

/// Build an in-place update effect, validating the scalars against the
/// relation's latest-version schema.
pub fn mutated_tuple(
    tid: Tid,
    scalars: Vec<Scalar>,
    relation: &Relation,
) -> Result<TupleEffect, RelationError> {
    Ok(TupleEffect::Mutated(latest_version_tuple(
        tid, scalars, relation,
    )?))
}

pub fn deleted_tuple(tid: Tid) -> TupleEffect {
    TupleEffect::Deleted(tid)
}

/// Build a read observation of a stored tuple, rejecting tuples that no
/// longer match the relation's latest schema.
pub fn viewed_tuple(tuple: &Tuple, relation: &Relation) -> Result<TupleEffect, RelationError> {
    if !tuple.matches(relation.last_version().schema()) {
        return Err(RelationError::InvalidTuple {
            relation: relation.number(),
            tid: tuple.tid(),
        });
    }
    Ok(TupleEffect::Viewed(tuple.tid()))
}
