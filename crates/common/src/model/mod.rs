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

//! The relational data model: logical time, relations with versioned schemas,
//! scalar domains, and tuples. These are pure values; everything stateful
//! lives in the db crate.

mod relation;
mod time;
mod tuple;

pub use relation::{
    Domain, DomainKind, MigrationId, Relation, RelationNumber, RelationVersion, Scalar, Schema,
};
pub use time::LogicTime;
pub use tuple::{RelationVersionId, Tid, Tuple, Xid};

use thiserror::Error;

/// Failures raised by the relation catalog and by tuple validation against
/// relation schemas. These are caller contract violations; they are never
/// retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelationError {
    #[error("no relation numbered {0}")]
    NoRelation(RelationNumber),
    #[error("relation number {0} is already taken")]
    NotUniqueRelationNumber(RelationNumber),
    #[error("tuple {tid} does not match the latest schema of relation {relation}")]
    InvalidTuple { relation: RelationNumber, tid: Tid },
}
