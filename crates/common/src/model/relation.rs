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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Identifies a relation in the catalog.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct RelationNumber(pub u64);

impl Display for RelationNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identifies the migration that produced a derivative relation version.
/// Carried as metadata only; the engine never executes migrations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MigrationId(pub Uuid);

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    String(String),
    Datetime(DateTime<Utc>),
    Uuid(Uuid),
    /// The absent value; admitted only by nullable domains.
    Null,
}

/// The shape of values an attribute admits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainKind {
    Bool,
    Int,
    String { max_len: usize },
    Datetime,
    Uuid,
    /// A finite set of admissible values, all of one underlying kind.
    OneOf(Vec<Scalar>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Domain {
    kind: DomainKind,
    nullable: bool,
}

impl Domain {
    pub fn new(kind: DomainKind, nullable: bool) -> Self {
        Self { kind, nullable }
    }

    pub fn kind(&self) -> &DomainKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn contains(&self, scalar: &Scalar) -> bool {
        if matches!(scalar, Scalar::Null) {
            return self.nullable;
        }
        match &self.kind {
            DomainKind::Bool => matches!(scalar, Scalar::Bool(_)),
            DomainKind::Int => matches!(scalar, Scalar::Int(_)),
            DomainKind::String { max_len } => match scalar {
                Scalar::String(s) => s.chars().count() <= *max_len,
                _ => false,
            },
            DomainKind::Datetime => matches!(scalar, Scalar::Datetime(_)),
            DomainKind::Uuid => matches!(scalar, Scalar::Uuid(_)),
            DomainKind::OneOf(values) => values.contains(scalar),
        }
    }
}

/// An ordered sequence of domains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema(Vec<Domain>);

impl Schema {
    pub fn new(domains: Vec<Domain>) -> Self {
        Self(domains)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn domains(&self) -> &[Domain] {
        &self.0
    }

    /// True iff the scalar count equals the schema length and each scalar
    /// lies in the corresponding domain.
    pub fn admits(&self, scalars: &[Scalar]) -> bool {
        scalars.len() == self.0.len()
            && self
                .0
                .iter()
                .zip(scalars)
                .all(|(domain, scalar)| domain.contains(scalar))
    }
}

/// One version of a relation's shape. The initial version carries only a
/// schema; every derivative version also names the migration that produced
/// it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationVersion {
    number: u64,
    schema: Schema,
    migration: Option<MigrationId>,
}

impl RelationVersion {
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn migration(&self) -> Option<MigrationId> {
        self.migration
    }
}

/// A numbered relation carrying its ordered version history. Version numbers
/// strictly increment from 0, which construction enforces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    number: RelationNumber,
    versions: Vec<RelationVersion>,
}

impl Relation {
    pub fn new(number: RelationNumber, initial_schema: Schema) -> Self {
        Self {
            number,
            versions: vec![RelationVersion {
                number: 0,
                schema: initial_schema,
                migration: None,
            }],
        }
    }

    /// Append a derivative version produced by the given migration.
    pub fn push_version(&mut self, schema: Schema, migration: MigrationId) {
        self.versions.push(RelationVersion {
            number: self.versions.len() as u64,
            schema,
            migration: Some(migration),
        });
    }

    pub fn number(&self) -> RelationNumber {
        self.number
    }

    pub fn versions(&self) -> &[RelationVersion] {
        &self.versions
    }

    pub fn last_version(&self) -> &RelationVersion {
        self.versions
            .last()
            .expect("relations are constructed with an initial version")
    }
}
