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

use crate::model::{RelationNumber, Scalar, Schema};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Transaction identifier. Globally unique per attempt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Xid(pub Uuid);

impl Display for Xid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "xid:{}", self.0)
    }
}

/// Tuple identifier, assigned at tuple creation and stable across mutations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tid(pub Uuid);

impl Display for Tid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "tid:{}", self.0)
    }
}

/// Names the relation version a tuple was written against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationVersionId {
    pub relation: RelationNumber,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    tid: Tid,
    relation_version: RelationVersionId,
    scalars: Vec<Scalar>,
}

impl Tuple {
    pub fn new(tid: Tid, relation_version: RelationVersionId, scalars: Vec<Scalar>) -> Self {
        Self {
            tid,
            relation_version,
            scalars,
        }
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn relation_version(&self) -> RelationVersionId {
        self.relation_version
    }

    pub fn scalars(&self) -> &[Scalar] {
        &self.scalars
    }

    pub fn matches(&self, schema: &Schema) -> bool {
        schema.admits(&self.scalars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Domain, DomainKind};

    #[test]
    fn test_tuple_matches_schema() {
        let schema = Schema::new(vec![
            Domain::new(DomainKind::Int, false),
            Domain::new(DomainKind::String { max_len: 4 }, true),
        ]);
        let rv = RelationVersionId {
            relation: RelationNumber(1),
            version: 0,
        };
        let t = Tuple::new(
            Tid(Uuid::from_u128(1)),
            rv,
            vec![Scalar::Int(3), Scalar::Null],
        );
        assert!(t.matches(&schema));

        let t = Tuple::new(Tid(Uuid::from_u128(2)), rv, vec![Scalar::Int(3)]);
        assert!(!t.matches(&schema));
    }
}
