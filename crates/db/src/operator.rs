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

use crate::effect::Effect;
use crate::transaction::IsolationLevel;
use chatdb_common::{LogicTime, Xid};
use serde::{Deserialize, Serialize};

/// One relational operator as recorded in the log. The log's append order is
/// the linearization order of the whole engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    Start {
        xid: Xid,
        isolation: IsolationLevel,
    },
    /// A single conflictable effect, so that every effect gets its own
    /// stamped time.
    Intermediate {
        xid: Xid,
        effect: Effect,
    },
    Commit {
        xid: Xid,
        effects: Vec<Effect>,
    },
    Rollback {
        xid: Xid,
    },
}

impl Operator {
    pub fn xid(&self) -> Xid {
        match self {
            Operator::Start { xid, .. }
            | Operator::Intermediate { xid, .. }
            | Operator::Commit { xid, .. }
            | Operator::Rollback { xid } => *xid,
        }
    }
}

/// An operator stamped with the strictly-increasing logical time under which
/// it was appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedOperator {
    pub time: LogicTime,
    pub operator: Operator,
}
