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

use chatdb_common::LogicTime;
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of logical time. Every tick is strictly greater than every time
/// previously returned by this instance; concurrent callers are serialized by
/// the underlying atomic, so ties are impossible.
///
/// This is an instance, not a process-wide singleton; it is passed explicitly
/// to the stages that stamp operators and completions.
pub struct LogicClock {
    counter: AtomicI64,
}

impl LogicClock {
    pub fn new() -> Self {
        Self {
            counter: AtomicI64::new(0),
        }
    }

    pub fn tick(&self) -> LogicTime {
        LogicTime(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Reserve `n` consecutive times in one step.
    pub fn tick_many(&self, n: usize) -> Vec<LogicTime> {
        let base = self.counter.fetch_add(n as i64, Ordering::SeqCst);
        (1..=n as i64).map(|i| LogicTime(base + i)).collect()
    }

    /// Move the clock forward so that the next tick is strictly after `time`.
    /// Replaying the log on recovery uses this to resume past every stamped
    /// operator. Never moves the clock backwards.
    pub fn advance_to(&self, time: LogicTime) {
        self.counter.fetch_max(time.0, Ordering::SeqCst);
    }
}

impl Default for LogicClock {
    fn default() -> Self {
        Self::new()
    }
}
