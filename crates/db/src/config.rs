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

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Most transactions the horizon holds before the oldest is evicted.
    pub horizon_max_len: usize,
    /// Oldest age, in logical ticks, a resident transaction may reach.
    pub horizon_max_age: i64,
    /// Prepared commits per released batch.
    pub buffer_overflow_len: usize,
    /// How long a non-empty buffer may sit since the last release before it
    /// is flushed regardless of size.
    pub buffer_overflow_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            horizon_max_len: 1024,
            horizon_max_age: 1_000_000,
            buffer_overflow_len: 32,
            buffer_overflow_timeout: Duration::from_millis(100),
        }
    }
}
