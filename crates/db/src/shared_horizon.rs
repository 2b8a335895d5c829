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

use crate::horizon::Horizon;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Scoped exclusive access to the horizon. Every cross-stage touch of the
/// horizon goes through `acquire`; the guard is held for one horizon call
/// (or one completion loop) and never across suspension on I/O that is not
/// horizon-local.
#[derive(Clone)]
pub struct SharedHorizon {
    inner: Arc<Mutex<Horizon>>,
}

impl SharedHorizon {
    pub fn new(horizon: Horizon) -> Self {
        Self {
            inner: Arc::new(Mutex::new(horizon)),
        }
    }

    pub async fn acquire(&self) -> MutexGuard<'_, Horizon> {
        self.inner.lock().await
    }
}
