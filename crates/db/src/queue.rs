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

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;

/// An unbounded async queue whose `sync` waits until the consumer has taken
/// *and acknowledged* every item pushed so far. Taking an item is not enough:
/// the consumer calls `ack` once the work for the item is done, and only that
/// releases `sync`. The output stage relies on this to know a batch has been
/// applied to the heap, not merely dequeued, before it completes the batch in
/// the horizon.
pub struct SyncQueue<T> {
    state: Mutex<State<T>>,
    pushed: Notify,
    completed: Notify,
}

struct State<T> {
    items: VecDeque<T>,
    /// Items handed to the consumer and not yet acknowledged.
    outstanding: usize,
}

impl<T> SyncQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                outstanding: 0,
            }),
            pushed: Notify::new(),
            completed: Notify::new(),
        }
    }

    pub fn push(&self, item: T) {
        self.state.lock().unwrap().items.push_back(item);
        self.pushed.notify_one();
    }

    pub async fn next(&self) -> T {
        // notify_one stores a permit when nobody is waiting yet, so a push
        // racing this loop is never missed.
        loop {
            let pushed = self.pushed.notified();
            {
                let mut state = self.state.lock().unwrap();
                if let Some(item) = state.items.pop_front() {
                    state.outstanding += 1;
                    return item;
                }
            }
            pushed.await;
        }
    }

    /// Acknowledge the most recently taken item as fully handled. An item
    /// that is never acknowledged keeps every `sync` caller waiting.
    pub fn ack(&self) {
        {
            let mut state = self.state.lock().unwrap();
            debug_assert!(state.outstanding > 0, "ack without an outstanding item");
            state.outstanding = state.outstanding.saturating_sub(1);
        }
        self.completed.notify_one();
    }

    /// Wait until the queue is empty and every taken item has been
    /// acknowledged, i.e. the consumer finished handling everything pushed
    /// before this call.
    pub async fn sync(&self) {
        loop {
            let completed = self.completed.notified();
            {
                let state = self.state.lock().unwrap();
                if state.items.is_empty() && state.outstanding == 0 {
                    return;
                }
            }
            completed.await;
        }
    }
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
