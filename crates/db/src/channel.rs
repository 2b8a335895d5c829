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

//! The XID-keyed rendezvous between commit submission and commit outcome.
//! Submitters subscribe before their operator enters the pipeline; the
//! stages publish once per attempt. Entries are garbage-collected at
//! publication, so a subscription made after the fact never resolves (the
//! waiter's receiver reports closure instead).

use crate::horizon::HorizonError;
use ahash::AHasher;
use chatdb_common::Xid;
use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::Mutex;
use tokio::sync::oneshot;

/// The outcome of one commit attempt: `None` for success, the horizon error
/// otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub error: Option<HorizonError>,
}

pub struct CommitChannel {
    waiters: Mutex<HashMap<Xid, Vec<oneshot::Sender<Notification>>, BuildHasherDefault<AHasher>>>,
}

impl CommitChannel {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::default()),
        }
    }

    /// Register interest in the outcome for `xid`. Every receiver registered
    /// at publication time gets the same notification.
    pub fn subscribe(&self, xid: Xid) -> oneshot::Receiver<Notification> {
        let (send, receive) = oneshot::channel();
        self.waiters
            .lock()
            .unwrap()
            .entry(xid)
            .or_default()
            .push(send);
        receive
    }

    /// Publish completion outcomes for a whole batch: successes and per-XID
    /// errors. Published entries are dropped from the table.
    pub fn publish(&self, ok_xids: &[Xid], errors: Vec<(Xid, HorizonError)>) {
        let mut waiters = self.waiters.lock().unwrap();
        for xid in ok_xids {
            notify(waiters.remove(xid), Notification { error: None });
        }
        for (xid, error) in errors {
            notify(
                waiters.remove(&xid),
                Notification { error: Some(error) },
            );
        }
    }

    /// Publish a single failed attempt, e.g. a conflict at prepare time.
    pub fn publish_error(&self, xid: Xid, error: HorizonError) {
        self.publish(&[], vec![(xid, error)]);
    }
}

impl Default for CommitChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn notify(senders: Option<Vec<oneshot::Sender<Notification>>>, notification: Notification) {
    for sender in senders.into_iter().flatten() {
        // A dropped receiver is a cancelled waiter; nothing to do.
        sender.send(notification.clone()).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn xid(n: u128) -> Xid {
        Xid(Uuid::from_u128(n))
    }

    #[tokio::test]
    async fn test_all_waiters_receive_the_same_notification() {
        let channel = CommitChannel::new();
        let first = channel.subscribe(xid(1));
        let second = channel.subscribe(xid(1));

        channel.publish(&[xid(1)], vec![]);

        assert_eq!(first.await.unwrap(), Notification { error: None });
        assert_eq!(second.await.unwrap(), Notification { error: None });
    }

    #[tokio::test]
    async fn test_errors_reach_their_xid_only() {
        let channel = CommitChannel::new();
        let ok = channel.subscribe(xid(1));
        let failed = channel.subscribe(xid(2));

        channel.publish(
            &[xid(1)],
            vec![(xid(2), HorizonError::NoTransaction(xid(2)))],
        );

        assert_eq!(ok.await.unwrap().error, None);
        assert_eq!(
            failed.await.unwrap().error,
            Some(HorizonError::NoTransaction(xid(2)))
        );
    }

    /// A cancelled waiter only severs itself; the other waiters and the
    /// publication are unaffected.
    #[tokio::test]
    async fn test_dropped_waiter_does_not_disturb_publication() {
        let channel = CommitChannel::new();
        let cancelled = channel.subscribe(xid(1));
        let kept = channel.subscribe(xid(1));
        drop(cancelled);

        channel.publish(&[xid(1)], vec![]);
        assert_eq!(kept.await.unwrap(), Notification { error: None });
    }

    #[tokio::test]
    async fn test_entries_are_collected_at_publication() {
        let channel = CommitChannel::new();
        let waiter = channel.subscribe(xid(1));
        channel.publish(&[xid(1)], vec![]);
        waiter.await.unwrap();

        // A late subscription never resolves; its sender is gone only after
        // the next publication for the same xid.
        let late = channel.subscribe(xid(1));
        channel.publish(&[xid(1)], vec![]);
        assert!(late.await.is_ok());
        assert!(channel.waiters.lock().unwrap().is_empty());
    }
}
