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

#[cfg(test)]
mod tests {
    use crate::effect::{Claim, Effect, TupleEffect};
    use crate::horizon::{Horizon, HorizonError};
    use crate::transaction::{IsolationLevel, TransactionState};
    use chatdb_common::{LogicTime, RelationNumber, RelationVersionId, Scalar, Tid, Tuple, Xid};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn xid(n: u128) -> Xid {
        Xid(Uuid::from_u128(n))
    }

    fn tid(n: u128) -> Tid {
        Tid(Uuid::from_u128(n))
    }

    fn t(n: i64) -> LogicTime {
        LogicTime(n)
    }

    fn mutated(tid_n: u128, scalar: &str) -> Effect {
        Effect::Tuple(TupleEffect::Mutated(Tuple::new(
            tid(tid_n),
            RelationVersionId {
                relation: RelationNumber(1),
                version: 0,
            },
            vec![Scalar::String(scalar.into())],
        )))
    }

    fn claim(n: u128) -> Effect {
        Effect::Claim(Claim {
            id: Uuid::from_u128(n),
            object: format!("object-{n}"),
        })
    }

    fn horizon() -> Horizon {
        Horizon::new(100, 1_000)
    }

    fn start(horizon: &mut Horizon, time: i64, xid_n: u128) {
        horizon
            .start_transaction(t(time), xid(xid_n), IsolationLevel::Serializable)
            .unwrap();
    }

    #[test]
    fn test_sequential_commits_do_not_conflict() {
        let mut h = horizon();

        start(&mut h, 1, 1);
        let prepared = h
            .commit_transaction(t(2), xid(1), vec![mutated(1, "a")])
            .unwrap();
        assert_eq!(prepared.xid, xid(1));
        h.complete_commit(t(3), xid(1)).unwrap();

        start(&mut h, 4, 2);
        let prepared = h
            .commit_transaction(t(5), xid(2), vec![mutated(1, "b")])
            .unwrap();
        assert_eq!(prepared.effect.len(), 1);
        let commit = h.complete_commit(t(6), xid(2)).unwrap();
        assert_eq!(commit.xid, xid(2));

        assert!(h.is_empty());
    }

    #[test]
    fn test_first_committer_wins() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);

        h.commit_transaction(t(3), xid(1), vec![mutated(1, "a")])
            .unwrap();
        h.complete_commit(t(4), xid(1)).unwrap();

        let error = h
            .commit_transaction(t(5), xid(2), vec![mutated(1, "b")])
            .unwrap_err();
        assert_eq!(
            error,
            HorizonError::Conflict {
                xid: xid(2),
                rejected_claims: vec![],
            }
        );
        assert!(h.is_empty());
    }

    /// The transaction that started first still loses if it prepares second.
    #[test]
    fn test_subset_transaction_loses() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);

        h.commit_transaction(t(3), xid(2), vec![mutated(1, "b")])
            .unwrap();
        h.complete_commit(t(4), xid(2)).unwrap();

        let error = h
            .commit_transaction(t(5), xid(1), vec![mutated(1, "a")])
            .unwrap_err();
        assert!(matches!(error, HorizonError::Conflict { xid: x, .. } if x == xid(1)));
        assert!(h.is_empty());
    }

    #[test]
    fn test_conflict_while_first_is_still_prepared() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);

        h.commit_transaction(t(3), xid(1), vec![mutated(1, "a")])
            .unwrap();

        // Not yet completed; the deposited conflict set alone must reject.
        let error = h
            .commit_transaction(t(4), xid(2), vec![mutated(1, "b")])
            .unwrap_err();
        assert!(matches!(error, HorizonError::Conflict { .. }));
    }

    #[test]
    fn test_claims_conflict_independent_of_tuples() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);

        h.commit_transaction(t(3), xid(1), vec![claim(9), mutated(1, "a")])
            .unwrap();
        h.complete_commit(t(4), xid(1)).unwrap();

        let error = h
            .commit_transaction(t(5), xid(2), vec![claim(9), mutated(2, "b")])
            .unwrap_err();
        let HorizonError::Conflict {
            rejected_claims, ..
        } = error
        else {
            panic!("expected a conflict");
        };
        assert_eq!(rejected_claims.len(), 1);
        assert_eq!(rejected_claims[0].id, Uuid::from_u128(9));
    }

    #[test]
    fn test_disjoint_concurrent_commits_both_succeed() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);

        h.commit_transaction(t(3), xid(1), vec![mutated(1, "a")])
            .unwrap();
        h.complete_commit(t(4), xid(1)).unwrap();
        h.commit_transaction(t(5), xid(2), vec![mutated(2, "b")])
            .unwrap();
        h.complete_commit(t(6), xid(2)).unwrap();

        assert!(h.is_empty());
    }

    #[test]
    fn test_size_limit_evicts_oldest() {
        let mut h = Horizon::new(2, 1_000);
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);
        start(&mut h, 3, 3);

        assert_eq!(h.len(), 2);
        assert_eq!(h.transaction_state(xid(1)), None);
        assert_eq!(h.transaction_state(xid(2)), Some(TransactionState::Active));
        assert_eq!(h.transaction_state(xid(3)), Some(TransactionState::Active));
    }

    #[test]
    fn test_age_limit_evicts_on_move_to_future() {
        let mut h = Horizon::new(100, 2);
        start(&mut h, 1, 1);
        h.move_to_future(t(4)).unwrap();

        assert!(h.is_empty());
    }

    #[test]
    fn test_age_limit_keeps_the_newcomer() {
        let mut h = Horizon::new(100, 2);
        start(&mut h, 1, 1);
        start(&mut h, 4, 2);

        assert_eq!(h.transaction_state(xid(1)), None);
        assert_eq!(h.transaction_state(xid(2)), Some(TransactionState::Active));
        assert_eq!(h.len(), 1);
    }

    /// Size and age hold as invariants after any time advance.
    #[test]
    fn test_limits_hold_after_every_advance() {
        let mut h = Horizon::new(3, 5);
        for n in 1..=20 {
            start(&mut h, n, n as u128);
            assert!(h.len() <= 3);
            if let Some(oldest) = h.oldest_start() {
                assert!(h.time().unwrap() - oldest <= 5);
            }
        }
    }

    /// Eviction picks the globally oldest across both isolation variants.
    #[test]
    fn test_eviction_tie_break_across_variants() {
        let mut h = Horizon::new(2, 1_000);
        h.start_transaction(t(1), xid(1), IsolationLevel::NonSerializableRead)
            .unwrap();
        start(&mut h, 2, 2);
        start(&mut h, 3, 3);

        assert_eq!(h.transaction_state(xid(1)), None);
        assert_eq!(h.transaction_state(xid(2)), Some(TransactionState::Active));
    }

    #[test]
    fn test_concurrent_links_are_symmetric() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);
        start(&mut h, 3, 3);

        for (a, b) in [(1u128, 2u128), (1, 3), (2, 3)] {
            let ta = h.serializable_transaction(xid(a)).unwrap();
            let tb = h.serializable_transaction(xid(b)).unwrap();
            assert!(ta.concurrent.contains(&xid(b)));
            assert!(tb.concurrent.contains(&xid(a)));
        }
    }

    /// No dangling references survive a rollback, from any state.
    #[test]
    fn test_rollback_unlinks_everywhere() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);
        h.rollback_transaction(t(3), xid(1)).unwrap();

        let t2 = h.serializable_transaction(xid(2)).unwrap();
        assert!(t2.concurrent.is_empty());
        assert!(t2.possible_conflict.is_empty());
    }

    #[test]
    fn test_prepared_eviction_withdraws_conflict_sets() {
        let mut h = Horizon::new(2, 1_000);
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);
        h.commit_transaction(t(3), xid(1), vec![mutated(1, "a")])
            .unwrap();
        assert!(
            !h.serializable_transaction(xid(2))
                .unwrap()
                .possible_conflict
                .is_empty()
        );

        // A third start pushes the prepared transaction out.
        start(&mut h, 4, 3);
        assert_eq!(h.transaction_state(xid(1)), None);
        let t2 = h.serializable_transaction(xid(2)).unwrap();
        assert!(!t2.concurrent.contains(&xid(1)));
        assert!(t2.possible_conflict.is_empty());

        // With the threat withdrawn, the overlapping commit goes through.
        h.commit_transaction(t(5), xid(2), vec![mutated(1, "b")])
            .unwrap();
    }

    #[test]
    fn test_transaction_started_after_prepare_sees_the_threat() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        h.commit_transaction(t(2), xid(1), vec![mutated(1, "a")])
            .unwrap();

        // Starts between prepare and completion.
        start(&mut h, 3, 2);
        h.complete_commit(t(4), xid(1)).unwrap();

        let error = h
            .commit_transaction(t(5), xid(2), vec![mutated(1, "b")])
            .unwrap_err();
        assert!(matches!(error, HorizonError::Conflict { .. }));
    }

    #[test]
    fn test_non_monotonic_time_is_rejected() {
        let mut h = horizon();
        start(&mut h, 5, 1);
        assert_eq!(
            h.move_to_future(t(5)),
            Err(HorizonError::NotMonotonicTime {
                current: t(5),
                proposed: t(5),
            })
        );
        assert!(matches!(
            h.start_transaction(t(3), xid(2), IsolationLevel::Serializable),
            Err(HorizonError::NotMonotonicTime { .. })
        ));
    }

    #[test]
    fn test_duplicate_start_is_rejected() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        assert_eq!(
            h.start_transaction(t(2), xid(1), IsolationLevel::Serializable),
            Err(HorizonError::InvalidTransactionState(xid(1)))
        );
    }

    #[test]
    fn test_operations_on_missing_transactions() {
        let mut h = horizon();
        assert_eq!(
            h.commit_transaction(t(1), xid(1), vec![]),
            Err(HorizonError::NoTransaction(xid(1)))
        );
        assert_eq!(
            h.rollback_transaction(t(2), xid(1)),
            Err(HorizonError::NoTransaction(xid(1)))
        );
        assert!(matches!(
            h.complete_commit(t(3), xid(1)),
            Err(HorizonError::NoTransaction(_))
        ));
        assert!(matches!(
            h.include(t(4), xid(1), mutated(1, "a")),
            Err(HorizonError::NoTransaction(_))
        ));
        assert!(h.is_empty());
    }

    /// Callers cannot roll back a prepared commit; only eviction may.
    #[test]
    fn test_prepared_commit_cannot_be_rolled_back() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        h.commit_transaction(t(2), xid(1), vec![mutated(1, "a")])
            .unwrap();

        assert_eq!(
            h.rollback_transaction(t(3), xid(1)),
            Err(HorizonError::InvalidTransactionState(xid(1)))
        );
        assert_eq!(
            h.transaction_state(xid(1)),
            Some(TransactionState::Prepared)
        );
    }

    #[test]
    fn test_include_requires_active_state() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        h.commit_transaction(t(2), xid(1), vec![mutated(1, "a")])
            .unwrap();

        assert_eq!(
            h.include(t(3), xid(1), mutated(2, "b")),
            Err(HorizonError::InvalidTransactionState(xid(1)))
        );
        // The precondition failure does not take the transaction down.
        assert_eq!(
            h.transaction_state(xid(1)),
            Some(TransactionState::Prepared)
        );
    }

    #[test]
    fn test_move_to_future_with_empty_horizon() {
        let mut h = Horizon::new(100, 2);
        assert_eq!(h.move_to_future(t(10)), Ok(()));
        assert_eq!(h.time(), Some(t(10)));
        assert!(h.is_empty());
    }

    #[test]
    fn test_complete_requires_prepared_state() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        assert_eq!(
            h.complete_commit(t(2), xid(1)),
            Err(HorizonError::InvalidTransactionState(xid(1)))
        );
    }

    #[test]
    fn test_commit_with_empty_effects_stays_for_completion() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        let prepared = h.commit_transaction(t(2), xid(1), vec![]).unwrap();
        assert_eq!(prepared.effect, vec![]);
        assert_eq!(h.len(), 1);

        h.complete_commit(t(3), xid(1)).unwrap();
        assert!(h.is_empty());
    }

    #[test]
    fn test_viewed_effects_participate_in_conflicts_but_not_commits() {
        let mut h = horizon();
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);

        h.include(t(3), xid(1), Effect::Tuple(TupleEffect::Viewed(tid(1))))
            .unwrap();
        h.commit_transaction(t(4), xid(2), vec![mutated(1, "b")])
            .unwrap();
        h.complete_commit(t(5), xid(2)).unwrap();

        // The read-write overlap on tid 1 must reject the viewer's commit.
        let error = h.commit_transaction(t(6), xid(1), vec![]).unwrap_err();
        assert!(matches!(error, HorizonError::Conflict { .. }));
    }

    #[test]
    fn test_read_only_transaction_commits_empty() {
        let mut h = horizon();
        h.start_transaction(t(1), xid(1), IsolationLevel::NonSerializableRead)
            .unwrap();
        h.include(t(2), xid(1), Effect::Tuple(TupleEffect::Viewed(tid(1))))
            .unwrap();

        let prepared = h.commit_transaction(t(3), xid(1), vec![]).unwrap();
        assert_eq!(prepared.effect, vec![]);
        let commit = h.complete_commit(t(4), xid(1)).unwrap();
        assert_eq!(commit.effect, vec![]);
        assert!(h.is_empty());
    }

    #[test]
    fn test_read_only_transaction_rejects_writes() {
        let mut h = horizon();
        h.start_transaction(t(1), xid(1), IsolationLevel::NonSerializableRead)
            .unwrap();

        let error = h
            .commit_transaction(t(2), xid(1), vec![mutated(1, "a")])
            .unwrap_err();
        assert_eq!(
            error,
            HorizonError::NonSerializableWriteTransaction(xid(1))
        );
        assert!(h.is_empty());
    }

    /// Read transactions never link into the conflict graph.
    #[test]
    fn test_read_only_transactions_do_not_conflict() {
        let mut h = horizon();
        h.start_transaction(t(1), xid(1), IsolationLevel::NonSerializableRead)
            .unwrap();
        start(&mut h, 2, 2);

        h.commit_transaction(t(3), xid(2), vec![mutated(1, "a")])
            .unwrap();
        h.complete_commit(t(4), xid(2)).unwrap();

        assert!(
            h.serializable_transaction(xid(2)).is_none()
                && h.transaction_state(xid(1)) == Some(TransactionState::Active)
        );
        let prepared = h.commit_transaction(t(5), xid(1), vec![]).unwrap();
        assert_eq!(prepared.effect, vec![]);
    }

    #[test]
    fn test_oldest_start_tracks_the_front_of_the_horizon() {
        let mut h = horizon();
        assert_eq!(h.oldest_start(), None);
        start(&mut h, 1, 1);
        start(&mut h, 2, 2);
        assert_eq!(h.oldest_start(), Some(t(1)));

        h.commit_transaction(t(3), xid(1), vec![mutated(1, "a")])
            .unwrap();
        // Still resident while prepared.
        assert_eq!(h.oldest_start(), Some(t(1)));

        h.complete_commit(t(4), xid(1)).unwrap();
        assert_eq!(h.oldest_start(), Some(t(2)));
    }
}
