use harvest_harness::error::{HarnessError, ScopeError};
use harvest_harness::ledger::{Ledger, ScopeHandle, StateScope};
use harvest_harness::sim::PolygonFixture;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Open,
    Advance(u64),
    Rollback(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Open),
        3 => (1u64..3_600).prop_map(Op::Advance),
        2 => (0usize..8).prop_map(Op::Rollback),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

async fn replay(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let fixture = PolygonFixture::build().expect("fixture");
    let chain = &fixture.chain;
    let mut scopes = StateScope::new();
    // (handle, ledger time when it was opened)
    let mut open: Vec<(ScopeHandle, u64)> = Vec::new();

    for op in ops {
        match op {
            Op::Open => {
                let at = chain.timestamp().await.expect("timestamp");
                let handle = scopes.snapshot(chain).await.expect("snapshot");
                prop_assert_eq!(handle.depth(), open.len());
                open.push((handle, at));
            }
            Op::Advance(seconds) => chain.advance_time(seconds).await.expect("advance"),
            Op::Rollback(pick) => {
                if open.is_empty() {
                    continue;
                }
                let index = pick % open.len();
                let mut stale: Vec<_> = open.drain(index..).collect();
                let (handle, at) = stale.remove(0);
                scopes.rollback(chain, handle).await.expect("rollback");
                let restored = chain.timestamp().await.expect("timestamp");
                prop_assert_eq!(restored, at);

                if let Some((descendant, _)) = stale.into_iter().next() {
                    prop_assert!(!scopes.is_live(&descendant));
                    let err = scopes.rollback(chain, descendant).await.unwrap_err();
                    let invalid = matches!(
                        err,
                        HarnessError::Scope(ScopeError::InvalidHandle { .. })
                    );
                    prop_assert!(invalid);
                    prop_assert_eq!(chain.timestamp().await.expect("timestamp"), at);
                }
            }
        }
        prop_assert_eq!(scopes.depth(), open.len());
        prop_assert_eq!(chain.live_snapshots().await, open.len());
    }

    while let Some((handle, at)) = open.pop() {
        scopes.rollback(chain, handle).await.expect("unwind");
        prop_assert_eq!(chain.timestamp().await.expect("timestamp"), at);
    }
    prop_assert_eq!(chain.live_snapshots().await, 0);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn rollback_restores_state_and_retires_descendants(
        ops in proptest::collection::vec(op(), 1..40)
    ) {
        runtime().block_on(replay(ops))?;
    }
}

#[tokio::test]
async fn test_snapshot_failure_is_not_a_scope() {
    let fixture = PolygonFixture::build().expect("fixture");
    fixture.chain.set_snapshot_limit(1).await;
    let mut scopes = StateScope::new();

    let outer = scopes.snapshot(&fixture.chain).await.expect("first snapshot");
    let err = scopes.snapshot(&fixture.chain).await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Scope(ScopeError::SnapshotFailure(_))
    ));
    assert_eq!(scopes.depth(), 1);
    scopes.rollback(&fixture.chain, outer).await.expect("rollback");
}
