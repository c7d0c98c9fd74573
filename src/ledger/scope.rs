//! Nestable snapshot/rollback over a [`Ledger`].
//!
//! Handles carry a monotonic sequence number and the id of the scope stack that issued them.
//! Rolling back a handle pops it and every handle opened after it, so a later handle can never
//! be used once an ancestor has been rolled back. Handles are not `Clone`; a rollback consumes
//! its handle.

use super::{Ledger, SnapshotId};
use crate::error::{Result, ScopeError};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, PartialEq, Eq)]
#[must_use = "a scope handle must be rolled back to release the ledger"]
pub struct ScopeHandle {
    scope_id: u64,
    seq: u64,
    depth: usize,
    snapshot: SnapshotId,
}

impl ScopeHandle {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Nesting depth at creation; 0 for the outermost scope.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

#[derive(Debug, Clone, Copy)]
struct LiveScope {
    seq: u64,
    snapshot: SnapshotId,
}

#[derive(Debug)]
pub struct StateScope {
    id: u64,
    next_seq: u64,
    live: Vec<LiveScope>,
}

impl Default for StateScope {
    fn default() -> Self {
        Self::new()
    }
}

impl StateScope {
    pub fn new() -> Self {
        Self {
            id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
            next_seq: 0,
            live: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, handle: &ScopeHandle) -> bool {
        handle.scope_id == self.id
            && self
                .live
                .iter()
                .any(|scope| scope.seq == handle.seq && scope.snapshot == handle.snapshot)
    }

    pub async fn snapshot<L: Ledger + ?Sized>(&mut self, ledger: &L) -> Result<ScopeHandle> {
        let snapshot = ledger.snapshot().await?;
        self.next_seq += 1;
        let handle = ScopeHandle {
            scope_id: self.id,
            seq: self.next_seq,
            depth: self.live.len(),
            snapshot,
        };
        self.live.push(LiveScope {
            seq: handle.seq,
            snapshot,
        });
        tracing::debug!(
            "[SCOPE] Opened scope #{} at depth {} (ledger snapshot {})",
            handle.seq,
            handle.depth,
            snapshot.0
        );
        Ok(handle)
    }

    pub async fn rollback<L: Ledger + ?Sized>(
        &mut self,
        ledger: &L,
        handle: ScopeHandle,
    ) -> Result<()> {
        if handle.scope_id != self.id {
            return Err(ScopeError::InvalidHandle {
                seq: handle.seq,
                reason: "handle was issued by a different scope stack".to_string(),
            }
            .into());
        }
        let Some(position) = self.live.iter().position(|scope| scope.seq == handle.seq) else {
            return Err(ScopeError::InvalidHandle {
                seq: handle.seq,
                reason: "already rolled back, or invalidated by an ancestor rollback".to_string(),
            }
            .into());
        };
        if self.live[position].snapshot != handle.snapshot {
            return Err(ScopeError::InvalidHandle {
                seq: handle.seq,
                reason: "ledger snapshot does not match the live scope".to_string(),
            }
            .into());
        }

        ledger.revert(handle.snapshot).await?;
        let invalidated = self.live.len() - position - 1;
        self.live.truncate(position);

        if invalidated > 0 {
            tracing::debug!(
                "[SCOPE] Rolled back scope #{}; invalidated {} nested scope(s)",
                handle.seq,
                invalidated
            );
        } else {
            tracing::debug!("[SCOPE] Rolled back scope #{}", handle.seq);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;
    use crate::ledger::Actor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CounterLedger {
        inner: Mutex<CounterState>,
    }

    #[derive(Default)]
    struct CounterState {
        value: u64,
        fail_reverts: bool,
        next_id: u64,
        snapshots: Vec<(SnapshotId, u64)>,
    }

    impl CounterLedger {
        fn bump(&self) {
            self.inner.lock().unwrap().value += 1;
        }

        fn value(&self) -> u64 {
            self.inner.lock().unwrap().value
        }

        fn fail_reverts(&self, fail: bool) {
            self.inner.lock().unwrap().fail_reverts = fail;
        }
    }

    #[async_trait]
    impl Ledger for CounterLedger {
        async fn actors(&self) -> Result<Vec<Actor>> {
            Ok(Vec::new())
        }

        async fn snapshot(&self) -> Result<SnapshotId> {
            let mut state = self.inner.lock().unwrap();
            state.next_id += 1;
            let id = SnapshotId(state.next_id);
            let value = state.value;
            state.snapshots.push((id, value));
            Ok(id)
        }

        async fn revert(&self, id: SnapshotId) -> Result<()> {
            let mut state = self.inner.lock().unwrap();
            if state.fail_reverts {
                return Err(ScopeError::SnapshotFailure("revert unavailable".into()).into());
            }
            let position = state
                .snapshots
                .iter()
                .position(|(sid, _)| *sid == id)
                .ok_or_else(|| ScopeError::InvalidHandle {
                    seq: id.0,
                    reason: "unknown".into(),
                })?;
            state.value = state.snapshots[position].1;
            state.snapshots.truncate(position);
            Ok(())
        }

        async fn advance_time(&self, _seconds: u64) -> Result<()> {
            Ok(())
        }

        async fn timestamp(&self) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_nested_scopes_restore_in_order() {
        let ledger = CounterLedger::default();
        let mut scopes = StateScope::new();

        let outer = scopes.snapshot(&ledger).await.unwrap();
        ledger.bump();
        let inner = scopes.snapshot(&ledger).await.unwrap();
        ledger.bump();
        assert_eq!(inner.depth(), 1);
        assert_eq!(ledger.value(), 2);

        scopes.rollback(&ledger, inner).await.unwrap();
        assert_eq!(ledger.value(), 1);
        scopes.rollback(&ledger, outer).await.unwrap();
        assert_eq!(ledger.value(), 0);
        assert_eq!(scopes.depth(), 0);
    }

    #[tokio::test]
    async fn test_ancestor_rollback_invalidates_later_handles() {
        let ledger = CounterLedger::default();
        let mut scopes = StateScope::new();

        let first = scopes.snapshot(&ledger).await.unwrap();
        ledger.bump();
        let second = scopes.snapshot(&ledger).await.unwrap();
        assert!(scopes.is_live(&second));

        scopes.rollback(&ledger, first).await.unwrap();
        assert!(!scopes.is_live(&second));

        let err = scopes.rollback(&ledger, second).await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Scope(ScopeError::InvalidHandle { seq: 2, .. })
        ));
        assert_eq!(ledger.value(), 0);
    }

    #[tokio::test]
    async fn test_failed_revert_keeps_scopes_live() {
        let ledger = CounterLedger::default();
        let mut scopes = StateScope::new();

        let outer = scopes.snapshot(&ledger).await.unwrap();
        ledger.bump();
        let inner = scopes.snapshot(&ledger).await.unwrap();
        ledger.bump();

        ledger.fail_reverts(true);
        let err = scopes.rollback(&ledger, inner).await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Scope(ScopeError::SnapshotFailure(_))
        ));
        assert_eq!(scopes.depth(), 2);
        assert!(scopes.is_live(&outer));
        assert_eq!(ledger.value(), 2);

        ledger.fail_reverts(false);
        scopes.rollback(&ledger, outer).await.unwrap();
        assert_eq!(scopes.depth(), 0);
        assert_eq!(ledger.value(), 0);
    }

    #[tokio::test]
    async fn test_handle_from_other_stack_is_rejected() {
        let ledger = CounterLedger::default();
        let mut left = StateScope::new();
        let mut right = StateScope::new();

        let foreign = left.snapshot(&ledger).await.unwrap();
        let own = right.snapshot(&ledger).await.unwrap();
        assert_eq!(foreign.seq(), own.seq());

        let err = right.rollback(&ledger, foreign).await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Scope(ScopeError::InvalidHandle { .. })
        ));
        right.rollback(&ledger, own).await.unwrap();
    }
}
