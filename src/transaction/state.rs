// ============================================================================
// Session Ownership
// ============================================================================
//
// An adapter owns at most one session at a time. The session is created by
// start_transaction and destroyed by commit or rollback; the slot below is
// the single place that enforces this.
//
// ============================================================================

use crate::core::{DbError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction, local to this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// A session with an open transaction.
///
/// `S` is whatever the backend needs to scope operations to the
/// transaction: a driver session for MongoDB, a snapshot for the in-memory
/// adapter.
#[derive(Debug)]
pub struct ActiveSession<S> {
    id: TransactionId,
    started_at: Instant,
    handle: S,
}

impl<S> ActiveSession<S> {
    fn new(handle: S) -> Self {
        Self {
            id: TransactionId::new(),
            started_at: Instant::now(),
            handle,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn handle_mut(&mut self) -> &mut S {
        &mut self.handle
    }

    /// Release the session handle once the transaction has ended.
    pub fn into_handle(self) -> S {
        self.handle
    }
}

/// Holder for the optional session of one adapter.
#[derive(Debug)]
pub struct SessionSlot<S> {
    active: Option<ActiveSession<S>>,
}

impl<S> Default for SessionSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SessionSlot<S> {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Id of the open transaction, if any
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.active.as_ref().map(|session| session.id())
    }

    /// Fails when a transaction is already open.
    pub fn ensure_vacant(&self) -> Result<()> {
        match &self.active {
            Some(session) => Err(DbError::TransactionAlreadyActive(session.id().to_string())),
            None => Ok(()),
        }
    }

    /// Install a session whose transaction has just been started.
    pub fn install(&mut self, handle: S) -> Result<TransactionId> {
        self.ensure_vacant()?;
        let session = ActiveSession::new(handle);
        let id = session.id();
        self.active = Some(session);
        Ok(id)
    }

    /// Handle of the open transaction, for scoping an operation to it.
    pub fn handle_mut(&mut self) -> Option<&mut S> {
        self.active.as_mut().map(ActiveSession::handle_mut)
    }

    pub fn active_mut(&mut self) -> Option<&mut ActiveSession<S>> {
        self.active.as_mut()
    }

    /// Remove the session, leaving the slot empty.
    pub fn take(&mut self) -> Option<ActiveSession<S>> {
        self.active.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_ids_are_unique() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(format!("{}", TransactionId(5)), "txn_5");
    }

    #[test]
    fn test_slot_lifecycle() {
        let mut slot: SessionSlot<Vec<u8>> = SessionSlot::new();
        assert!(!slot.is_active());
        assert!(slot.handle_mut().is_none());

        let id = slot.install(Vec::new()).unwrap();
        assert!(slot.is_active());
        assert_eq!(slot.transaction_id(), Some(id));

        slot.handle_mut().unwrap().push(1);

        let session = slot.take().unwrap();
        assert_eq!(session.id(), id);
        assert_eq!(session.into_handle(), vec![1]);
        assert!(!slot.is_active());
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_slot_rejects_second_session() {
        let mut slot = SessionSlot::new();
        slot.install(()).unwrap();

        let err = slot.install(()).unwrap_err();
        assert!(matches!(err, DbError::TransactionAlreadyActive(_)));
        assert!(slot.ensure_vacant().is_err());

        slot.take();
        assert!(slot.ensure_vacant().is_ok());
    }
}
