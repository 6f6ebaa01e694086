// ============================================================================
// Transaction Module
// ============================================================================
//
// Session ownership shared by every adapter: one optional session per
// adapter, created on start, released on commit or rollback.
//
// ============================================================================

pub mod state;

pub use state::{ActiveSession, SessionSlot, TransactionId};
