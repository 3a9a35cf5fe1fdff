//! Poll synchronization and voting-transaction engine.
//!
//! A `PollSession` binds to the poll contract deployed on the connected
//! network and owns everything that hangs off that binding: the
//! `PollStateStore` holding the locally known state, the `SyncEngine` task
//! that loads it and watches the active identity's vote, and the
//! `TransactionCoordinator` that submits writes one at a time. Tearing the
//! session down cancels the watch task and freezes the store.

use poll_ledger::LedgerError;
use thiserror::Error;

pub mod engine;
pub mod handlers;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::event_bus::EventBus;
pub use engine::sync::{SyncEngine, SyncHandle, SyncPhase};
pub use engine::PollSession;
pub use handlers::transaction::TransactionCoordinator;
pub use state::store::PollStateStore;

/// Errors surfaced to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
	/// Another write from this client is still in flight.
	#[error("A transaction is already pending")]
	AlreadyPending,
	/// The session was torn down; its state no longer changes.
	#[error("Poll session is closed")]
	SessionClosed,
	#[error(transparent)]
	Ledger(#[from] LedgerError),
}

impl PollError {
	/// Whether the user may sensibly repeat the action later without changing
	/// network, account or configuration.
	pub fn is_retryable(&self) -> bool {
		match self {
			PollError::AlreadyPending => true,
			PollError::SessionClosed => false,
			PollError::Ledger(e) => matches!(
				e,
				LedgerError::ConnectionDenied(_)
					| LedgerError::QueryFailed(_)
					| LedgerError::TransactionRejected(_)
			),
		}
	}
}
