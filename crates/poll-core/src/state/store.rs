//! Locally known poll state and its transition rules.
//!
//! The store is the only mutable state shared between the sync engine and the
//! transaction coordinator. Every transition runs as one closure under the
//! watch channel's lock, so concurrent merges never interleave and observers
//! always see whole snapshots.
//!
//! Merge rules for confirmed reads:
//! - `Closed` is terminal for reads; only a confirmed create reopens.
//! - `has_voted` never goes from true back to false within a round.
//! - Each counter only grows within a round.
//! - `pending` is never touched by reads.

use crate::PollError;
use poll_types::{
	PendingOp, PollPhase, PollRead, PollState, TransactionKind, TxOutcome, VoteChoice,
};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Container for the state of one bound poll.
pub struct PollStateStore {
	sender: watch::Sender<PollState>,
	disposed: AtomicBool,
}

impl Default for PollStateStore {
	fn default() -> Self {
		Self::new()
	}
}

impl PollStateStore {
	pub fn new() -> Self {
		let (sender, _) = watch::channel(PollState::default());
		Self {
			sender,
			disposed: AtomicBool::new(false),
		}
	}

	/// Returns a copy of the current state.
	pub fn snapshot(&self) -> PollState {
		self.sender.borrow().clone()
	}

	/// Returns a receiver that is notified on every state change.
	pub fn subscribe(&self) -> watch::Receiver<PollState> {
		self.sender.subscribe()
	}

	/// Merges confirmed fields into the state. Returns whether anything
	/// changed.
	pub fn apply_read(&self, read: &PollRead) -> bool {
		self.transition(|state| merge_read(state, read))
	}

	/// Marks a write as in flight.
	///
	/// Fails with `AlreadyPending` when another write has not resolved yet,
	/// and with `SessionClosed` after `dispose`.
	pub fn begin_pending(&self, kind: TransactionKind) -> Result<(), PollError> {
		let mut result = Ok(());
		self.sender.send_if_modified(|state| {
			if self.disposed.load(Ordering::Acquire) {
				result = Err(PollError::SessionClosed);
				return false;
			}
			if state.is_pending() {
				result = Err(PollError::AlreadyPending);
				return false;
			}
			state.pending = match kind {
				TransactionKind::CreatePoll => PendingOp::Creating,
				TransactionKind::Vote(choice) => PendingOp::Voting(choice),
			};
			true
		});
		result
	}

	/// Clears `pending` and folds the outcome of the write into the state.
	pub fn resolve_pending(&self, outcome: TxOutcome) -> bool {
		self.transition(|state| {
			let was_pending = state.is_pending();
			state.pending = PendingOp::None;

			match outcome {
				TxOutcome::Created { question } => {
					*state = PollState {
						question,
						phase: PollPhase::Open,
						round: state.round + 1,
						..Default::default()
					};
					true
				},
				TxOutcome::Voted(choice) => {
					match choice {
						VoteChoice::Yes => state.yes_votes = state.yes_votes.saturating_add(1),
						VoteChoice::No => state.no_votes = state.no_votes.saturating_add(1),
					}
					state.has_voted = true;
					true
				},
				TxOutcome::Failed => was_pending,
			}
		})
	}

	/// Freezes the store: every later transition is a no-op.
	pub fn dispose(&self) {
		// Taken under the channel lock so no transition straddles disposal.
		self.sender.send_if_modified(|_| {
			self.disposed.store(true, Ordering::Release);
			false
		});
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::Acquire)
	}

	fn transition(&self, f: impl FnOnce(&mut PollState) -> bool) -> bool {
		self.sender.send_if_modified(|state| {
			if self.disposed.load(Ordering::Acquire) {
				return false;
			}
			f(state)
		})
	}
}

fn merge_read(state: &mut PollState, read: &PollRead) -> bool {
	let before = state.clone();

	if let Some(open) = read.is_open {
		state.phase = match (state.phase, open) {
			(PollPhase::Closed, _) => PollPhase::Closed,
			(_, true) => PollPhase::Open,
			(_, false) => PollPhase::Closed,
		};
	}
	if let Some(question) = &read.question {
		if state.question != *question {
			state.question = question.clone();
		}
	}
	if let Some(yes) = read.yes_votes {
		state.yes_votes = state.yes_votes.max(yes);
	}
	if let Some(no) = read.no_votes {
		state.no_votes = state.no_votes.max(no);
	}
	if read.has_voted == Some(true) {
		state.has_voted = true;
	}

	*state != before
}
