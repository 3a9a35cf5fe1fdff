//! Write side of a session: serialized poll transactions.
//!
//! Each submission claims the store's single pending slot before touching the
//! ledger, so at most one write from this client is in flight at a time. A
//! confirmed write is folded into the store optimistically and then
//! reconciled with one authoritative read. A failed write only clears the
//! pending slot.

use crate::engine::event_bus::EventBus;
use crate::state::store::PollStateStore;
use crate::PollError;
use poll_ledger::{ContractBinding, LedgerError};
use poll_types::{
	truncate_id, PollEvent, SigningIdentity, TransactionConfirmation, TransactionKind, TxOutcome,
	VoteChoice,
};
use std::sync::Arc;
use tracing::instrument;

/// Submits poll transactions on behalf of the active identity.
#[derive(Clone)]
pub struct TransactionCoordinator {
	binding: ContractBinding,
	identity: SigningIdentity,
	store: Arc<PollStateStore>,
	event_bus: EventBus,
}

impl TransactionCoordinator {
	pub fn new(
		binding: ContractBinding,
		identity: SigningIdentity,
		store: Arc<PollStateStore>,
		event_bus: EventBus,
	) -> Self {
		Self {
			binding,
			identity,
			store,
			event_bus,
		}
	}

	/// Creates a new poll with the given question.
	#[instrument(skip_all, fields(identity = %self.identity))]
	pub async fn submit_create(
		&self,
		question: &str,
	) -> Result<TransactionConfirmation, PollError> {
		let slot = PendingSlot::claim(&self.store, TransactionKind::CreatePoll)?;
		self.announce(TransactionKind::CreatePoll);

		let result = self.binding.create_poll(question, self.identity).await;
		slot.release();
		self.finish(
			TransactionKind::CreatePoll,
			TxOutcome::Created {
				question: question.to_string(),
			},
			result,
		)
		.await
	}

	/// Casts the active identity's vote.
	#[instrument(skip_all, fields(identity = %self.identity, choice = %choice))]
	pub async fn submit_vote(
		&self,
		choice: VoteChoice,
	) -> Result<TransactionConfirmation, PollError> {
		let kind = TransactionKind::Vote(choice);
		let slot = PendingSlot::claim(&self.store, kind)?;
		self.announce(kind);

		let result = self.binding.vote(choice, self.identity).await;
		slot.release();
		self.finish(kind, TxOutcome::Voted(choice), result).await
	}

	fn announce(&self, kind: TransactionKind) {
		tracing::debug!(kind = %kind, "Transaction submitted");
		self.event_bus
			.publish(PollEvent::TransactionSubmitted { kind })
			.ok();
	}

	async fn finish(
		&self,
		kind: TransactionKind,
		success: TxOutcome,
		result: Result<TransactionConfirmation, LedgerError>,
	) -> Result<TransactionConfirmation, PollError> {
		let confirmation = match result {
			Ok(confirmation) => confirmation,
			Err(e) => {
				tracing::warn!(kind = %kind, error = %e, "Transaction failed");
				self.store.resolve_pending(TxOutcome::Failed);
				self.event_bus
					.publish(PollEvent::TransactionFailed {
						kind,
						error: e.to_string(),
					})
					.ok();
				return Err(e.into());
			},
		};

		tracing::info!(
			kind = %kind,
			tx_hash = %truncate_id(&confirmation.tx_hash.to_string()),
			"Transaction confirmed"
		);
		self.store.resolve_pending(success);
		self.event_bus
			.publish(PollEvent::TransactionConfirmed {
				kind,
				confirmation: confirmation.clone(),
			})
			.ok();

		self.reconcile().await?;
		Ok(confirmation)
	}

	/// Re-reads every field after a confirmed write.
	///
	/// Whatever could be read is merged. If any field failed, the optimistic
	/// state stays and the failure is surfaced.
	async fn reconcile(&self) -> Result<(), PollError> {
		let read = self.binding.read_all(Some(self.identity)).await;
		self.store.apply_read(&read);

		let missing = [
			read.is_open.is_none(),
			read.question.is_none(),
			read.yes_votes.is_none(),
			read.no_votes.is_none(),
			read.has_voted.is_none(),
		]
		.iter()
		.filter(|failed| **failed)
		.count();

		if missing > 0 {
			return Err(PollError::Ledger(LedgerError::QueryFailed(format!(
				"Reconciliation read incomplete: {} of 5 fields unavailable",
				missing
			))));
		}
		Ok(())
	}
}

/// Claim on the store's pending slot for one submission.
///
/// If the submission is dropped while the write is in flight, the slot is
/// cleared as a failed write so later submissions are not locked out.
struct PendingSlot<'a> {
	store: &'a PollStateStore,
	kind: TransactionKind,
	armed: bool,
}

impl<'a> PendingSlot<'a> {
	fn claim(store: &'a PollStateStore, kind: TransactionKind) -> Result<Self, PollError> {
		store.begin_pending(kind)?;
		Ok(Self {
			store,
			kind,
			armed: true,
		})
	}

	/// Hands the slot over to `finish`, which resolves it with the outcome.
	fn release(mut self) {
		self.armed = false;
	}
}

impl Drop for PendingSlot<'_> {
	fn drop(&mut self) {
		if self.armed {
			tracing::warn!(kind = %self.kind, "Submission abandoned before the write resolved");
			self.store.resolve_pending(TxOutcome::Failed);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{binding_for, memory_ledger, GatedClient};
	use alloy_primitives::Address;
	use poll_ledger::MockLedgerClient;
	use poll_types::{PendingOp, PollPhase, PollRead};

	fn coordinator(
		binding: ContractBinding,
		identity: SigningIdentity,
	) -> (TransactionCoordinator, Arc<PollStateStore>, EventBus) {
		let store = Arc::new(PollStateStore::new());
		let event_bus = EventBus::new(16);
		(
			TransactionCoordinator::new(binding, identity, store.clone(), event_bus.clone()),
			store,
			event_bus,
		)
	}

	fn load(store: &PollStateStore, yes: u64, no: u64) {
		store.apply_read(&PollRead {
			is_open: Some(true),
			question: Some("Ship on Friday?".into()),
			yes_votes: Some(yes),
			no_votes: Some(no),
			has_voted: Some(false),
		});
	}

	#[tokio::test]
	async fn test_confirmed_vote_increments_by_one() {
		let (ledger, identities) = memory_ledger();
		ledger.open_poll("Ship on Friday?").await;
		let (coordinator, store, _) = coordinator(binding_for(ledger.clone()), identities[0]);
		load(&store, 0, 0);

		let before = store.snapshot();
		coordinator.submit_vote(VoteChoice::Yes).await.unwrap();
		let after = store.snapshot();

		assert_eq!(after.yes_votes, before.yes_votes + 1);
		assert_eq!(after.no_votes, before.no_votes);
		assert!(after.has_voted);
		assert_eq!(after.pending, PendingOp::None);
	}

	#[tokio::test]
	async fn test_reconcile_picks_up_concurrent_votes() {
		let (ledger, identities) = memory_ledger();
		ledger.open_poll("Ship on Friday?").await;
		let (coordinator, store, _) = coordinator(binding_for(ledger.clone()), identities[0]);
		load(&store, 0, 0);

		// Another identity voted after our load.
		ledger.cast_vote(identities[1], VoteChoice::No).await.unwrap();
		coordinator.submit_vote(VoteChoice::Yes).await.unwrap();

		let state = store.snapshot();
		assert_eq!((state.yes_votes, state.no_votes), (1, 1));
	}

	#[tokio::test]
	async fn test_pending_rejects_second_submission_without_ledger_call() {
		let mut client = MockLedgerClient::new();
		client.expect_send().never();
		client.expect_call().never();

		let (coordinator, store, _) =
			coordinator(binding_for(Arc::new(client)), SigningIdentity(Address::ZERO));
		store.begin_pending(TransactionKind::CreatePoll).unwrap();

		let err = coordinator.submit_vote(VoteChoice::No).await.unwrap_err();
		assert_eq!(err, PollError::AlreadyPending);
		assert_eq!(store.snapshot().pending, PendingOp::Creating);
	}

	#[tokio::test]
	async fn test_at_most_one_write_in_flight() {
		let (ledger, identities) = memory_ledger();
		ledger.open_poll("Ship on Friday?").await;
		let client = Arc::new(GatedClient::new(ledger.clone()));
		let (coordinator, store, _) = coordinator(binding_for(client.clone()), identities[0]);
		load(&store, 0, 0);

		client.hold_sends(true);
		let first = tokio::spawn({
			let coordinator = coordinator.clone();
			async move { coordinator.submit_vote(VoteChoice::Yes).await }
		});
		client.wait_entered().await;

		let second = coordinator.submit_vote(VoteChoice::No).await;
		assert_eq!(second.unwrap_err(), PollError::AlreadyPending);
		let create = coordinator.submit_create("Another?").await;
		assert_eq!(create.unwrap_err(), PollError::AlreadyPending);
		assert_eq!(client.send_count(), 1);

		client.hold_sends(false);
		client.release();
		first.await.unwrap().unwrap();

		let state = store.snapshot();
		assert_eq!((state.yes_votes, state.no_votes), (1, 0));
		assert_eq!(state.pending, PendingOp::None);
		assert_eq!(client.send_count(), 1);
		assert_eq!(ledger.send_count(), 1);
	}

	#[tokio::test]
	async fn test_reverted_vote_leaves_state_untouched() {
		let (ledger, identities) = memory_ledger();
		ledger.open_poll("Ship on Friday?").await;
		ledger.cast_vote(identities[0], VoteChoice::Yes).await.unwrap();
		let (coordinator, store, event_bus) =
			coordinator(binding_for(ledger.clone()), identities[0]);
		let mut events = event_bus.subscribe();

		// Local view has not caught up with the earlier vote yet.
		load(&store, 0, 0);
		let before = store.snapshot();

		let err = coordinator.submit_vote(VoteChoice::Yes).await.unwrap_err();
		assert!(matches!(
			err,
			PollError::Ledger(LedgerError::TransactionReverted(ref reason)) if reason == "Already voted"
		));

		let after = store.snapshot();
		assert_eq!(after, before);
		assert!(!after.has_voted);
		assert_eq!(after.pending, PendingOp::None);

		assert!(matches!(
			events.recv().await.unwrap(),
			PollEvent::TransactionSubmitted { .. }
		));
		assert!(matches!(
			events.recv().await.unwrap(),
			PollEvent::TransactionFailed { .. }
		));
	}

	#[tokio::test]
	async fn test_rejected_signature_is_surfaced() {
		let (ledger, identities) = memory_ledger();
		ledger.open_poll("Ship on Friday?").await;
		ledger.set_signatures_rejected(true);
		let (coordinator, store, _) = coordinator(binding_for(ledger.clone()), identities[0]);
		load(&store, 2, 3);
		let before = store.snapshot();

		let err = coordinator.submit_vote(VoteChoice::No).await.unwrap_err();
		assert!(matches!(
			err,
			PollError::Ledger(LedgerError::TransactionRejected(_))
		));
		assert_eq!(store.snapshot(), before);
	}

	#[tokio::test]
	async fn test_confirmed_create_opens_fresh_poll() {
		let (ledger, identities) = memory_ledger();
		let (coordinator, store, event_bus) =
			coordinator(binding_for(ledger.clone()), identities[0]);
		let mut events = event_bus.subscribe();

		coordinator
			.submit_create("Is this test passing?")
			.await
			.unwrap();

		let state = store.snapshot();
		assert_eq!(state.phase, PollPhase::Open);
		assert_eq!(state.question, "Is this test passing?");
		assert_eq!((state.yes_votes, state.no_votes), (0, 0));
		assert!(!state.has_voted);
		assert_eq!(state.round, 1);

		events.recv().await.unwrap();
		match events.recv().await.unwrap() {
			PollEvent::TransactionConfirmed { kind, confirmation } => {
				assert_eq!(kind, TransactionKind::CreatePoll);
				assert_eq!(confirmation.block_number, Some(1));
			},
			other => panic!("Unexpected event: {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_reconcile_failure_is_surfaced_after_optimistic_fold() {
		let (ledger, identities) = memory_ledger();
		ledger.open_poll("Ship on Friday?").await;
		let client = Arc::new(GatedClient::new(ledger.clone()));
		let (coordinator, store, _) = coordinator(binding_for(client.clone()), identities[0]);
		load(&store, 0, 0);

		// The send goes through; every read afterwards fails.
		client.hold_sends(true);
		let submit = tokio::spawn({
			let coordinator = coordinator.clone();
			async move { coordinator.submit_vote(VoteChoice::No).await }
		});
		client.wait_entered().await;
		ledger.set_queries_failing(true);
		client.hold_sends(false);
		client.release();

		let err = submit.await.unwrap().unwrap_err();
		assert!(matches!(err, PollError::Ledger(LedgerError::QueryFailed(_))));

		let state = store.snapshot();
		assert_eq!(state.no_votes, 1);
		assert!(state.has_voted);
		assert_eq!(state.pending, PendingOp::None);
	}

	#[tokio::test(start_paused = true)]
	async fn test_dropped_submission_frees_pending_slot() {
		let (ledger, identities) = memory_ledger();
		ledger.open_poll("Ship on Friday?").await;
		let client = Arc::new(GatedClient::new(ledger.clone()));
		let (coordinator, store, _) = coordinator(binding_for(client.clone()), identities[0]);
		load(&store, 0, 0);

		client.hold_sends(true);
		let abandoned = tokio::time::timeout(
			std::time::Duration::from_secs(5),
			coordinator.submit_vote(VoteChoice::Yes),
		)
		.await;
		assert!(abandoned.is_err());

		let state = store.snapshot();
		assert_eq!(state.pending, PendingOp::None);
		assert_eq!(state.yes_votes, 0);
		assert!(!state.has_voted);

		client.hold_sends(false);
		coordinator.submit_vote(VoteChoice::No).await.unwrap();

		let state = store.snapshot();
		assert_eq!((state.yes_votes, state.no_votes), (0, 1));
		assert_eq!(state.pending, PendingOp::None);
		assert_eq!(client.send_count(), 2);
		assert_eq!(ledger.send_count(), 1);
	}
}
