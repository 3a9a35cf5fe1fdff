//! Session orchestration.
//!
//! `PollSession` is the one object the presentation layer holds. It owns the
//! binding to the deployed poll and everything derived from it, and is rebuilt
//! from scratch whenever the network or account changes.

pub mod event_bus;
pub mod sync;

use self::event_bus::EventBus;
use self::sync::{SyncEngine, SyncHandle, SyncPhase};
use crate::handlers::transaction::TransactionCoordinator;
use crate::state::store::PollStateStore;
use crate::PollError;
use alloy_primitives::Address;
use poll_ledger::{ContractBinding, LedgerError, LedgerHandle};
use poll_types::{
	ContractArtifact, NetworkId, PollEvent, PollState, SigningIdentity, TransactionConfirmation,
	VoteChoice,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};

/// A live binding to one poll for one identity on one network.
pub struct PollSession {
	identity: SigningIdentity,
	binding: ContractBinding,
	store: Arc<PollStateStore>,
	coordinator: TransactionCoordinator,
	sync: Mutex<Option<SyncHandle>>,
	event_bus: EventBus,
	poll_interval: Duration,
}

impl PollSession {
	/// Connects to the identity provider, binds to the poll on the current
	/// network and starts syncing.
	///
	/// Events are published on `event_bus`; subscribe before connecting to see
	/// the initial `StateLoaded`.
	pub async fn connect(
		ledger: &LedgerHandle,
		artifact: &ContractArtifact,
		poll_interval: Duration,
		event_bus: EventBus,
	) -> Result<Self, PollError> {
		let identity = ledger
			.request_identities()
			.await?
			.into_iter()
			.next()
			.ok_or(LedgerError::NoIdentity)?;
		let network = ledger.current_network().await?;
		let binding = ledger.bind(artifact, network)?;

		tracing::info!(
			identity = %identity,
			network = %network,
			contract = %binding.address(),
			"Poll session connected"
		);

		let store = Arc::new(PollStateStore::new());
		let coordinator =
			TransactionCoordinator::new(binding.clone(), identity, store.clone(), event_bus.clone());
		let mut session = Self {
			identity,
			binding,
			store,
			coordinator,
			sync: Mutex::new(None),
			event_bus,
			poll_interval,
		};
		let sync = session.start_sync();
		*session.sync.get_mut() = Some(sync);
		Ok(session)
	}

	fn start_sync(&self) -> SyncHandle {
		SyncEngine::new(
			self.binding.clone(),
			self.identity,
			self.store.clone(),
			self.event_bus.clone(),
			self.poll_interval,
		)
		.start()
	}

	/// Starts a new sync engine when the current one has ended but the store
	/// shows an open poll this identity has not voted in.
	async fn resume_sync(&self) {
		let mut sync = self.sync.lock().await;
		let Some(handle) = sync.as_ref() else {
			return;
		};
		let ended = handle.is_finished()
			|| matches!(handle.phase(), SyncPhase::Closed | SyncPhase::Stopped);
		let state = self.store.snapshot();
		if !ended || self.store.is_disposed() || !state.is_open() || state.has_voted {
			return;
		}

		tracing::info!(round = state.round, "Restarting poll sync for new round");
		*sync = Some(self.start_sync());
	}

	/// Tears this session down and binds again with fresh state.
	///
	/// Receivers from `subscribe` keep the old store and stop changing.
	pub async fn rebind(
		&mut self,
		ledger: &LedgerHandle,
		artifact: &ContractArtifact,
	) -> Result<(), PollError> {
		self.shutdown().await;
		*self = Self::connect(ledger, artifact, self.poll_interval, self.event_bus.clone()).await?;
		Ok(())
	}

	/// Whether the provider still reports this session's network and active
	/// identity. A `false` means the session should be rebound.
	pub async fn is_current(&self, ledger: &LedgerHandle) -> Result<bool, PollError> {
		let network = ledger.current_network().await?;
		let identity = ledger.request_identities().await?.into_iter().next();
		Ok(network == self.binding.network() && identity == Some(self.identity))
	}

	/// Stops the sync engine and freezes the store. Idempotent.
	pub async fn shutdown(&mut self) {
		if let Some(sync) = self.sync.get_mut().take() {
			sync.stop().await;
		}
		self.store.dispose();
		tracing::debug!(network = %self.binding.network(), "Poll session shut down");
	}

	pub fn snapshot(&self) -> PollState {
		self.store.snapshot()
	}

	/// Receiver notified on every state change.
	pub fn subscribe(&self) -> watch::Receiver<PollState> {
		self.store.subscribe()
	}

	pub fn events(&self) -> broadcast::Receiver<PollEvent> {
		self.event_bus.subscribe()
	}

	/// Creates a poll. A confirmed create starts a new round, so the vote
	/// watch is restarted if it had already ended.
	pub async fn submit_create(
		&self,
		question: &str,
	) -> Result<TransactionConfirmation, PollError> {
		let result = self.coordinator.submit_create(question).await;
		self.resume_sync().await;
		result
	}

	pub async fn submit_vote(&self, choice: VoteChoice) -> Result<TransactionConfirmation, PollError> {
		self.coordinator.submit_vote(choice).await
	}

	pub fn identity(&self) -> SigningIdentity {
		self.identity
	}

	pub fn network(&self) -> NetworkId {
		self.binding.network()
	}

	pub fn contract_address(&self) -> Address {
		self.binding.address()
	}

	/// Current phase of the sync engine; `Stopped` after shutdown.
	pub async fn sync_phase(&self) -> SyncPhase {
		self.sync
			.lock()
			.await
			.as_ref()
			.map_or(SyncPhase::Stopped, |sync| sync.phase())
	}

	/// Receiver for phase changes of the current sync engine, if the session
	/// still runs one. A restarted engine has its own receiver.
	pub async fn watch_sync_phase(&self) -> Option<watch::Receiver<SyncPhase>> {
		self.sync.lock().await.as_ref().map(|sync| sync.watch_phase())
	}
}

impl Drop for PollSession {
	fn drop(&mut self) {
		// SyncHandle aborts its task on drop.
		self.sync.get_mut().take();
		self.store.dispose();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{memory_ledger, poll_artifact, NETWORK, POLL};
	use poll_ledger::implementations::memory::MemoryLedger;

	const TICK: Duration = Duration::from_millis(1000);

	fn handle_for(ledger: &Arc<MemoryLedger>) -> LedgerHandle {
		LedgerHandle::new(ledger.clone(), ledger.clone())
	}

	async fn wait_for(session: &PollSession, phase: SyncPhase) {
		let mut rx = session.watch_sync_phase().await.unwrap();
		rx.wait_for(|current| *current == phase).await.unwrap();
	}

	#[tokio::test(start_paused = true)]
	async fn test_connect_loads_and_votes() {
		let (ledger, identities) = memory_ledger();
		ledger.open_poll("Ship on Friday?").await;
		let handle = handle_for(&ledger);

		let event_bus = EventBus::new(16);
		let mut events = event_bus.subscribe();
		let session = PollSession::connect(&handle, &poll_artifact(), TICK, event_bus)
			.await
			.unwrap();

		assert_eq!(session.identity(), identities[0]);
		assert_eq!(session.network(), NETWORK);
		assert_eq!(session.contract_address(), POLL);

		wait_for(&session, SyncPhase::Watching).await;
		assert!(matches!(
			events.recv().await.unwrap(),
			PollEvent::StateLoaded { state } if state.question == "Ship on Friday?"
		));

		session.submit_vote(VoteChoice::No).await.unwrap();
		let state = session.snapshot();
		assert_eq!(state.no_votes, 1);
		assert!(state.has_voted);

		wait_for(&session, SyncPhase::Stopped).await;
	}

	#[tokio::test]
	async fn test_connect_denied() {
		let (ledger, _) = memory_ledger();
		ledger.set_access_denied(true);

		let err = PollSession::connect(&handle_for(&ledger), &poll_artifact(), TICK, EventBus::default())
			.await
			.err()
			.unwrap();
		assert!(matches!(err, PollError::Ledger(LedgerError::ConnectionDenied(_))));
	}

	#[tokio::test]
	async fn test_connect_without_identities() {
		let ledger = Arc::new(MemoryLedger::new(NETWORK, vec![]));

		let err = PollSession::connect(&handle_for(&ledger), &poll_artifact(), TICK, EventBus::default())
			.await
			.err()
			.unwrap();
		assert_eq!(err, PollError::Ledger(LedgerError::NoIdentity));
	}

	#[tokio::test]
	async fn test_connect_unsupported_network() {
		let (ledger, _) = memory_ledger();
		ledger.set_network(NetworkId(1)).await;

		let err = PollSession::connect(&handle_for(&ledger), &poll_artifact(), TICK, EventBus::default())
			.await
			.err()
			.unwrap();
		assert_eq!(
			err,
			PollError::Ledger(LedgerError::NoDeploymentForNetwork(NetworkId(1)))
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_shutdown_freezes_session() {
		let (ledger, _) = memory_ledger();
		ledger.open_poll("Ship on Friday?").await;
		let mut session =
			PollSession::connect(&handle_for(&ledger), &poll_artifact(), TICK, EventBus::default())
				.await
				.unwrap();
		wait_for(&session, SyncPhase::Watching).await;

		session.shutdown().await;
		session.shutdown().await;

		assert_eq!(session.sync_phase().await, SyncPhase::Stopped);
		assert_eq!(
			session.submit_vote(VoteChoice::Yes).await.unwrap_err(),
			PollError::SessionClosed
		);
		assert_eq!(ledger.send_count(), 0);

		let calls = ledger.call_count();
		tokio::time::sleep(TICK * 3).await;
		assert_eq!(ledger.call_count(), calls);
	}

	#[tokio::test(start_paused = true)]
	async fn test_rebind_after_network_switch_starts_clean() {
		let (ledger, _) = memory_ledger();
		ledger.open_poll("Ship on Friday?").await;
		let handle = handle_for(&ledger);
		let artifact = poll_artifact();
		let mut session = PollSession::connect(&handle, &artifact, TICK, EventBus::default())
			.await
			.unwrap();
		wait_for(&session, SyncPhase::Watching).await;
		session.submit_vote(VoteChoice::Yes).await.unwrap();
		let old_view = session.subscribe();
		assert!(session.is_current(&handle).await.unwrap());

		ledger.set_network(NetworkId(1337)).await;
		assert!(!session.is_current(&handle).await.unwrap());
		let err = session.rebind(&handle, &artifact).await.unwrap_err();
		assert_eq!(
			err,
			PollError::Ledger(LedgerError::NoDeploymentForNetwork(NetworkId(1337)))
		);
		assert_eq!(session.sync_phase().await, SyncPhase::Stopped);

		// Back on the deployed network, but the node cannot answer reads yet.
		ledger.set_network(NETWORK).await;
		ledger.set_queries_failing(true);
		session.rebind(&handle, &artifact).await.unwrap();
		tokio::time::sleep(TICK * 2).await;

		assert_eq!(session.snapshot(), PollState::default());
		assert_eq!(session.sync_phase().await, SyncPhase::Loading);
		assert!(old_view.borrow().has_voted);

		ledger.set_queries_failing(false);
		wait_for(&session, SyncPhase::Stopped).await;
		let state = session.snapshot();
		assert!(state.has_voted);
	}

	#[tokio::test(start_paused = true)]
	async fn test_create_on_closed_poll_resumes_vote_watch() {
		let (ledger, identities) = memory_ledger();
		let session =
			PollSession::connect(&handle_for(&ledger), &poll_artifact(), TICK, EventBus::default())
				.await
				.unwrap();
		wait_for(&session, SyncPhase::Closed).await;

		session.submit_create("New?").await.unwrap();
		wait_for(&session, SyncPhase::Watching).await;

		// The vote arrives from another window of the same account.
		ledger.cast_vote(identities[0], VoteChoice::Yes).await.unwrap();
		wait_for(&session, SyncPhase::Stopped).await;

		let state = session.snapshot();
		assert_eq!(state.question, "New?");
		assert!(state.is_open());
		assert!(state.has_voted);
	}

	#[tokio::test(start_paused = true)]
	async fn test_failed_create_leaves_closed_poll_unwatched() {
		let (ledger, _) = memory_ledger();
		let session =
			PollSession::connect(&handle_for(&ledger), &poll_artifact(), TICK, EventBus::default())
				.await
				.unwrap();
		wait_for(&session, SyncPhase::Closed).await;

		ledger.set_signatures_rejected(true);
		assert!(session.submit_create("New?").await.is_err());

		let calls = ledger.call_count();
		tokio::time::sleep(TICK * 3).await;
		assert_eq!(session.sync_phase().await, SyncPhase::Closed);
		assert_eq!(ledger.call_count(), calls);
	}
}
