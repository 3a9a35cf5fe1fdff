//! Fakes shared by the unit tests of this crate.

use alloy_json_abi::JsonAbi;
use alloy_primitives::{address, Address, Bytes};
use async_trait::async_trait;
use poll_ledger::implementations::memory::{dev_identities, MemoryLedger, DEFAULT_NETWORK_ID};
use poll_ledger::{ContractBinding, LedgerClient, LedgerError};
use poll_types::{
	ContractArtifact, Deployment, NetworkId, SigningIdentity, TransactionConfirmation,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

pub(crate) const POLL: Address = address!("37504964a0cb4fe928e9498cc6f30932c9cc3e1c");
pub(crate) const NETWORK: NetworkId = NetworkId(DEFAULT_NETWORK_ID);

pub(crate) fn poll_artifact() -> ContractArtifact {
	let abi = JsonAbi::parse([
		"function pollOpen() external view returns (bool)",
		"function question() external view returns (string)",
		"function yesVotes() external view returns (uint256)",
		"function noVotes() external view returns (uint256)",
		"function hasVoted(address voter) external view returns (bool)",
		"function createPoll(string question) external",
		"function voteYes() external",
		"function voteNo() external",
	])
	.unwrap();

	let mut networks = HashMap::new();
	networks.insert(
		NETWORK,
		Deployment {
			address: POLL,
			transaction_hash: None,
		},
	);
	ContractArtifact::new(Some("Poll".to_string()), abi, networks)
}

/// A memory ledger with two development identities.
pub(crate) fn memory_ledger() -> (Arc<MemoryLedger>, Vec<SigningIdentity>) {
	let identities = dev_identities(2);
	(
		Arc::new(MemoryLedger::new(NETWORK, identities.clone())),
		identities,
	)
}

pub(crate) fn binding_for(client: Arc<dyn LedgerClient>) -> ContractBinding {
	ContractBinding::new(POLL, NETWORK, client)
}

/// Ledger client that can hold calls or sends until released.
///
/// A held operation signals `wait_entered` once it is in flight, then blocks
/// until `release` is called.
pub(crate) struct GatedClient {
	inner: Arc<MemoryLedger>,
	hold_calls: AtomicBool,
	hold_sends: AtomicBool,
	sends: AtomicUsize,
	entered: Notify,
	released: Notify,
}

impl GatedClient {
	pub(crate) fn new(inner: Arc<MemoryLedger>) -> Self {
		Self {
			inner,
			hold_calls: AtomicBool::new(false),
			hold_sends: AtomicBool::new(false),
			sends: AtomicUsize::new(0),
			entered: Notify::new(),
			released: Notify::new(),
		}
	}

	pub(crate) fn hold_calls(&self, hold: bool) {
		self.hold_calls.store(hold, Ordering::SeqCst);
	}

	pub(crate) fn hold_sends(&self, hold: bool) {
		self.hold_sends.store(hold, Ordering::SeqCst);
	}

	/// Sends started, including ones still held.
	pub(crate) fn send_count(&self) -> usize {
		self.sends.load(Ordering::SeqCst)
	}

	pub(crate) async fn wait_entered(&self) {
		self.entered.notified().await;
	}

	pub(crate) fn release(&self) {
		self.released.notify_waiters();
	}

	async fn gate(&self) {
		let released = self.released.notified();
		tokio::pin!(released);
		released.as_mut().enable();
		self.entered.notify_one();
		released.await;
	}
}

#[async_trait]
impl LedgerClient for GatedClient {
	async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
		if self.hold_calls.load(Ordering::SeqCst) {
			self.gate().await;
		}
		self.inner.call(to, data).await
	}

	async fn send(
		&self,
		to: Address,
		data: Bytes,
		from: SigningIdentity,
	) -> Result<TransactionConfirmation, LedgerError> {
		self.sends.fetch_add(1, Ordering::SeqCst);
		if self.hold_sends.load(Ordering::SeqCst) {
			self.gate().await;
		}
		self.inner.send(to, data, from).await
	}
}
