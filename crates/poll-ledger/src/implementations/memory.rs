//! In-memory ledger implementation.
//!
//! Simulates a single deployed Poll contract inside the process: the open
//! flag, the question, both counters and the set of identities that voted.
//! Contract preconditions are enforced as reverts, so callers see the same
//! error kinds they would get from a node.
//!
//! Nothing is persisted. It is meant for tests and offline smoke runs.

use crate::contract::IPoll;
use crate::{IdentityProvider, LedgerClient, LedgerError, LedgerHandle};
use alloy_primitives::{keccak256, Address, Bytes, U256};
use alloy_sol_types::{SolInterface, SolValue};
use async_trait::async_trait;
use poll_types::{NetworkId, SigningIdentity, TransactionConfirmation, VoteChoice};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry name of this implementation.
pub const NAME: &str = "memory";

/// Network id used when none is configured (Ganache's default).
pub const DEFAULT_NETWORK_ID: u64 = 5777;

#[derive(Debug, Default)]
struct PollContract {
	open: bool,
	question: String,
	yes_votes: u64,
	no_votes: u64,
	voters: HashSet<Address>,
}

/// In-process stand-in for a node hosting the Poll contract.
pub struct MemoryLedger {
	network: RwLock<NetworkId>,
	identities: Vec<SigningIdentity>,
	contract: RwLock<PollContract>,
	deny_access: AtomicBool,
	fail_queries: AtomicBool,
	reject_signatures: AtomicBool,
	calls: AtomicUsize,
	sends: AtomicUsize,
	block_number: AtomicU64,
}

impl MemoryLedger {
	pub fn new(network: NetworkId, identities: Vec<SigningIdentity>) -> Self {
		Self {
			network: RwLock::new(network),
			identities,
			contract: RwLock::new(PollContract::default()),
			deny_access: AtomicBool::new(false),
			fail_queries: AtomicBool::new(false),
			reject_signatures: AtomicBool::new(false),
			calls: AtomicUsize::new(0),
			sends: AtomicUsize::new(0),
			block_number: AtomicU64::new(0),
		}
	}

	/// Makes `request_access` fail as if the user closed the wallet prompt.
	pub fn set_access_denied(&self, denied: bool) {
		self.deny_access.store(denied, Ordering::SeqCst);
	}

	/// Makes every read fail with `QueryFailed`.
	pub fn set_queries_failing(&self, failing: bool) {
		self.fail_queries.store(failing, Ordering::SeqCst);
	}

	/// Makes every send fail as if the user declined to sign.
	pub fn set_signatures_rejected(&self, rejected: bool) {
		self.reject_signatures.store(rejected, Ordering::SeqCst);
	}

	/// Switches the network the ledger reports.
	pub async fn set_network(&self, network: NetworkId) {
		*self.network.write().await = network;
	}

	/// Opens a poll directly, bypassing any client.
	pub async fn open_poll(&self, question: &str) {
		let mut contract = self.contract.write().await;
		*contract = PollContract {
			open: true,
			question: question.to_string(),
			..Default::default()
		};
	}

	/// Closes the poll directly, bypassing any client.
	pub async fn close_poll(&self) {
		self.contract.write().await.open = false;
	}

	/// Records a vote from any identity, bypassing signing.
	pub async fn cast_vote(
		&self,
		voter: SigningIdentity,
		choice: VoteChoice,
	) -> Result<(), LedgerError> {
		let mut contract = self.contract.write().await;
		Self::apply_vote(&mut contract, voter.address(), choice)
	}

	/// Number of read calls served so far.
	pub fn call_count(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Number of transactions submitted so far, including failed ones.
	pub fn send_count(&self) -> usize {
		self.sends.load(Ordering::SeqCst)
	}

	fn apply_vote(
		contract: &mut PollContract,
		voter: Address,
		choice: VoteChoice,
	) -> Result<(), LedgerError> {
		if !contract.open {
			return Err(LedgerError::TransactionReverted(
				"Poll is not open".to_string(),
			));
		}
		if !contract.voters.insert(voter) {
			return Err(LedgerError::TransactionReverted(
				"Already voted".to_string(),
			));
		}
		match choice {
			VoteChoice::Yes => contract.yes_votes += 1,
			VoteChoice::No => contract.no_votes += 1,
		}
		Ok(())
	}

	fn decode(data: &[u8]) -> Result<IPoll::IPollCalls, String> {
		IPoll::IPollCalls::abi_decode(data).map_err(|e| format!("Unknown poll call: {}", e))
	}
}

#[async_trait]
impl IdentityProvider for MemoryLedger {
	async fn request_access(&self) -> Result<(), LedgerError> {
		if self.deny_access.load(Ordering::SeqCst) {
			return Err(LedgerError::ConnectionDenied(
				"User rejected the request".to_string(),
			));
		}
		Ok(())
	}

	async fn list_identities(&self) -> Result<Vec<SigningIdentity>, LedgerError> {
		Ok(self.identities.clone())
	}

	async fn current_network(&self) -> Result<NetworkId, LedgerError> {
		Ok(*self.network.read().await)
	}
}

#[async_trait]
impl LedgerClient for MemoryLedger {
	async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
		self.calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_queries.load(Ordering::SeqCst) {
			return Err(LedgerError::QueryFailed("connection refused".to_string()));
		}

		let contract = self.contract.read().await;
		let output = match Self::decode(&data).map_err(LedgerError::QueryFailed)? {
			IPoll::IPollCalls::pollOpen(_) => (contract.open,).abi_encode_params(),
			IPoll::IPollCalls::question(_) => (contract.question.clone(),).abi_encode_params(),
			IPoll::IPollCalls::yesVotes(_) => (U256::from(contract.yes_votes),).abi_encode_params(),
			IPoll::IPollCalls::noVotes(_) => (U256::from(contract.no_votes),).abi_encode_params(),
			IPoll::IPollCalls::hasVoted(call) => {
				(contract.voters.contains(&call.voter),).abi_encode_params()
			},
			_ => {
				return Err(LedgerError::QueryFailed(
					"State-changing function called as a query".to_string(),
				))
			},
		};

		Ok(output.into())
	}

	async fn send(
		&self,
		_to: Address,
		data: Bytes,
		from: SigningIdentity,
	) -> Result<TransactionConfirmation, LedgerError> {
		let nonce = self.sends.fetch_add(1, Ordering::SeqCst);
		if self.reject_signatures.load(Ordering::SeqCst) {
			return Err(LedgerError::TransactionRejected(
				"User denied transaction signature".to_string(),
			));
		}

		let call = Self::decode(&data).map_err(LedgerError::TransactionReverted)?;
		{
			let mut contract = self.contract.write().await;
			match call {
				IPoll::IPollCalls::createPoll(call) => {
					if contract.open {
						return Err(LedgerError::TransactionReverted(
							"Poll already open".to_string(),
						));
					}
					*contract = PollContract {
						open: true,
						question: call.question,
						..Default::default()
					};
				},
				IPoll::IPollCalls::voteYes(_) => {
					Self::apply_vote(&mut contract, from.address(), VoteChoice::Yes)?
				},
				IPoll::IPollCalls::voteNo(_) => {
					Self::apply_vote(&mut contract, from.address(), VoteChoice::No)?
				},
				_ => {
					return Err(LedgerError::TransactionReverted(
						"View function sent as a transaction".to_string(),
					))
				},
			}
		}

		let block_number = self.block_number.fetch_add(1, Ordering::SeqCst) + 1;
		let tx_hash = keccak256([from.address().as_slice(), &nonce.to_be_bytes()[..]].concat());

		Ok(TransactionConfirmation {
			tx_hash,
			block_number: Some(block_number),
		})
	}
}

/// Deterministic development identities: 0x..01, 0x..02, ...
pub fn dev_identities(count: u8) -> Vec<SigningIdentity> {
	(1..=count)
		.map(|i| SigningIdentity(Address::with_last_byte(i)))
		.collect()
}

/// Factory function for the memory ledger.
///
/// Configuration parameters:
/// - `network_id`: network the ledger reports (default 5777)
/// - `accounts`: number of development identities to expose (default 1)
pub fn create_ledger(config: &toml::Value) -> Result<LedgerHandle, LedgerError> {
	let network_id = match config.get("network_id") {
		Some(value) => value
			.as_integer()
			.and_then(|id| u64::try_from(id).ok())
			.ok_or_else(|| LedgerError::Config("network_id must be a positive integer".into()))?,
		None => DEFAULT_NETWORK_ID,
	};

	let accounts = match config.get("accounts") {
		Some(value) => value
			.as_integer()
			.and_then(|n| u8::try_from(n).ok())
			.filter(|n| *n > 0)
			.ok_or_else(|| LedgerError::Config("accounts must be between 1 and 255".into()))?,
		None => 1,
	};

	let ledger = Arc::new(MemoryLedger::new(
		NetworkId(network_id),
		dev_identities(accounts),
	));
	Ok(LedgerHandle::new(ledger.clone(), ledger))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ContractBinding;

	fn setup() -> (Arc<MemoryLedger>, ContractBinding, Vec<SigningIdentity>) {
		let identities = dev_identities(2);
		let ledger = Arc::new(MemoryLedger::new(
			NetworkId(DEFAULT_NETWORK_ID),
			identities.clone(),
		));
		let binding = ContractBinding::new(
			Address::repeat_byte(0x42),
			NetworkId(DEFAULT_NETWORK_ID),
			ledger.clone(),
		);
		(ledger, binding, identities)
	}

	#[tokio::test]
	async fn test_create_then_vote_round_trip() {
		let (_ledger, binding, identities) = setup();
		let alice = identities[0];

		binding.create_poll("Tabs or spaces?", alice).await.unwrap();
		assert!(binding.is_open().await.unwrap());
		assert_eq!(binding.question().await.unwrap(), "Tabs or spaces?");

		binding.vote_yes(alice).await.unwrap();
		assert_eq!(binding.yes_votes().await.unwrap(), 1);
		assert_eq!(binding.no_votes().await.unwrap(), 0);
		assert!(binding.has_voted(alice).await.unwrap());
		assert!(!binding.has_voted(identities[1]).await.unwrap());
	}

	#[tokio::test]
	async fn test_double_vote_reverts() {
		let (ledger, binding, identities) = setup();
		ledger.open_poll("Ship it?").await;

		binding.vote_no(identities[0]).await.unwrap();
		let err = binding.vote_yes(identities[0]).await.unwrap_err();

		assert_eq!(
			err,
			LedgerError::TransactionReverted("Already voted".to_string())
		);
		assert_eq!(binding.no_votes().await.unwrap(), 1);
		assert_eq!(binding.yes_votes().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_vote_on_closed_poll_reverts() {
		let (_ledger, binding, identities) = setup();
		let err = binding.vote_yes(identities[0]).await.unwrap_err();
		assert_eq!(
			err,
			LedgerError::TransactionReverted("Poll is not open".to_string())
		);
	}

	#[tokio::test]
	async fn test_failure_switches() {
		let (ledger, binding, identities) = setup();
		ledger.open_poll("Ship it?").await;

		ledger.set_queries_failing(true);
		assert!(matches!(
			binding.is_open().await,
			Err(LedgerError::QueryFailed(_))
		));

		ledger.set_signatures_rejected(true);
		assert!(matches!(
			binding.vote_yes(identities[0]).await,
			Err(LedgerError::TransactionRejected(_))
		));
		assert_eq!(ledger.send_count(), 1);
		assert_eq!(ledger.call_count(), 1);
	}

	#[tokio::test]
	async fn test_confirmations_are_distinct() {
		let (ledger, binding, identities) = setup();
		ledger.open_poll("Ship it?").await;

		let first = binding.vote_yes(identities[0]).await.unwrap();
		let second = binding.vote_no(identities[1]).await.unwrap();

		assert_ne!(first.tx_hash, second.tx_hash);
		assert_eq!(first.block_number, Some(1));
		assert_eq!(second.block_number, Some(2));
	}

	#[test]
	fn test_create_ledger_config() {
		let config: toml::Value = toml::from_str("network_id = 1337\naccounts = 3").unwrap();
		assert!(create_ledger(&config).is_ok());

		let config: toml::Value = toml::from_str("accounts = 0").unwrap();
		assert!(matches!(
			create_ledger(&config).err().unwrap(),
			LedgerError::Config(_)
		));
	}
}
