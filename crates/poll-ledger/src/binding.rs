//! Typed handle to one deployed poll contract.

use crate::contract::IPoll;
use crate::{LedgerClient, LedgerError};
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use poll_types::{
	truncate_id, NetworkId, PollRead, SigningIdentity, TransactionConfirmation, VoteChoice,
};
use std::fmt;
use std::sync::Arc;

/// Handle to the poll contract deployed at one address on one network.
///
/// Reads are pure queries against the latest confirmed state and may be issued
/// concurrently. Writes return only once the transaction is mined. Both always
/// target the address resolved when the binding was created.
#[derive(Clone)]
pub struct ContractBinding {
	address: Address,
	network: NetworkId,
	client: Arc<dyn LedgerClient>,
}

impl fmt::Debug for ContractBinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ContractBinding")
			.field("address", &self.address)
			.field("network", &self.network)
			.field("client", &"<dyn LedgerClient>")
			.finish()
	}
}

impl ContractBinding {
	pub fn new(address: Address, network: NetworkId, client: Arc<dyn LedgerClient>) -> Self {
		Self {
			address,
			network,
			client,
		}
	}

	/// Address of the bound deployment.
	pub fn address(&self) -> Address {
		self.address
	}

	/// Network the deployment lives on.
	pub fn network(&self) -> NetworkId {
		self.network
	}

	async fn query<C: SolCall>(&self, call: C) -> Result<C::Return, LedgerError> {
		let data = call.abi_encode();
		let output = self.client.call(self.address, data.into()).await?;

		C::abi_decode_returns(&output).map_err(|e| {
			LedgerError::QueryFailed(format!("Failed to decode {} result: {}", C::SIGNATURE, e))
		})
	}

	async fn transact<C: SolCall>(
		&self,
		call: C,
		from: SigningIdentity,
	) -> Result<TransactionConfirmation, LedgerError> {
		let data = call.abi_encode();

		tracing::debug!(
			contract = %truncate_id(&self.address.to_string()),
			from = %truncate_id(&from.to_string()),
			method = C::SIGNATURE,
			"Submitting poll transaction"
		);

		let confirmation = self.client.send(self.address, data.into(), from).await?;

		tracing::debug!(
			method = C::SIGNATURE,
			tx_hash = %truncate_id(&confirmation.tx_hash.to_string()),
			block_number = ?confirmation.block_number,
			"Poll transaction mined"
		);

		Ok(confirmation)
	}

	pub async fn is_open(&self) -> Result<bool, LedgerError> {
		self.query(IPoll::pollOpenCall {}).await
	}

	pub async fn question(&self) -> Result<String, LedgerError> {
		self.query(IPoll::questionCall {}).await
	}

	pub async fn yes_votes(&self) -> Result<u64, LedgerError> {
		self.query(IPoll::yesVotesCall {}).await.map(saturating_u64)
	}

	pub async fn no_votes(&self) -> Result<u64, LedgerError> {
		self.query(IPoll::noVotesCall {}).await.map(saturating_u64)
	}

	pub async fn has_voted(&self, identity: SigningIdentity) -> Result<bool, LedgerError> {
		self.query(IPoll::hasVotedCall {
			voter: identity.address(),
		})
		.await
	}

	/// Reads every poll field concurrently.
	///
	/// Fields whose read failed are left `None`, so a transport failure is
	/// never mistaken for "closed" or "not voted". `has_voted` is only read
	/// when an identity is given.
	pub async fn read_all(&self, identity: Option<SigningIdentity>) -> PollRead {
		let has_voted = async {
			match identity {
				Some(identity) => Some(self.has_voted(identity).await),
				None => None,
			}
		};

		let (is_open, question, yes_votes, no_votes, has_voted) = tokio::join!(
			self.is_open(),
			self.question(),
			self.yes_votes(),
			self.no_votes(),
			has_voted,
		);

		PollRead {
			is_open: self.ok_or_log("pollOpen", is_open),
			question: self.ok_or_log("question", question),
			yes_votes: self.ok_or_log("yesVotes", yes_votes),
			no_votes: self.ok_or_log("noVotes", no_votes),
			has_voted: has_voted.and_then(|result| self.ok_or_log("hasVoted", result)),
		}
	}

	fn ok_or_log<T>(&self, field: &str, result: Result<T, LedgerError>) -> Option<T> {
		match result {
			Ok(value) => Some(value),
			Err(e) => {
				tracing::warn!(
					network = %self.network,
					field = field,
					error = %e,
					"Poll read failed"
				);
				None
			},
		}
	}

	pub async fn create_poll(
		&self,
		question: &str,
		from: SigningIdentity,
	) -> Result<TransactionConfirmation, LedgerError> {
		self.transact(
			IPoll::createPollCall {
				question: question.to_string(),
			},
			from,
		)
		.await
	}

	pub async fn vote_yes(
		&self,
		from: SigningIdentity,
	) -> Result<TransactionConfirmation, LedgerError> {
		self.transact(IPoll::voteYesCall {}, from).await
	}

	pub async fn vote_no(&self, from: SigningIdentity) -> Result<TransactionConfirmation, LedgerError> {
		self.transact(IPoll::voteNoCall {}, from).await
	}

	pub async fn vote(
		&self,
		choice: VoteChoice,
		from: SigningIdentity,
	) -> Result<TransactionConfirmation, LedgerError> {
		match choice {
			VoteChoice::Yes => self.vote_yes(from).await,
			VoteChoice::No => self.vote_no(from).await,
		}
	}
}

fn saturating_u64(value: U256) -> u64 {
	value.saturating_to::<u64>()
}
