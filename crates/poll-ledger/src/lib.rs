//! Ledger access module for the binary poll client.
//!
//! This module defines the two capabilities the client consumes from the
//! outside world: an identity provider (accounts, authorization, network) and
//! a ledger client (read-only calls and signed, confirmed transactions). On
//! top of them it provides the `LedgerHandle`, which binds to the deployed
//! poll contract, and the typed `ContractBinding` for that deployment.

use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use poll_types::{NetworkId, SigningIdentity, TransactionConfirmation};
use thiserror::Error;

pub mod binding;
pub mod contract;
pub mod handle;

pub use binding::ContractBinding;
pub use handle::LedgerHandle;

/// Re-export implementations
pub mod implementations {
	pub mod evm {
		pub mod alloy;
	}
	pub mod memory;
}

/// Errors that can occur while talking to the identity provider or ledger.
///
/// Transport-level failures are converted into one of these kinds at the call
/// site that produced them; raw RPC errors never leave this crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
	/// The identity provider refused to expose accounts.
	#[error("Connection denied: {0}")]
	ConnectionDenied(String),
	/// The artifact has no deployment for the connected network.
	#[error("Unsupported network {0}: no poll contract deployed")]
	NoDeploymentForNetwork(NetworkId),
	/// A read or transport operation failed; the outcome is unknown.
	#[error("Query failed: {0}")]
	QueryFailed(String),
	/// The user declined to sign the transaction.
	#[error("Transaction rejected: {0}")]
	TransactionRejected(String),
	/// The ledger refused the transaction because a contract precondition failed.
	#[error("Transaction reverted: {0}")]
	TransactionReverted(String),
	/// The artifact does not describe a usable poll contract.
	#[error("Invalid contract artifact: {0}")]
	InvalidArtifact(String),
	/// The identity provider exposes no accounts.
	#[error("No signing identity available")]
	NoIdentity,
	/// The ledger implementation could not be configured.
	#[error("Configuration error: {0}")]
	Config(String),
}

/// Trait for the wallet / identity provider.
///
/// Implementations decide how accounts are obtained (local keys, node-managed
/// accounts, a browser wallet bridge). Authorization may prompt the user.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait IdentityProvider: Send + Sync {
	/// Asks the provider for permission to use its accounts.
	///
	/// Fails with `ConnectionDenied` if the user or provider refuses.
	async fn request_access(&self) -> Result<(), LedgerError>;

	/// Lists the signing identities the provider exposes, active one first.
	async fn list_identities(&self) -> Result<Vec<SigningIdentity>, LedgerError>;

	/// Returns the network the provider is currently connected to.
	async fn current_network(&self) -> Result<NetworkId, LedgerError>;
}

/// Trait for the ledger query/submit capability.
#[async_trait]
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait LedgerClient: Send + Sync {
	/// Executes a read-only call against the latest confirmed state.
	///
	/// Fails with `QueryFailed` on any transport error.
	async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError>;

	/// Signs and submits a state-changing call, returning once it is mined.
	///
	/// Fails with `TransactionRejected`, `TransactionReverted` or `QueryFailed`.
	async fn send(
		&self,
		to: Address,
		data: Bytes,
		from: SigningIdentity,
	) -> Result<TransactionConfirmation, LedgerError>;
}

/// Type alias for ledger factory functions.
///
/// Every ledger implementation provides one; it receives the implementation's
/// own TOML table from the configuration.
pub type LedgerFactory = fn(&toml::Value) -> Result<LedgerHandle, LedgerError>;

/// Get all registered ledger implementations.
///
/// Returns a vector of (name, factory) tuples for all available ledger
/// implementations.
pub fn get_all_implementations() -> Vec<(&'static str, LedgerFactory)> {
	use implementations::{evm::alloy, memory};

	vec![
		(alloy::NAME, alloy::create_ledger as LedgerFactory),
		(memory::NAME, memory::create_ledger as LedgerFactory),
	]
}

/// Builds the ledger handle for the named implementation.
pub fn create_ledger(name: &str, config: &toml::Value) -> Result<LedgerHandle, LedgerError> {
	let factory = get_all_implementations()
		.into_iter()
		.find(|(impl_name, _)| *impl_name == name)
		.map(|(_, factory)| factory)
		.ok_or_else(|| LedgerError::Config(format!("Unknown ledger implementation '{}'", name)))?;

	factory(config)
}
