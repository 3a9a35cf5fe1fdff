//! Alloy-based EVM ledger implementation.
//!
//! Talks JSON-RPC over HTTP to a node. Signing identities come either from a
//! locally configured private key or, when none is configured, from the
//! node's own unlocked accounts (the Ganache / Truffle development setup).

use crate::{IdentityProvider, LedgerClient, LedgerError, LedgerHandle};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes};
use alloy_provider::{DynProvider, PendingTransactionError, Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_transport::TransportError;
use async_trait::async_trait;
use poll_types::{truncate_id, NetworkId, SigningIdentity, TransactionConfirmation};
use std::sync::Arc;

/// Registry name of this implementation.
pub const NAME: &str = "alloy";

/// EIP-1193 "user rejected request".
const USER_REJECTED_CODE: i64 = 4001;
/// Geth-style "execution reverted" error code.
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Ledger access through an Alloy HTTP provider.
pub struct AlloyLedger {
	provider: DynProvider,
	/// Address of the locally held key, if one is configured.
	local_identity: Option<SigningIdentity>,
}

impl AlloyLedger {
	/// Creates a ledger connection for the given RPC endpoint.
	///
	/// With a signer, transactions are signed locally and sent raw. Without
	/// one, the node signs with its own accounts (`eth_sendTransaction`).
	pub fn new(rpc_url: &str, signer: Option<PrivateKeySigner>) -> Result<Self, LedgerError> {
		let url = rpc_url
			.parse()
			.map_err(|e| LedgerError::Config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;

		let local_identity = signer
			.as_ref()
			.map(|signer| SigningIdentity(signer.address()));

		let provider = match signer {
			Some(signer) => ProviderBuilder::new()
				.wallet(EthereumWallet::from(signer))
				.connect_http(url)
				.erased(),
			None => ProviderBuilder::new().connect_http(url).erased(),
		};

		Ok(Self {
			provider,
			local_identity,
		})
	}

	async fn node_accounts(&self) -> Result<Vec<SigningIdentity>, TransportError> {
		let accounts = self.provider.get_accounts().await?;
		Ok(accounts.into_iter().map(SigningIdentity).collect())
	}
}

#[async_trait]
impl IdentityProvider for AlloyLedger {
	async fn request_access(&self) -> Result<(), LedgerError> {
		match self.local_identity {
			Some(_) => {
				// A local key needs no authorization, only a reachable node.
				self.provider
					.get_chain_id()
					.await
					.map(|_| ())
					.map_err(|e| LedgerError::ConnectionDenied(format!("Node unreachable: {}", e)))
			},
			None => {
				let accounts = self
					.node_accounts()
					.await
					.map_err(|e| LedgerError::ConnectionDenied(e.to_string()))?;
				if accounts.is_empty() {
					return Err(LedgerError::ConnectionDenied(
						"Node exposes no accounts".to_string(),
					));
				}
				Ok(())
			},
		}
	}

	async fn list_identities(&self) -> Result<Vec<SigningIdentity>, LedgerError> {
		match self.local_identity {
			Some(identity) => Ok(vec![identity]),
			None => self
				.node_accounts()
				.await
				.map_err(|e| LedgerError::QueryFailed(format!("Failed to list accounts: {}", e))),
		}
	}

	async fn current_network(&self) -> Result<NetworkId, LedgerError> {
		self.provider
			.get_net_version()
			.await
			.map(NetworkId)
			.map_err(|e| LedgerError::QueryFailed(format!("Failed to get network id: {}", e)))
	}
}

#[async_trait]
impl LedgerClient for AlloyLedger {
	async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
		let request = TransactionRequest::default().to(to).input(data.into());

		self.provider
			.call(request)
			.await
			.map_err(|e| LedgerError::QueryFailed(format!("Contract call failed: {}", e)))
	}

	async fn send(
		&self,
		to: Address,
		data: Bytes,
		from: SigningIdentity,
	) -> Result<TransactionConfirmation, LedgerError> {
		let request = TransactionRequest::default()
			.from(from.address())
			.to(to)
			.input(data.into());

		let pending = self
			.provider
			.send_transaction(request)
			.await
			.map_err(classify_transport_error)?;

		let tx_hash = *pending.tx_hash();
		tracing::debug!(
			tx_hash = %truncate_id(&tx_hash.to_string()),
			"Transaction submitted, waiting for receipt"
		);

		let receipt = pending.get_receipt().await.map_err(|e| match e {
			PendingTransactionError::TransportError(e) => classify_transport_error(e),
			other => LedgerError::QueryFailed(format!("Failed to confirm transaction: {}", other)),
		})?;

		if !receipt.status() {
			return Err(LedgerError::TransactionReverted(format!(
				"transaction {} reverted in block {}",
				receipt.transaction_hash,
				receipt
					.block_number
					.map(|n| n.to_string())
					.unwrap_or_else(|| "unknown".to_string())
			)));
		}

		Ok(TransactionConfirmation {
			tx_hash: receipt.transaction_hash,
			block_number: receipt.block_number,
		})
	}
}

/// Maps a JSON-RPC failure on the write path to the client's error kinds.
fn classify_transport_error(error: TransportError) -> LedgerError {
	match &error {
		TransportError::ErrorResp(payload) => {
			if payload.code == USER_REJECTED_CODE {
				return LedgerError::TransactionRejected(payload.message.to_string());
			}
			if let Some(reason) = payload
				.as_revert_data()
				.and_then(|data| alloy_sol_types::decode_revert_reason(&data))
			{
				let reason = reason.strip_prefix("revert: ").unwrap_or(&reason).to_string();
				return LedgerError::TransactionReverted(reason);
			}
			if payload.code == EXECUTION_REVERTED_CODE || is_revert_message(&payload.message) {
				return LedgerError::TransactionReverted(payload.message.to_string());
			}
			LedgerError::QueryFailed(error.to_string())
		},
		_ => LedgerError::QueryFailed(error.to_string()),
	}
}

fn is_revert_message(message: &str) -> bool {
	let message = message.to_ascii_lowercase();
	message.contains("revert") || message.contains("vm exception")
}

/// Factory function for the alloy ledger.
///
/// Configuration parameters:
/// - `rpc_url`: HTTP JSON-RPC endpoint (required)
/// - `private_key`: hex private key; when absent the node's accounts are used
pub fn create_ledger(config: &toml::Value) -> Result<LedgerHandle, LedgerError> {
	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| LedgerError::Config("rpc_url is required".to_string()))?;

	let signer = match config.get("private_key").and_then(|v| v.as_str()) {
		Some(key) => Some(parse_private_key(key)?),
		None => None,
	};

	let ledger = Arc::new(AlloyLedger::new(rpc_url, signer)?);
	Ok(LedgerHandle::new(ledger.clone(), ledger))
}

fn parse_private_key(key: &str) -> Result<PrivateKeySigner, LedgerError> {
	let stripped = key.strip_prefix("0x").unwrap_or(key);
	if stripped.len() != 64 || hex::decode(stripped).is_err() {
		return Err(LedgerError::Config(
			"private_key must be 64 hex characters (32 bytes)".to_string(),
		));
	}

	stripped
		.parse::<PrivateKeySigner>()
		.map_err(|e| LedgerError::Config(format!("Invalid private key: {}", e)))
}
