//! Entry point to the ledger: identities, network and contract binding.

use crate::contract::REQUIRED_FUNCTIONS;
use crate::{ContractBinding, IdentityProvider, LedgerClient, LedgerError};
use poll_types::{ContractArtifact, NetworkId, SigningIdentity};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Wraps an identity provider connection and a ledger client.
///
/// Access is requested from the provider at most once per session: after a
/// successful grant, further calls only list identities. A denial is not
/// remembered, so calling `request_identities` again is how the caller
/// retries.
pub struct LedgerHandle {
	identity: Arc<dyn IdentityProvider>,
	client: Arc<dyn LedgerClient>,
	access_granted: AtomicBool,
}

impl fmt::Debug for LedgerHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LedgerHandle")
			.field("access_granted", &self.access_granted.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

impl LedgerHandle {
	pub fn new(identity: Arc<dyn IdentityProvider>, client: Arc<dyn LedgerClient>) -> Self {
		Self {
			identity,
			client,
			access_granted: AtomicBool::new(false),
		}
	}

	/// Requests access if needed and returns the exposed signing identities.
	pub async fn request_identities(&self) -> Result<Vec<SigningIdentity>, LedgerError> {
		if !self.access_granted.load(Ordering::Acquire) {
			self.identity.request_access().await.map_err(|e| {
				tracing::warn!(error = %e, "Identity provider refused access");
				match e {
					LedgerError::ConnectionDenied(_) => e,
					other => LedgerError::ConnectionDenied(other.to_string()),
				}
			})?;
			self.access_granted.store(true, Ordering::Release);
			tracing::debug!("Identity provider granted access");
		}

		self.identity.list_identities().await
	}

	/// Returns the network the provider is connected to.
	pub async fn current_network(&self) -> Result<NetworkId, LedgerError> {
		self.identity.current_network().await
	}

	/// Binds to the poll contract the artifact records for `network`.
	pub fn bind(
		&self,
		artifact: &ContractArtifact,
		network: NetworkId,
	) -> Result<ContractBinding, LedgerError> {
		let missing = artifact.missing_functions(REQUIRED_FUNCTIONS);
		if !missing.is_empty() {
			return Err(LedgerError::InvalidArtifact(format!(
				"ABI is missing poll functions: {}",
				missing.join(", ")
			)));
		}

		let deployment = artifact.deployment(network).ok_or_else(|| {
			tracing::warn!(
				network = %network,
				known = ?artifact.networks(),
				"No poll deployment for network"
			);
			LedgerError::NoDeploymentForNetwork(network)
		})?;

		tracing::info!(
			network = %network,
			contract = %deployment.address,
			"Bound to poll contract"
		);

		Ok(ContractBinding::new(
			deployment.address,
			network,
			self.client.clone(),
		))
	}
}
