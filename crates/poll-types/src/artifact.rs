//! Compiled contract artifact.
//!
//! The artifact is the JSON file a Truffle-style build produces for the Poll
//! contract: the ABI plus a map from network id to deployed address. It is
//! loaded once at startup and never mutated.

use crate::NetworkId;
use alloy_json_abi::JsonAbi;
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while parsing a contract artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
	/// The artifact is not valid JSON or does not have the expected shape.
	#[error("Invalid artifact JSON: {0}")]
	Json(#[from] serde_json::Error),
	/// A key of the `networks` map is not a decimal network id.
	#[error("Invalid network id in artifact: {0}")]
	InvalidNetworkId(String),
}

/// One deployment of the contract on a network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
	/// Address of the deployed contract.
	pub address: Address,
	/// Hash of the deployment transaction, when the build recorded it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub transaction_hash: Option<B256>,
}

/// On-disk shape of the artifact, before network keys are validated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactFile {
	#[serde(default)]
	pub contract_name: Option<String>,
	pub abi: JsonAbi,
	#[serde(default)]
	pub networks: HashMap<String, Deployment>,
}

/// Static description of the poll contract: interface and deployments.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "ArtifactFile")]
pub struct ContractArtifact {
	name: Option<String>,
	abi: JsonAbi,
	networks: HashMap<NetworkId, Deployment>,
}

impl TryFrom<ArtifactFile> for ContractArtifact {
	type Error = ArtifactError;

	fn try_from(raw: ArtifactFile) -> Result<Self, Self::Error> {
		let networks = raw
			.networks
			.into_iter()
			.map(|(key, deployment)| {
				key.parse::<NetworkId>()
					.map(|id| (id, deployment))
					.map_err(|_| ArtifactError::InvalidNetworkId(key))
			})
			.collect::<Result<HashMap<_, _>, _>>()?;

		Ok(Self {
			name: raw.contract_name,
			abi: raw.abi,
			networks,
		})
	}
}

impl ContractArtifact {
	/// Builds an artifact from its parts.
	pub fn new(name: Option<String>, abi: JsonAbi, networks: HashMap<NetworkId, Deployment>) -> Self {
		Self {
			name,
			abi,
			networks,
		}
	}

	/// Parses an artifact from its JSON text.
	pub fn from_json_str(json: &str) -> Result<Self, ArtifactError> {
		let raw: ArtifactFile = serde_json::from_str(json)?;
		raw.try_into()
	}

	/// Contract name recorded by the build, if any.
	pub fn name(&self) -> Option<&str> {
		self.name.as_deref()
	}

	pub fn abi(&self) -> &JsonAbi {
		&self.abi
	}

	/// Returns the deployment for a network, if the contract was deployed there.
	pub fn deployment(&self, network: NetworkId) -> Option<&Deployment> {
		self.networks.get(&network)
	}

	/// Network ids with a recorded deployment, sorted ascending.
	pub fn networks(&self) -> Vec<NetworkId> {
		let mut ids: Vec<NetworkId> = self.networks.keys().copied().collect();
		ids.sort();
		ids
	}

	/// Returns true if the ABI declares a function with the given name.
	pub fn has_function(&self, name: &str) -> bool {
		self.abi.function(name).is_some_and(|overloads| !overloads.is_empty())
	}

	/// Returns the names from `required` that the ABI does not declare.
	pub fn missing_functions<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
		required
			.iter()
			.copied()
			.filter(|name| !self.has_function(name))
			.collect()
	}
}
