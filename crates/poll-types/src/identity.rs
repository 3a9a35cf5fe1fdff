//! Account and network identifiers.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One ledger account able to authorize state-changing requests.
///
/// Identities are handed out by the identity provider and never change for
/// the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigningIdentity(pub Address);

impl SigningIdentity {
	pub fn address(&self) -> Address {
		self.0
	}
}

impl From<Address> for SigningIdentity {
	fn from(address: Address) -> Self {
		Self(address)
	}
}

impl fmt::Display for SigningIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Identifier of the ledger network the client is connected to.
///
/// This is the node's `net_version`, which is also the key used by the
/// artifact's deployment map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub u64);

impl fmt::Display for NetworkId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl From<u64> for NetworkId {
	fn from(id: u64) -> Self {
		Self(id)
	}
}

impl FromStr for NetworkId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.trim().parse::<u64>().map(NetworkId)
	}
}
