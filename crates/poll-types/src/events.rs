//! Events published while a poll session runs.
//!
//! The presentation layer subscribes to these for transaction feedback; the
//! poll state itself is observed through the store's snapshot channel.

use crate::{PollState, VoteChoice};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of state-changing request a client can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
	CreatePoll,
	Vote(VoteChoice),
}

impl fmt::Display for TransactionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransactionKind::CreatePoll => write!(f, "create_poll"),
			TransactionKind::Vote(choice) => write!(f, "vote_{}", choice),
		}
	}
}

/// Proof that a submitted transaction was mined successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionConfirmation {
	pub tx_hash: B256,
	pub block_number: Option<u64>,
}

/// Why the has-voted watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStopReason {
	/// The active identity's vote is confirmed.
	Voted,
	/// The poll is not open, so there is nothing to watch.
	PollNotOpen,
	/// The owner tore the engine down.
	TornDown,
}

/// Events emitted by the sync engine and the transaction coordinator.
#[derive(Debug, Clone)]
pub enum PollEvent {
	/// The initial round of reads was applied.
	StateLoaded { state: PollState },
	/// A write was handed to the ledger and awaits confirmation.
	TransactionSubmitted { kind: TransactionKind },
	/// A write was mined.
	TransactionConfirmed {
		kind: TransactionKind,
		confirmation: TransactionConfirmation,
	},
	/// A write was rejected, reverted or lost in transport.
	TransactionFailed { kind: TransactionKind, error: String },
	/// The has-voted watch loop ended for good.
	SyncStopped { reason: SyncStopReason },
}
