//! Poll state as known locally, and the partial reads that update it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two answers a binary poll accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
	Yes,
	No,
}

impl From<bool> for VoteChoice {
	fn from(yes: bool) -> Self {
		if yes {
			VoteChoice::Yes
		} else {
			VoteChoice::No
		}
	}
}

impl fmt::Display for VoteChoice {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			VoteChoice::Yes => write!(f, "yes"),
			VoteChoice::No => write!(f, "no"),
		}
	}
}

impl FromStr for VoteChoice {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"yes" | "y" | "true" => Ok(VoteChoice::Yes),
			"no" | "n" | "false" => Ok(VoteChoice::No),
			other => Err(format!("Invalid vote choice '{}', expected yes or no", other)),
		}
	}
}

/// Whether the poll accepts votes.
///
/// `Unknown` means no confirmed read has arrived yet; it is never treated as
/// closed. `Closed` is terminal for reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollPhase {
	#[default]
	Unknown,
	Open,
	Closed,
}

/// The write this client currently has in flight, if any.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingOp {
	#[default]
	None,
	Creating,
	Voting(VoteChoice),
}

impl PendingOp {
	pub fn is_none(&self) -> bool {
		matches!(self, PendingOp::None)
	}
}

/// Locally known state of the bound poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollState {
	pub question: String,
	pub phase: PollPhase,
	pub yes_votes: u64,
	pub no_votes: u64,
	/// Whether the active identity has voted in the current round.
	pub has_voted: bool,
	pub pending: PendingOp,
	/// Poll instance generation; bumped when this client's `createPoll`
	/// confirms.
	pub round: u64,
}

impl PollState {
	pub fn is_open(&self) -> bool {
		self.phase == PollPhase::Open
	}

	pub fn is_pending(&self) -> bool {
		!self.pending.is_none()
	}

	pub fn total_votes(&self) -> u64 {
		self.yes_votes.saturating_add(self.no_votes)
	}

	/// True when a vote from the active identity could be accepted.
	pub fn can_vote(&self) -> bool {
		self.is_open() && !self.has_voted && !self.is_pending()
	}
}

/// A partial snapshot of confirmed ledger state.
///
/// Each field is `None` when it was not read or the read failed. `None` is
/// "unknown", never "false".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollRead {
	pub is_open: Option<bool>,
	pub question: Option<String>,
	pub yes_votes: Option<u64>,
	pub no_votes: Option<u64>,
	pub has_voted: Option<bool>,
}

impl PollRead {
	pub fn is_empty(&self) -> bool {
		self.is_open.is_none()
			&& self.question.is_none()
			&& self.yes_votes.is_none()
			&& self.no_votes.is_none()
			&& self.has_voted.is_none()
	}
}

/// How a pending write ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
	/// `createPoll` confirmed with the given question.
	Created { question: String },
	/// A vote confirmed.
	Voted(VoteChoice),
	/// The write was rejected, reverted or lost; confirmed state is unchanged.
	Failed,
}
