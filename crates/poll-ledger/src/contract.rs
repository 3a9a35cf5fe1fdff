//! Solidity interface of the Poll contract.
//!
//! Calldata for every read and write is encoded from this interface. The
//! artifact's ABI is only used to check that the deployed contract actually
//! exposes these functions.

use alloy_sol_types::sol;

sol! {
	/// Binary yes/no poll.
	interface IPoll {
		function pollOpen() external view returns (bool);
		function question() external view returns (string);
		function yesVotes() external view returns (uint256);
		function noVotes() external view returns (uint256);
		function hasVoted(address voter) external view returns (bool);

		function createPoll(string question) external;
		function voteYes() external;
		function voteNo() external;
	}
}

/// Functions a contract artifact must declare to be bindable.
pub const REQUIRED_FUNCTIONS: &[&str] = &[
	"pollOpen",
	"question",
	"yesVotes",
	"noVotes",
	"hasVoted",
	"createPoll",
	"voteYes",
	"voteNo",
];

#[cfg(test)]
mod tests {
	use super::*;
	use alloy_sol_types::SolCall;

	#[test]
	fn test_selectors_match_signatures() {
		assert_eq!(IPoll::pollOpenCall::SIGNATURE, "pollOpen()");
		assert_eq!(IPoll::hasVotedCall::SIGNATURE, "hasVoted(address)");
		assert_eq!(IPoll::createPollCall::SIGNATURE, "createPoll(string)");
	}
}
