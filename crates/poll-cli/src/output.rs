//! Terminal output for the poll client.
//!
//! Renders the same information the poll page shows: the question, both
//! counts, whether the poll is open and whether this account already voted.

use colored::Colorize;
use poll_core::PollError;
use poll_ledger::LedgerError;
use poll_types::{
	truncate_id, PendingOp, PollPhase, PollState, TransactionConfirmation, VoteChoice,
};

pub struct Display;

impl Display {
	pub fn header(text: &str) {
		println!("\n{}", text.bold().cyan());
		println!("{}", "─".repeat(text.chars().count()).cyan());
	}

	pub fn success(message: &str) {
		println!("{} {}", "✓".green().bold(), message);
	}

	/// Errors go to stderr.
	pub fn error(message: &str) {
		eprintln!("{} {}", "✗".red().bold(), message.red());
	}

	pub fn warning(message: &str) {
		println!("{} {}", "⚠".yellow().bold(), message.yellow());
	}

	pub fn info(message: &str) {
		println!("{} {}", "ℹ".blue().bold(), message);
	}

	pub fn kv(key: &str, value: &str) {
		println!("  {} {}", format!("{}:", key).bold(), value);
	}

	pub fn poll_state(state: &PollState) {
		let title = if state.question.is_empty() {
			"(no question)"
		} else {
			state.question.as_str()
		};
		Self::header(title);

		Self::kv("Status", &phase_label(state.phase));
		Self::kv("Yes", &state.yes_votes.to_string());
		Self::kv("No", &state.no_votes.to_string());
		Self::kv("Total", &state.total_votes().to_string());
		Self::kv(
			"Your vote",
			if state.has_voted {
				"cast"
			} else {
				"not cast"
			},
		);
		if let Some(pending) = pending_label(state.pending) {
			Self::kv("Pending", pending);
		}
	}

	pub fn confirmation(what: &str, confirmation: &TransactionConfirmation) {
		let block = confirmation
			.block_number
			.map(|n| format!(" in block {}", n))
			.unwrap_or_default();
		Self::success(&format!(
			"{} confirmed ({}{})",
			what,
			truncate_id(&confirmation.tx_hash.to_string()),
			block
		));
	}
}

fn phase_label(phase: PollPhase) -> String {
	match phase {
		PollPhase::Open => "open".green().to_string(),
		PollPhase::Closed => "closed".red().to_string(),
		PollPhase::Unknown => "unknown".dimmed().to_string(),
	}
}

fn pending_label(pending: PendingOp) -> Option<&'static str> {
	match pending {
		PendingOp::None => None,
		PendingOp::Creating => Some("creating poll"),
		PendingOp::Voting(VoteChoice::Yes) => Some("voting yes"),
		PendingOp::Voting(VoteChoice::No) => Some("voting no"),
	}
}

/// User-facing message for each error kind.
pub fn describe(error: &PollError) -> String {
	match error {
		PollError::AlreadyPending => {
			"Another transaction is still pending; wait for it to finish.".to_string()
		},
		PollError::SessionClosed => "The poll session was closed.".to_string(),
		PollError::Ledger(e) => match e {
			LedgerError::ConnectionDenied(reason) => {
				format!("The wallet refused to connect ({}). Unlock it and try again.", reason)
			},
			LedgerError::NoDeploymentForNetwork(network) => format!(
				"Unsupported network {}: no poll contract is deployed there.",
				network
			),
			LedgerError::QueryFailed(reason) => {
				format!("Could not reach the ledger: {}", reason)
			},
			LedgerError::TransactionRejected(_) => {
				"The transaction was not signed. Nothing was submitted.".to_string()
			},
			LedgerError::TransactionReverted(reason) => {
				format!("The poll contract rejected the transaction: {}", reason)
			},
			LedgerError::InvalidArtifact(reason) => {
				format!("The contract artifact is not a poll contract: {}", reason)
			},
			LedgerError::NoIdentity => "The wallet exposes no accounts.".to_string(),
			LedgerError::Config(reason) => format!("Ledger configuration error: {}", reason),
		},
	}
}
