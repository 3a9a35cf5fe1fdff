//! Subcommands of the `poll` binary.

use crate::output::Display;
use anyhow::{bail, Result};
use clap::Subcommand;
use poll_core::{PollSession, SyncPhase};
use poll_types::{PollEvent, PollState, SyncStopReason, VoteChoice};
use tokio::sync::broadcast::error::RecvError;

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Show the poll question, vote counts and whether you voted
	Status,
	/// Open a new poll with the given question
	Create {
		/// Question to ask
		question: String,
	},
	/// Vote on the open poll
	Vote {
		/// yes or no
		choice: VoteChoice,
	},
	/// Follow the poll until your vote is confirmed or the poll closes
	Watch,
}

pub async fn execute(command: Commands, session: &PollSession) -> Result<()> {
	match command {
		Commands::Status => {
			let state = wait_loaded(session).await?;
			Display::poll_state(&state);
		},
		Commands::Create { question } => {
			let confirmation = session.submit_create(&question).await?;
			Display::confirmation("Poll creation", &confirmation);
			Display::poll_state(&session.snapshot());
		},
		Commands::Vote { choice } => {
			let state = wait_loaded(session).await?;
			if !state.is_open() {
				bail!("The poll is not open for voting");
			}
			if state.has_voted {
				bail!("Account {} already voted in this poll", session.identity());
			}

			let confirmation = session.submit_vote(choice).await?;
			Display::confirmation(&format!("Vote '{}'", choice), &confirmation);
			Display::poll_state(&session.snapshot());
		},
		Commands::Watch => watch(session).await?,
	}
	Ok(())
}

/// Waits until the first read round has been applied.
async fn wait_loaded(session: &PollSession) -> Result<PollState> {
	if let Some(mut phase) = session.watch_sync_phase().await {
		tokio::select! {
			result = phase.wait_for(|p| !matches!(p, SyncPhase::Unbound | SyncPhase::Loading)) => {
				result.map(|_| ())?;
			}
			_ = tokio::signal::ctrl_c() => bail!("Interrupted"),
		}
	}
	Ok(session.snapshot())
}

async fn watch(session: &PollSession) -> Result<()> {
	let mut state = session.subscribe();
	let mut events = session.events();

	Display::info(&format!(
		"Watching poll {} on network {} as {}",
		session.contract_address(),
		session.network(),
		session.identity()
	));
	Display::poll_state(&state.borrow_and_update().clone());

	if matches!(session.sync_phase().await, SyncPhase::Closed | SyncPhase::Stopped) {
		return Ok(());
	}

	loop {
		tokio::select! {
			changed = state.changed() => {
				if changed.is_err() {
					break;
				}
				let snapshot = state.borrow_and_update().clone();
				Display::poll_state(&snapshot);
			}
			event = events.recv() => match event {
				Ok(PollEvent::SyncStopped { reason }) => {
					match reason {
						SyncStopReason::Voted => Display::success("Your vote is confirmed"),
						SyncStopReason::PollNotOpen => Display::warning("The poll is closed"),
						SyncStopReason::TornDown => {},
					}
					break;
				},
				Ok(_) | Err(RecvError::Lagged(_)) => {},
				Err(RecvError::Closed) => break,
			},
			_ = tokio::signal::ctrl_c() => break,
		}
	}
	Ok(())
}
