//! Read side of a session: initial load and the has-voted watch loop.
//!
//! The engine runs as one spawned task per binding:
//!
//! ```text
//! Unbound -> Loading -> Watching -> Stopped
//!                  \         \
//!                   +---------+--> Closed
//! ```
//!
//! `Loading` reads the open flag, question and both counters once. Only an
//! open poll moves on to `Watching`, which reads `hasVoted` and re-reads
//! `pollOpen` right away and then on each tick until the vote is confirmed, the poll is not open,
//! or the owner stops the engine. Failed reads are logged and count as "no new
//! information this tick".

use super::event_bus::EventBus;
use crate::state::store::PollStateStore;
use poll_ledger::{ContractBinding, LedgerError};
use poll_types::{PollEvent, PollRead, SigningIdentity, SyncStopReason};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::instrument;

/// Default interval between watch ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
	/// Created, not started.
	Unbound,
	/// Waiting for a load round that could read `pollOpen`.
	Loading,
	/// Polling the active identity's vote.
	Watching,
	/// The poll was not open; no more reads are scheduled.
	Closed,
	/// The loop ended because the vote confirmed or the owner stopped it.
	Stopped,
}

impl fmt::Display for SyncPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			SyncPhase::Unbound => "unbound",
			SyncPhase::Loading => "loading",
			SyncPhase::Watching => "watching",
			SyncPhase::Closed => "closed",
			SyncPhase::Stopped => "stopped",
		};
		f.write_str(name)
	}
}

/// Keeps the store in line with the ledger for one binding.
pub struct SyncEngine {
	binding: ContractBinding,
	identity: SigningIdentity,
	store: Arc<PollStateStore>,
	event_bus: EventBus,
	interval: Duration,
}

impl SyncEngine {
	pub fn new(
		binding: ContractBinding,
		identity: SigningIdentity,
		store: Arc<PollStateStore>,
		event_bus: EventBus,
		interval: Duration,
	) -> Self {
		Self {
			binding,
			identity,
			store,
			event_bus,
			interval,
		}
	}

	/// Spawns the engine loop and returns the handle that controls it.
	pub fn start(self) -> SyncHandle {
		let (phase_tx, phase_rx) = watch::channel(SyncPhase::Unbound);
		let (stop_tx, stop_rx) = watch::channel(false);
		let event_bus = self.event_bus.clone();

		let task = tokio::spawn(self.run(phase_tx, stop_rx));

		SyncHandle {
			task: Some(task),
			stop_tx,
			phase: phase_rx,
			event_bus,
		}
	}

	#[instrument(skip_all, fields(network = %self.binding.network(), identity = %self.identity))]
	async fn run(self, phase_tx: watch::Sender<SyncPhase>, mut stop_rx: watch::Receiver<bool>) {
		phase_tx.send_replace(SyncPhase::Loading);

		let mut interval = tokio::time::interval(self.interval);
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

		let reason = loop {
			tokio::select! {
				_ = stop_rx.changed() => break SyncStopReason::TornDown,
				_ = interval.tick() => {},
			}

			let phase = *phase_tx.borrow();
			let next = if phase == SyncPhase::Watching {
				self.watch_tick().await
			} else {
				self.load().await
			};

			match next {
				Ok(next) => {
					phase_tx.send_if_modified(|current| {
						let changed = *current != next;
						*current = next;
						changed
					});
				},
				Err(reason) => break reason,
			}
		};

		phase_tx.send_replace(match reason {
			SyncStopReason::PollNotOpen => SyncPhase::Closed,
			_ => SyncPhase::Stopped,
		});
		tracing::info!(reason = ?reason, "Poll sync stopped");
		self.event_bus
			.publish(PollEvent::SyncStopped { reason })
			.ok();
	}

	/// One read round of the poll fields. Stays in `Loading` while `pollOpen`
	/// is unknown.
	async fn load(&self) -> Result<SyncPhase, SyncStopReason> {
		let read = self.binding.read_all(None).await;
		if read.is_open.is_none() {
			tracing::warn!("Initial poll state unavailable, retrying next tick");
			return Ok(SyncPhase::Loading);
		}

		self.store.apply_read(&read);
		let state = self.store.snapshot();
		tracing::info!(
			question = %state.question,
			phase = ?state.phase,
			yes_votes = state.yes_votes,
			no_votes = state.no_votes,
			has_voted = state.has_voted,
			"Poll state loaded"
		);
		self.event_bus
			.publish(PollEvent::StateLoaded {
				state: state.clone(),
			})
			.ok();

		if !state.is_open() {
			return Err(SyncStopReason::PollNotOpen);
		}
		self.watch_tick().await
	}

	/// Re-reads the vote flag and the open flag.
	async fn watch_tick(&self) -> Result<SyncPhase, SyncStopReason> {
		let (has_voted, is_open) = tokio::join!(
			self.binding.has_voted(self.identity),
			self.binding.is_open(),
		);

		let read = PollRead {
			has_voted: ok_or_warn("hasVoted", has_voted),
			is_open: ok_or_warn("pollOpen", is_open),
			..Default::default()
		};
		if self.store.apply_read(&read) {
			tracing::debug!(read = ?read, "Applied watch read");
		}

		self.next_phase()
	}

	fn next_phase(&self) -> Result<SyncPhase, SyncStopReason> {
		let state = self.store.snapshot();
		if !state.is_open() {
			return Err(SyncStopReason::PollNotOpen);
		}
		if state.has_voted {
			return Err(SyncStopReason::Voted);
		}
		Ok(SyncPhase::Watching)
	}
}

fn ok_or_warn<T>(field: &str, result: Result<T, LedgerError>) -> Option<T> {
	match result {
		Ok(value) => Some(value),
		Err(e) => {
			tracing::warn!(field = field, error = %e, "Watch read failed");
			None
		},
	}
}

/// Owner's handle on a running sync engine.
///
/// `stop` is the cancellation point for every teardown path; dropping the
/// handle aborts the task as well.
pub struct SyncHandle {
	task: Option<JoinHandle<()>>,
	stop_tx: watch::Sender<bool>,
	phase: watch::Receiver<SyncPhase>,
	event_bus: EventBus,
}

impl SyncHandle {
	pub fn phase(&self) -> SyncPhase {
		*self.phase.borrow()
	}

	/// Receiver notified on every phase change.
	pub fn watch_phase(&self) -> watch::Receiver<SyncPhase> {
		self.phase.clone()
	}

	/// True once the loop has ended on its own or was stopped.
	pub fn is_finished(&self) -> bool {
		self.task.as_ref().map_or(true, |task| task.is_finished())
	}

	/// Stops the loop and waits until the task is gone.
	///
	/// A read in flight is dropped without being applied.
	pub async fn stop(mut self) {
		let Some(task) = self.task.take() else {
			return;
		};

		self.stop_tx.send_replace(true);
		task.abort();
		match task.await {
			Err(e) if e.is_cancelled() => {
				tracing::debug!("Poll sync task cancelled");
				self.event_bus
					.publish(PollEvent::SyncStopped {
						reason: SyncStopReason::TornDown,
					})
					.ok();
			},
			Err(e) => tracing::error!(error = %e, "Poll sync task panicked"),
			Ok(()) => {},
		}
	}
}

impl Drop for SyncHandle {
	fn drop(&mut self) {
		if let Some(task) = self.task.take() {
			task.abort();
		}
	}
}
