//! Broadcast channel for session events.

use poll_types::PollEvent;
use tokio::sync::broadcast;

/// Event bus for broadcasting poll events to multiple subscribers.
///
/// The sync engine and the transaction coordinator publish here; the
/// presentation layer subscribes for transaction feedback.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<PollEvent>,
}

impl EventBus {
	/// Creates a new EventBus with the specified channel capacity.
	///
	/// Once `capacity` events are buffered, slow subscribers start missing the
	/// oldest ones.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Each subscriber receives every event published after it subscribed.
	pub fn subscribe(&self) -> broadcast::Receiver<PollEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers.
	///
	/// Returns an error if there are no active subscribers, which callers
	/// usually ignore.
	pub fn publish(&self, event: PollEvent) -> Result<(), broadcast::error::SendError<PollEvent>> {
		self.sender.send(event)?;
		Ok(())
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(64)
	}
}
