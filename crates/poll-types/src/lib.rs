//! Common types for the binary poll client.
//!
//! This crate defines the value types shared by every other crate in the
//! workspace: signing identities and network identifiers, the static contract
//! artifact, the locally known poll state with its partial reads and
//! transaction outcomes, and the events published while the client runs.

/// Static contract artifact (interface plus per-network deployments).
pub mod artifact;
/// Events published on the client event bus.
pub mod events;
/// Account and network identifiers.
pub mod identity;
/// Poll state, partial reads and pending operations.
pub mod state;

pub use artifact::*;
pub use events::*;
pub use identity::*;
pub use state::*;

/// Shortens a hex identifier for log output, keeping the `0x` prefix and the
/// first and last four characters.
pub fn truncate_id(id: &str) -> String {
	let body = id.strip_prefix("0x").unwrap_or(id);
	if body.len() <= 12 {
		return id.to_string();
	}
	format!("0x{}..{}", &body[..4], &body[body.len() - 4..])
}
