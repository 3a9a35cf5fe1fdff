//! Poll state management.

pub mod store;
