//! Handlers for user-triggered actions.

pub mod transaction;
