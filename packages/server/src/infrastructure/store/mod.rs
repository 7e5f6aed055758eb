//! In-memory collaborator store implementations.
//!
//! Used by the bundled binary and the integration tests; production wires
//! the main application's durable stores in through the same traits.

mod inmemory;

pub use inmemory::{InMemoryChatStore, InMemoryTeamDirectory, InMemoryUserDirectory};
