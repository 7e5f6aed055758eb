//! Concrete collaborator implementations bundled with the gateway.
//!
//! The production deployment wires the main application's stores in through
//! the `domain` traits; what lives here is the HMAC token verifier and the
//! in-memory stores used by the bundled binary and the tests.

pub mod auth;
pub mod store;

pub use auth::HmacTokenVerifier;
pub use store::{InMemoryChatStore, InMemoryTeamDirectory, InMemoryUserDirectory};
