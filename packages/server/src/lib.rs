//! Realtime conversation gateway for the Roka marketplace.
//!
//! This crate is the single stateful realtime component of the platform: it
//! accepts WebSocket connections from logged-in users, tracks presence,
//! enforces per-user connection and event-rate limits, brokers conversation
//! room membership, deduplicates at-least-once message deliveries and
//! periodically garbage-collects transient state.
//!
//! Durable persistence (conversations, messages), team membership and token
//! issuance live in the main application; this crate consumes them behind the
//! collaborator traits in [`domain`].

// layers
pub mod domain;
pub mod gateway;
pub mod infrastructure;
pub mod ui;
