//! Gateway core: the stateful realtime subsystem.
//!
//! Each shared structure (connection registry, room manager, throttle gates)
//! is a single owned, internally synchronized component constructed once at
//! process start and handed to the [`Gateway`](dispatcher::Gateway) facade as
//! an explicit dependency.

mod cleanup;
mod config;
mod dispatcher;
mod event;
mod registry;
mod room;
mod throttle;

pub use cleanup::{CleanupHandle, spawn_cleanup};
pub use config::GatewayConfig;
pub use dispatcher::{ConnectionContext, Gateway};
pub use event::{
    ClientEvent, ConnectionErrorKind, Emit, MessageBroadcast, MessageErrorKind, ServerEvent,
    Target,
};
pub use registry::{ConnectionLimitExceeded, ConnectionRegistry, Registered, Unregistered};
pub use room::{RoomId, RoomManager};
pub use throttle::{ThrottleDecision, ThrottleGate};
