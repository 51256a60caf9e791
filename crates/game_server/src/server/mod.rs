//! Server construction, the inbound pipeline and the UDP loops.

pub mod builder;
pub mod core;
mod pipeline;

pub use builder::{BuilderCheckpoint, ServerBuilder};
pub use core::{GameServer, IDLE_DISCONNECT_MESSAGE};
