//! # Polaris Event System
//!
//! A typed publish/subscribe bus used by the server to announce packet and
//! connection lifecycle notifications, plus the contracts shared by plugin
//! units ([`PluginVersion`], [`PluginError`]).
//!
//! ## Event Keys
//!
//! - **Core events** (`core:<name>`): published by the server, see [`events`].
//! - **Plugin events** (`plugin:<plugin>:<name>`): plugin-to-plugin traffic.
//!
//! Every event is serialized to JSON once per emission and fanned out to all
//! handlers registered for its key. A handler that fails is logged and does
//! not affect the other handlers or the emitter.
//!
//! ```rust
//! use polaris_event_system::*;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), EventError> {
//! let events = EventSystem::new();
//! events.on_core("connection_authenticated", |event: ConnectionAuthenticatedEvent| {
//!     println!("{} authenticated as {}", event.connection_id, event.display_name);
//!     Ok(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod plugin;
pub mod system;
pub mod utils;

#[cfg(test)]
mod tests;

pub use events::*;
pub use plugin::{PluginError, PluginVersion};
pub use system::{EventSystem, EventSystemStats, HandlerSnapshot};
pub use utils::current_timestamp;
