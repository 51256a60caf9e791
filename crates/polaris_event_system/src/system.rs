//! The event bus.
//!
//! Handlers are stored per event key (`core:<name>` or `plugin:<plugin>:<name>`)
//! in a [`DashMap`], so registration and emission never contend on a global
//! lock. Emission serializes the event once and runs every handler for the
//! key concurrently.

use crate::events::{Event, EventError, EventHandler, TypedEventHandler};
use compact_str::CompactString;
use dashmap::DashMap;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, trace};

/// Event system statistics.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EventSystemStats {
    pub total_handlers: usize,
    /// Emissions that reached at least one handler
    pub events_emitted: u64,
    /// Emissions for keys nobody subscribed to
    pub events_without_handlers: u64,
    pub handler_failures: u64,
}

/// Opaque record of the handlers registered at one point in time.
#[derive(Debug, Clone, Default)]
pub struct HandlerSnapshot(HashMap<CompactString, usize>);

pub struct EventSystem {
    handlers: DashMap<CompactString, Vec<Arc<dyn EventHandler>>>,
    stats: RwLock<EventSystemStats>,
}

impl std::fmt::Debug for EventSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSystem")
            .field("keys", &self.handlers.len())
            .finish()
    }
}

impl EventSystem {
    pub fn new() -> Self {
        Self {
            handlers: DashMap::new(),
            stats: RwLock::new(EventSystemStats::default()),
        }
    }

    /// Registers a handler for a core server event.
    pub async fn on_core<T, F>(&self, event_name: &str, handler: F) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let event_key = CompactString::new_inline("core:") + event_name;
        self.register_typed_handler(event_key, handler).await
    }

    /// Registers a handler for an event published by another plugin.
    pub async fn on_plugin<T, F>(
        &self,
        plugin_name: &str,
        event_name: &str,
        handler: F,
    ) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let event_key = CompactString::new_inline("plugin:") + plugin_name + ":" + event_name;
        self.register_typed_handler(event_key, handler).await
    }

    #[inline]
    pub async fn emit_core<T>(&self, event_name: &str, event: &T) -> Result<(), EventError>
    where
        T: Event,
    {
        let event_key = CompactString::new_inline("core:") + event_name;
        self.emit_event(&event_key, event).await
    }

    #[inline]
    pub async fn emit_plugin<T>(
        &self,
        plugin_name: &str,
        event_name: &str,
        event: &T,
    ) -> Result<(), EventError>
    where
        T: Event,
    {
        let event_key = CompactString::new_inline("plugin:") + plugin_name + ":" + event_name;
        self.emit_event(&event_key, event).await
    }

    pub async fn get_stats(&self) -> EventSystemStats {
        self.stats.read().await.clone()
    }

    /// Number of handlers registered under a full event key such as `core:custom_packet`.
    pub fn handler_count(&self, event_key: &str) -> usize {
        self.handlers.get(event_key).map(|entry| entry.len()).unwrap_or(0)
    }

    /// Handler count per event key, for [`EventSystem::restore_handlers`].
    pub fn handler_snapshot(&self) -> HandlerSnapshot {
        HandlerSnapshot(
            self.handlers
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().len()))
                .collect(),
        )
    }

    /// Drops every handler registered after `snapshot` was taken.
    ///
    /// Handlers are only ever appended, so truncating each key back to its
    /// recorded length removes exactly the later registrations.
    pub async fn restore_handlers(&self, snapshot: &HandlerSnapshot) {
        let mut removed = 0;
        self.handlers.retain(|key, handlers| {
            let keep = snapshot.0.get(key).copied().unwrap_or(0);
            if handlers.len() > keep {
                removed += handlers.len() - keep;
                handlers.truncate(keep);
            }
            !handlers.is_empty()
        });

        if removed > 0 {
            let mut stats = self.stats.write().await;
            stats.total_handlers = stats.total_handlers.saturating_sub(removed);
            debug!("Removed {} handler(s) registered since the snapshot", removed);
        }
    }

    async fn register_typed_handler<T, F>(
        &self,
        event_key: CompactString,
        handler: F,
    ) -> Result<(), EventError>
    where
        T: Event + 'static,
        F: Fn(T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let handler_name = format!("{}::{}", event_key, T::type_name());
        let handler: Arc<dyn EventHandler> = Arc::new(TypedEventHandler::new(handler_name, handler));

        self.handlers
            .entry(event_key.clone())
            .or_default()
            .push(handler);

        self.stats.write().await.total_handlers += 1;

        info!("📝 Registered handler for {}", event_key);
        Ok(())
    }

    async fn emit_event<T>(&self, event_key: &str, event: &T) -> Result<(), EventError>
    where
        T: Event,
    {
        // Clone the handler list out so the map shard is not held across awaits
        let event_handlers = self.handlers.get(event_key).map(|entry| entry.value().clone());

        let Some(event_handlers) = event_handlers.filter(|handlers| !handlers.is_empty()) else {
            trace!("No handlers for event: {}", event_key);
            self.stats.write().await.events_without_handlers += 1;
            return Ok(());
        };

        let data: Arc<[u8]> = event.serialize()?.into();
        debug!("📤 Emitting {} to {} handlers", event_key, event_handlers.len());

        let mut futures = FuturesUnordered::new();
        for handler in event_handlers {
            let data = Arc::clone(&data);
            futures.push(async move {
                let result = handler.handle(&data).await;
                if let Err(e) = &result {
                    error!("❌ Handler {} failed: {}", handler.handler_name(), e);
                }
                result.is_err()
            });
        }

        let mut failures = 0;
        while let Some(failed) = futures.next().await {
            if failed {
                failures += 1;
            }
        }

        let mut stats = self.stats.write().await;
        stats.events_emitted += 1;
        stats.handler_failures += failures;

        Ok(())
    }
}

impl Default for EventSystem {
    fn default() -> Self {
        Self::new()
    }
}
