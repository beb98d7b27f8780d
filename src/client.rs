//! Main [`ScannerDiscovery`] implementation.
//!
//! This module provides the high-level client that combines the event bus,
//! the session controller and the device registry into one interface.

use tokio::task::JoinHandle;

use crate::adapter::RadioAdapter;
use crate::error::Result;
use crate::event::{EventBus, EventFilter, Subscription};
use crate::registry::DeviceRegistry;
use crate::session::{SessionConfig, SessionController, SessionHandle, SessionSnapshot};
use crate::types::{CastParams, DeviceIdentity, DeviceRecord};

/// Discovers scanners through a radio adapter and tracks what they report.
pub struct ScannerDiscovery {
    bus: EventBus,
    session: SessionHandle,
    registry: DeviceRegistry,

    // Background tasks
    session_task: Option<JoinHandle<()>>,
    registry_task: Option<JoinHandle<()>>,
}

impl ScannerDiscovery {
    /// Creates a client with default configuration.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new<A: RadioAdapter>(adapter: A) -> Self {
        Self::with_config(adapter, SessionConfig::default())
    }

    /// Creates a client with custom configuration.
    #[must_use]
    pub fn with_config<A: RadioAdapter>(adapter: A, config: SessionConfig) -> Self {
        let bus = EventBus::new(config.event_capacity);

        // Registry subscribes first so it sees the controller's first event
        let (registry, registry_task) = DeviceRegistry::spawn(&bus);
        let (session, session_task) = SessionController::spawn(adapter, bus.clone(), config);

        Self {
            bus,
            session,
            registry,
            session_task: Some(session_task),
            registry_task: Some(registry_task),
        }
    }

    // ==================== Session intents ====================

    /// Starts background discovery.
    pub fn start_scan(&self) -> Result<()> {
        self.session.start_scan()
    }

    /// Stops background discovery.
    pub fn stop_scan(&self) -> Result<()> {
        self.session.stop_scan()
    }

    /// Selects the scanner to connect to.
    pub fn select(&self, identity: DeviceIdentity) -> Result<()> {
        self.session.select(identity)
    }

    /// Disconnects from the selected scanner.
    pub fn disconnect(&self) -> Result<()> {
        self.session.disconnect()
    }

    /// Returns the session state once all queued intents were applied.
    pub async fn status(&self) -> Result<SessionSnapshot> {
        self.session.snapshot().await
    }

    // ==================== Registry ====================

    /// Returns all known scanners in first-seen order.
    pub async fn scanners(&self) -> Vec<DeviceRecord> {
        self.registry.scanners().await
    }

    /// Returns one scanner's record.
    pub async fn scanner(&self, identity: &DeviceIdentity) -> Option<DeviceRecord> {
        self.registry.get(identity).await
    }

    /// Re-publishes a scanner's record as a details event.
    pub async fn request_details(&self, identity: &DeviceIdentity) -> bool {
        self.registry.request_details(identity).await
    }

    /// Returns imaging parameters for a scanner once its network is known.
    pub async fn cast_params(
        &self,
        identity: &DeviceIdentity,
        certificate: impl Into<String>,
    ) -> Option<CastParams> {
        self.registry.get(identity).await?.cast_params(certificate)
    }

    // ==================== Accessors ====================

    /// Subscribes to events.
    #[must_use]
    pub fn subscribe(&self, filter: Option<EventFilter>) -> Subscription {
        self.bus.subscribe(filter)
    }

    /// Returns the event bus.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Returns the session handle.
    #[must_use]
    pub const fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Returns the device registry.
    #[must_use]
    pub const fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }
}

impl Drop for ScannerDiscovery {
    fn drop(&mut self) {
        // The controller closes the connection and exits on its own
        if self.session.shutdown().is_err() {
            if let Some(task) = self.session_task.take() {
                task.abort();
            }
        }
        if let Some(task) = self.registry_task.take() {
            task.abort();
        }
    }
}
