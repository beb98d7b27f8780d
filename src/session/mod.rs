//! Radio session management.
//!
//! A single [`SessionController`] task owns the scan and connection state.
//! Intents from [`SessionHandle`] and callbacks from the radio adapter are
//! funnelled through one queue, so every state transition is applied by one
//! writer in arrival order.

pub mod controller;

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use crate::adapter::{AdapterEvent, ChannelHandle};
use crate::error::{Error, Result};
use crate::event::DEFAULT_EVENT_CAPACITY;
use crate::types::DeviceIdentity;

pub use controller::SessionController;

/// Scans report repeated advertisements by default so telemetry keeps updating.
pub const DEFAULT_SCAN_ALLOW_DUPLICATES: bool = true;

/// Configuration for the session controller and its event bus.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Events buffered per bus subscriber.
    pub event_capacity: usize,
    /// Ask the adapter to report every advertisement, not just the first.
    pub scan_allow_duplicates: bool,
}

impl SessionConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            scan_allow_duplicates: DEFAULT_SCAN_ALLOW_DUPLICATES,
        }
    }

    /// Sets the event bus capacity.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Sets whether duplicate advertisements are reported.
    #[must_use]
    pub const fn scan_allow_duplicates(mut self, allow: bool) -> Self {
        self.scan_allow_duplicates = allow;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Observable state of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionStatus {
    /// Not scanning and not connected.
    #[default]
    Idle,
    /// Scanning, no connection in progress.
    Scanning,
    /// Waiting for the adapter to connect.
    Connecting(DeviceIdentity),
    /// Connected, waiting for channel discovery.
    DiscoveringChannels(DeviceIdentity),
    /// Channels resolved and subscribed.
    Active {
        identity: DeviceIdentity,
        channels: Vec<ChannelHandle>,
    },
}

impl SessionStatus {
    /// Returns the scanner a connection phase is running for.
    #[must_use]
    pub const fn identity(&self) -> Option<&DeviceIdentity> {
        match self {
            Self::Idle | Self::Scanning => None,
            Self::Connecting(identity)
            | Self::DiscoveringChannels(identity)
            | Self::Active { identity, .. } => Some(identity),
        }
    }
}

/// Point-in-time copy of the session state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Connection phase, or scan state when no connection is in progress.
    pub status: SessionStatus,
    /// Scanner chosen by the operator, kept after the connection ends.
    pub selected: Option<DeviceIdentity>,
    /// True while the adapter is scanning.
    pub scanning: bool,
    /// Message of the last transport error.
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub(crate) enum Intent {
    StartScan,
    StopScan,
    Select(DeviceIdentity),
    Disconnect,
    Query(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

#[derive(Debug)]
pub(crate) enum Input {
    Intent(Intent),
    Adapter(AdapterEvent),
}

/// Handle for issuing intents to a running [`SessionController`].
///
/// Intents are queued and return immediately; their outcome shows up in
/// the session state and on the event bus.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Input>,
    state: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    fn send(&self, intent: Intent) -> Result<()> {
        self.tx
            .send(Input::Intent(intent))
            .map_err(|_| Error::SessionClosed)
    }

    /// Starts background discovery. Does nothing if already scanning.
    pub fn start_scan(&self) -> Result<()> {
        self.send(Intent::StartScan)
    }

    /// Stops background discovery. Does nothing if not scanning.
    pub fn stop_scan(&self) -> Result<()> {
        self.send(Intent::StopScan)
    }

    /// Selects a scanner, replacing any current connection.
    pub fn select(&self, identity: DeviceIdentity) -> Result<()> {
        self.send(Intent::Select(identity))
    }

    /// Disconnects and clears the selection. Does nothing when idle.
    pub fn disconnect(&self) -> Result<()> {
        self.send(Intent::Disconnect)
    }

    /// Tears down the session and stops the controller task.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Intent::Shutdown)
    }

    /// Returns the state after every previously queued input was applied.
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Intent::Query(tx))?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Returns the most recently published state without waiting.
    #[must_use]
    pub fn current(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Returns a receiver notified on every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Waits until the state satisfies `predicate`, giving up after `timeout`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
        timeout: Duration,
    ) -> Option<SessionSnapshot> {
        let mut rx = self.state.clone();
        match tokio::time::timeout(timeout, rx.wait_for(predicate)).await {
            Ok(Ok(snapshot)) => Some(snapshot.clone()),
            _ => None,
        }
    }

    /// Returns true while the controller task is accepting intents.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
