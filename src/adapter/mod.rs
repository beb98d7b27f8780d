//! Radio adapter abstraction.
//!
//! The session controller drives the platform Bluetooth stack through the
//! [`RadioAdapter`] trait. Every operation only initiates work; outcomes come
//! back later as [`AdapterEvent`]s delivered through the [`AdapterEventSink`]
//! the controller installs with [`RadioAdapter::set_event_sink`]. The sink may
//! be used from any thread.
//!
//! Every [`RadioAdapter::connect`] call carries a fresh [`ConnectAttempt`].
//! The adapter echoes it on the `Connected` and `Disconnected` events of that
//! attempt, which lets the controller drop callbacks from attempts it has
//! already abandoned, even for the same scanner.

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::session::Input;
use crate::types::DeviceIdentity;

/// Controller-assigned id of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectAttempt(pub u64);

/// Adapter-assigned handle for one established connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u64);

/// Operations a channel supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChannelProperties {
    /// Value can be read on demand.
    pub read: bool,
    /// Value changes can be pushed as notifications.
    pub notify: bool,
}

impl ChannelProperties {
    /// Read and notify.
    pub const READ_NOTIFY: Self = Self {
        read: true,
        notify: true,
    };
}

/// A channel resolved on a connected scanner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    /// Connection the channel belongs to.
    pub connection: ConnectionHandle,
    /// Group containing the channel.
    pub group: Uuid,
    /// Channel identifier.
    pub uuid: Uuid,
    /// Supported operations.
    pub properties: ChannelProperties,
}

/// Events reported by the radio adapter.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// Local radio became usable or unusable.
    RadioState { powered_on: bool },
    /// An advertisement was seen while scanning.
    Advertisement {
        name: Option<String>,
        manufacturer_data: Bytes,
        rssi: i16,
    },
    /// A connection requested with [`RadioAdapter::connect`] was established.
    Connected {
        identity: DeviceIdentity,
        attempt: ConnectAttempt,
        connection: ConnectionHandle,
    },
    /// A connection was closed or a pending connection was abandoned.
    Disconnected {
        identity: DeviceIdentity,
        attempt: ConnectAttempt,
    },
    /// Channel discovery finished.
    ChannelsResolved {
        connection: ConnectionHandle,
        channels: Vec<ChannelHandle>,
    },
    /// A channel value was read or pushed.
    ChannelValue {
        connection: ConnectionHandle,
        channel: Uuid,
        value: Bytes,
    },
    /// The adapter failed.
    Error { message: String },
}

/// Callback surface through which the adapter reports events.
#[derive(Debug, Clone)]
pub struct AdapterEventSink {
    tx: mpsc::UnboundedSender<Input>,
}

impl AdapterEventSink {
    pub(crate) const fn new(tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { tx }
    }

    /// Delivers an event to the session controller without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelSend`] once the controller has shut down.
    pub fn emit(&self, event: AdapterEvent) -> Result<()> {
        self.tx
            .send(Input::Adapter(event))
            .map_err(|_| Error::ChannelSend)
    }

    /// Returns true while the controller is still receiving events.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Trait for platform radio implementations.
///
/// A failed future is treated like an [`AdapterEvent::Error`].
pub trait RadioAdapter: Send + 'static {
    /// Installs the sink events must be reported through.
    fn set_event_sink(&mut self, sink: AdapterEventSink);

    /// Starts scanning for advertisements.
    fn start_scan(&mut self, allow_duplicates: bool) -> BoxFuture<'_, Result<()>>;

    /// Stops scanning.
    fn stop_scan(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Starts connecting to a scanner.
    fn connect(
        &mut self,
        identity: DeviceIdentity,
        attempt: ConnectAttempt,
    ) -> BoxFuture<'_, Result<()>>;

    /// Closes the connection made by `attempt`, or abandons it if pending.
    ///
    /// Must leave any newer attempt for the same scanner untouched.
    fn disconnect(
        &mut self,
        identity: DeviceIdentity,
        attempt: ConnectAttempt,
    ) -> BoxFuture<'_, Result<()>>;

    /// Starts discovery of the given channel groups.
    fn discover_channels(
        &mut self,
        connection: ConnectionHandle,
        groups: Vec<Uuid>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Enables value notifications for a channel.
    fn subscribe(&mut self, channel: ChannelHandle) -> BoxFuture<'_, Result<()>>;

    /// Requests one read of a channel's value.
    fn read(&mut self, channel: ChannelHandle) -> BoxFuture<'_, Result<()>>;
}
