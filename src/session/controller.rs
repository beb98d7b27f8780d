//! Session controller task.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::adapter::{
    AdapterEvent, AdapterEventSink, ChannelHandle, ConnectAttempt, ConnectionHandle, RadioAdapter,
};
use crate::error::Error;
use crate::event::{Event, EventBus};
use crate::protocol::{
    CHANNEL_GROUPS, ChannelKind, ChannelValue, decode_advertisement, decode_channel_value,
};
use crate::session::{Input, Intent, SessionConfig, SessionHandle, SessionSnapshot, SessionStatus};
use crate::types::DeviceIdentity;

/// A channel of the active connection.
#[derive(Debug)]
struct ActiveChannel {
    handle: ChannelHandle,
    kind: ChannelKind,
}

/// Connection progress for the selected scanner.
#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Connecting(ConnectAttempt),
    DiscoveringChannels {
        attempt: ConnectAttempt,
        connection: ConnectionHandle,
    },
    Active {
        attempt: ConnectAttempt,
        connection: ConnectionHandle,
        channels: Vec<ActiveChannel>,
    },
}

impl Phase {
    const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Attempt the phase belongs to, `None` when idle.
    const fn attempt(&self) -> Option<ConnectAttempt> {
        match self {
            Self::Idle => None,
            Self::Connecting(attempt)
            | Self::DiscoveringChannels { attempt, .. }
            | Self::Active { attempt, .. } => Some(*attempt),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    selected: Option<DeviceIdentity>,
    phase: Phase,
    /// Last attempt id handed out.
    attempts: u64,
    scan_requested: bool,
    scanning: bool,
    last_error: Option<String>,
}

impl SessionState {
    fn next_attempt(&mut self) -> ConnectAttempt {
        self.attempts += 1;
        ConnectAttempt(self.attempts)
    }

    /// True if `identity` and `attempt` name the connection in progress.
    fn is_current(&self, identity: &DeviceIdentity, attempt: ConnectAttempt) -> bool {
        self.selected.as_ref() == Some(identity) && self.phase.attempt() == Some(attempt)
    }
}

/// Owns the scan/connection state machine for one radio adapter.
///
/// Only one scanner is connected at a time; discovery of all scanners
/// continues while a session is active.
pub struct SessionController<A> {
    adapter: A,
    bus: EventBus,
    config: SessionConfig,
    state: SessionState,
    radio_on: bool,
    rx: mpsc::UnboundedReceiver<Input>,
    status_tx: watch::Sender<SessionSnapshot>,
}

impl<A: RadioAdapter> SessionController<A> {
    /// Spawns the controller on the current tokio runtime.
    ///
    /// The adapter receives its event sink before the task starts.
    #[must_use]
    pub fn spawn(
        mut adapter: A,
        bus: EventBus,
        config: SessionConfig,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SessionSnapshot::default());

        adapter.set_event_sink(AdapterEventSink::new(tx.clone()));

        let controller = Self {
            adapter,
            bus,
            config,
            state: SessionState::default(),
            radio_on: true,
            rx,
            status_tx,
        };
        let task = tokio::spawn(controller.run());

        (
            SessionHandle {
                tx,
                state: status_rx,
            },
            task,
        )
    }

    async fn run(mut self) {
        while let Some(input) = self.rx.recv().await {
            let keep_running = match input {
                Input::Intent(intent) => self.handle_intent(intent).await,
                Input::Adapter(event) => {
                    self.handle_adapter_event(event).await;
                    true
                }
            };
            self.publish_status();
            if !keep_running {
                break;
            }
        }
        tracing::debug!("session controller stopped");
    }

    async fn handle_intent(&mut self, intent: Intent) -> bool {
        match intent {
            Intent::StartScan => self.start_scan().await,
            Intent::StopScan => self.stop_scan().await,
            Intent::Select(identity) => self.select(identity).await,
            Intent::Disconnect => self.disconnect().await,
            Intent::Query(reply) => {
                // Receiver may have given up waiting
                let _ = reply.send(self.snapshot());
            }
            Intent::Shutdown => {
                self.shutdown().await;
                return false;
            }
        }
        true
    }

    async fn handle_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::RadioState { powered_on } => self.radio_state(powered_on).await,
            AdapterEvent::Advertisement {
                name,
                manufacturer_data,
                rssi,
            } => self.advertisement(name.as_deref(), &manufacturer_data, rssi),
            AdapterEvent::Connected {
                identity,
                attempt,
                connection,
            } => self.connected(identity, attempt, connection).await,
            AdapterEvent::Disconnected { identity, attempt } => {
                self.disconnected(&identity, attempt);
            }
            AdapterEvent::ChannelsResolved {
                connection,
                channels,
            } => self.channels_resolved(connection, channels).await,
            AdapterEvent::ChannelValue {
                connection,
                channel,
                value,
            } => self.channel_value(connection, channel, &value),
            AdapterEvent::Error { message } => self.fail(&Error::Transport { message }).await,
        }
    }

    // ==================== Intents ====================

    async fn start_scan(&mut self) {
        self.state.scan_requested = true;
        self.state.last_error = None;
        if self.state.scanning {
            tracing::debug!("scan already active");
            return;
        }
        self.begin_scan().await;
    }

    async fn begin_scan(&mut self) {
        if !self.radio_on {
            tracing::info!("radio is off, scan deferred");
            return;
        }
        tracing::info!("starting scan");
        match self
            .adapter
            .start_scan(self.config.scan_allow_duplicates)
            .await
        {
            Ok(()) => self.state.scanning = true,
            Err(e) => self.fail(&e).await,
        }
    }

    async fn stop_scan(&mut self) {
        self.state.scan_requested = false;
        if !self.state.scanning {
            tracing::debug!("scan not active");
            return;
        }
        tracing::info!("stopping scan");
        self.state.scanning = false;
        if let Err(e) = self.adapter.stop_scan().await {
            self.fail(&e).await;
        }
    }

    async fn select(&mut self, identity: DeviceIdentity) {
        if self.state.selected.as_ref() == Some(&identity) && !self.state.phase.is_idle() {
            tracing::debug!(%identity, "scanner already selected");
            return;
        }

        self.teardown().await;

        let attempt = self.state.next_attempt();
        tracing::info!(%identity, attempt = attempt.0, "connecting to scanner");
        self.state.selected = Some(identity.clone());
        self.state.phase = Phase::Connecting(attempt);
        self.state.last_error = None;
        self.bus.publish(Event::SelectionChanged(identity.clone()));

        if let Err(e) = self.adapter.connect(identity, attempt).await {
            self.fail(&e).await;
        }
    }

    async fn disconnect(&mut self) {
        if self.state.phase.is_idle() && self.state.selected.is_none() {
            tracing::debug!("nothing to disconnect");
            return;
        }
        self.teardown().await;
        self.state.selected = None;
    }

    async fn shutdown(&mut self) {
        tracing::info!("shutting down session");
        self.teardown().await;
        self.state.scan_requested = false;
        if self.state.scanning {
            self.state.scanning = false;
            if let Err(e) = self.adapter.stop_scan().await {
                tracing::warn!("failed to stop scan: {e}");
            }
        }
    }

    /// Discards the current connection and asks the adapter to close it.
    async fn teardown(&mut self) {
        let Some(attempt) = std::mem::take(&mut self.state.phase).attempt() else {
            return;
        };
        let Some(identity) = self.state.selected.clone() else {
            return;
        };
        tracing::debug!(%identity, attempt = attempt.0, "tearing down connection");
        if let Err(e) = self.adapter.disconnect(identity, attempt).await {
            tracing::warn!("failed to disconnect: {e}");
        }
    }

    /// Failure boundary for adapter errors: back to idle, no reconnect.
    async fn fail(&mut self, error: &Error) {
        tracing::warn!("{error}");
        self.state.last_error = Some(error.to_string());
        self.teardown().await;
        self.state.scan_requested = false;
        if self.state.scanning {
            self.state.scanning = false;
            if let Err(e) = self.adapter.stop_scan().await {
                tracing::debug!("failed to stop scan after error: {e}");
            }
        }
    }

    // ==================== Adapter events ====================

    async fn radio_state(&mut self, powered_on: bool) {
        self.radio_on = powered_on;
        if powered_on {
            tracing::info!("radio powered on");
            if self.state.scan_requested && !self.state.scanning {
                self.begin_scan().await;
            }
            return;
        }

        tracing::warn!("radio powered off");
        self.state.scanning = false;
        if !self.state.phase.is_idle() {
            tracing::info!("connection lost with radio");
            self.state.phase = Phase::Idle;
        }
    }

    fn advertisement(&self, name: Option<&str>, manufacturer_data: &[u8], rssi: i16) {
        let Some(snapshot) =
            name.and_then(|name| decode_advertisement(name, manufacturer_data, rssi))
        else {
            tracing::trace!(
                name = name.unwrap_or_default(),
                data = %hex::encode(manufacturer_data),
                "ignoring advertisement"
            );
            return;
        };

        tracing::trace!(identity = %snapshot.identity, rssi, "scanner advertisement");
        self.bus.publish(Event::DeviceDiscovered(snapshot));
    }

    async fn connected(
        &mut self,
        identity: DeviceIdentity,
        attempt: ConnectAttempt,
        connection: ConnectionHandle,
    ) {
        if !self.state.is_current(&identity, attempt) {
            tracing::debug!(%identity, attempt = attempt.0, "closing stale connection");
            if let Err(e) = self.adapter.disconnect(identity, attempt).await {
                tracing::debug!("failed to close stale connection: {e}");
            }
            return;
        }
        if !matches!(self.state.phase, Phase::Connecting(_)) {
            tracing::debug!(%identity, "ignoring repeated connect report");
            return;
        }

        tracing::info!(%identity, "connected, discovering channels");
        self.state.phase = Phase::DiscoveringChannels {
            attempt,
            connection,
        };
        if let Err(e) = self
            .adapter
            .discover_channels(connection, CHANNEL_GROUPS.to_vec())
            .await
        {
            self.fail(&e).await;
        }
    }

    fn disconnected(&mut self, identity: &DeviceIdentity, attempt: ConnectAttempt) {
        if !self.state.is_current(identity, attempt) {
            tracing::debug!(%identity, attempt = attempt.0, "ignoring stale disconnect");
            return;
        }
        tracing::info!(%identity, "scanner disconnected");
        self.state.phase = Phase::Idle;
    }

    async fn channels_resolved(&mut self, connection: ConnectionHandle, handles: Vec<ChannelHandle>) {
        let attempt = match self.state.phase {
            Phase::DiscoveringChannels {
                attempt,
                connection: expected,
            } if expected == connection => attempt,
            _ => {
                tracing::debug!(?connection, "ignoring channels of stale connection");
                return;
            }
        };

        let mut channels = Vec::with_capacity(handles.len());
        for handle in handles {
            if handle.connection != connection {
                continue;
            }
            match ChannelKind::from_uuid(handle.uuid) {
                Some(kind) => channels.push(ActiveChannel { handle, kind }),
                None => tracing::debug!(channel = %handle.uuid, "skipping unknown channel"),
            }
        }

        let requests: Vec<ChannelHandle> = channels.iter().map(|c| c.handle.clone()).collect();
        tracing::info!(channels = requests.len(), "session active");
        self.state.phase = Phase::Active {
            attempt,
            connection,
            channels,
        };

        for handle in requests {
            if handle.properties.notify {
                if let Err(e) = self.adapter.subscribe(handle.clone()).await {
                    self.fail(&e).await;
                    return;
                }
            }
            if handle.properties.read {
                if let Err(e) = self.adapter.read(handle).await {
                    self.fail(&e).await;
                    return;
                }
            }
        }
    }

    fn channel_value(&self, connection: ConnectionHandle, channel: Uuid, value: &[u8]) {
        let Some(identity) = self.state.selected.clone() else {
            return;
        };
        let Phase::Active {
            connection: active,
            channels,
            ..
        } = &self.state.phase
        else {
            tracing::debug!(%channel, "ignoring value outside active session");
            return;
        };
        if *active != connection {
            tracing::debug!(%channel, "ignoring value from stale connection");
            return;
        }
        let Some(kind) = channels
            .iter()
            .find(|c| c.handle.uuid == channel)
            .map(|c| c.kind)
        else {
            tracing::debug!(%channel, "ignoring value from unknown channel");
            return;
        };

        tracing::trace!(%channel, value = %hex::encode(value), "channel value");
        match decode_channel_value(kind, value) {
            Some(ChannelValue::Powered(powered)) => {
                self.bus.publish(Event::PoweredChanged { identity, powered });
            }
            Some(ChannelValue::Network(config)) => {
                self.bus
                    .publish(Event::NetworkConfigReceived { identity, config });
            }
            None => tracing::warn!(?kind, %identity, "undecodable channel value"),
        }
    }

    // ==================== Status ====================

    fn snapshot(&self) -> SessionSnapshot {
        let status = match (&self.state.phase, &self.state.selected) {
            (Phase::Connecting(_), Some(identity)) => SessionStatus::Connecting(identity.clone()),
            (Phase::DiscoveringChannels { .. }, Some(identity)) => {
                SessionStatus::DiscoveringChannels(identity.clone())
            }
            (Phase::Active { channels, .. }, Some(identity)) => SessionStatus::Active {
                identity: identity.clone(),
                channels: channels.iter().map(|c| c.handle.clone()).collect(),
            },
            _ if self.state.scanning => SessionStatus::Scanning,
            _ => SessionStatus::Idle,
        };

        SessionSnapshot {
            status,
            selected: self.state.selected.clone(),
            scanning: self.state.scanning,
            last_error: self.state.last_error.clone(),
        }
    }

    fn publish_status(&self) {
        let snapshot = self.snapshot();
        self.status_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::Bytes;
    use futures::FutureExt;
    use futures::future::BoxFuture;

    use super::*;
    use crate::adapter::ChannelProperties;
    use crate::error::Result;
    use crate::event::{EventFilter, EventKind, Subscription};
    use crate::protocol::{NETWORK_GROUP, NETWORK_INFO_CHANNEL, POWER_GROUP, POWER_INFO_CHANNEL};

    const WAIT: Duration = Duration::from_secs(1);

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        StartScan(bool),
        StopScan,
        Connect(DeviceIdentity, ConnectAttempt),
        Disconnect(DeviceIdentity, ConnectAttempt),
        Discover(ConnectionHandle, Vec<Uuid>),
        Subscribe(Uuid),
        Read(Uuid),
    }

    /// Records every call and reports events through the installed sink.
    #[derive(Clone, Default)]
    struct MockAdapter {
        calls: Arc<Mutex<Vec<Call>>>,
        sink: Arc<Mutex<Option<AdapterEventSink>>>,
        fail_connect: Arc<AtomicBool>,
    }

    impl MockAdapter {
        fn record(&self, call: Call) -> BoxFuture<'static, Result<()>> {
            let fail =
                matches!(call, Call::Connect(..)) && self.fail_connect.load(Ordering::SeqCst);
            self.calls.lock().unwrap().push(call);
            if fail {
                futures::future::ready(Err(Error::transport("peripheral unreachable"))).boxed()
            } else {
                futures::future::ready(Ok(())).boxed()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
            self.calls().iter().filter(|c| pred(c)).count()
        }

        /// Attempt passed to the most recent connect call.
        fn last_attempt(&self) -> ConnectAttempt {
            self.calls()
                .iter()
                .rev()
                .find_map(|c| match c {
                    Call::Connect(_, attempt) => Some(*attempt),
                    _ => None,
                })
                .expect("connect called")
        }

        fn emit(&self, event: AdapterEvent) {
            self.sink
                .lock()
                .unwrap()
                .as_ref()
                .expect("sink installed")
                .emit(event)
                .unwrap();
        }
    }

    impl RadioAdapter for MockAdapter {
        fn set_event_sink(&mut self, sink: AdapterEventSink) {
            *self.sink.lock().unwrap() = Some(sink);
        }

        fn start_scan(&mut self, allow_duplicates: bool) -> BoxFuture<'_, Result<()>> {
            self.record(Call::StartScan(allow_duplicates))
        }

        fn stop_scan(&mut self) -> BoxFuture<'_, Result<()>> {
            self.record(Call::StopScan)
        }

        fn connect(
            &mut self,
            identity: DeviceIdentity,
            attempt: ConnectAttempt,
        ) -> BoxFuture<'_, Result<()>> {
            self.record(Call::Connect(identity, attempt))
        }

        fn disconnect(
            &mut self,
            identity: DeviceIdentity,
            attempt: ConnectAttempt,
        ) -> BoxFuture<'_, Result<()>> {
            self.record(Call::Disconnect(identity, attempt))
        }

        fn discover_channels(
            &mut self,
            connection: ConnectionHandle,
            groups: Vec<Uuid>,
        ) -> BoxFuture<'_, Result<()>> {
            self.record(Call::Discover(connection, groups))
        }

        fn subscribe(&mut self, channel: ChannelHandle) -> BoxFuture<'_, Result<()>> {
            self.record(Call::Subscribe(channel.uuid))
        }

        fn read(&mut self, channel: ChannelHandle) -> BoxFuture<'_, Result<()>> {
            self.record(Call::Read(channel.uuid))
        }
    }

    struct Harness {
        adapter: MockAdapter,
        bus: EventBus,
        handle: SessionHandle,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn new() -> Self {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();

            let adapter = MockAdapter::default();
            let bus = EventBus::new(64);
            let (handle, task) =
                SessionController::spawn(adapter.clone(), bus.clone(), SessionConfig::default());
            Self {
                adapter,
                bus,
                handle,
                task,
            }
        }

        async fn snapshot(&self) -> SessionSnapshot {
            self.handle.snapshot().await.unwrap()
        }

        /// Drives a selection all the way to an active session.
        async fn activate(&self, serial: &str, connection: u64) -> SessionSnapshot {
            let identity = DeviceIdentity::new(serial);
            let connection = ConnectionHandle(connection);
            self.handle.select(identity.clone()).unwrap();
            self.snapshot().await;
            self.adapter.emit(AdapterEvent::Connected {
                identity,
                attempt: self.adapter.last_attempt(),
                connection,
            });
            self.adapter.emit(AdapterEvent::ChannelsResolved {
                connection,
                channels: channels(connection),
            });
            self.snapshot().await
        }
    }

    fn channels(connection: ConnectionHandle) -> Vec<ChannelHandle> {
        vec![
            ChannelHandle {
                connection,
                group: POWER_GROUP,
                uuid: POWER_INFO_CHANNEL,
                properties: ChannelProperties::READ_NOTIFY,
            },
            ChannelHandle {
                connection,
                group: NETWORK_GROUP,
                uuid: NETWORK_INFO_CHANNEL,
                properties: ChannelProperties {
                    read: true,
                    notify: false,
                },
            },
        ]
    }

    fn advertisement(name: &str, battery: u8) -> AdapterEvent {
        AdapterEvent::Advertisement {
            name: Some(name.to_owned()),
            manufacturer_data: Bytes::from(vec![0xFB, 0x02, battery, 33, 0b0100_0001, 0x01]),
            rssi: -59,
        }
    }

    async fn next(sub: &mut Subscription) -> Event {
        tokio::time::timeout(WAIT, sub.recv())
            .await
            .expect("event before timeout")
            .expect("bus open")
    }

    #[tokio::test]
    async fn test_start_scan_is_idempotent() {
        let h = Harness::new();
        h.handle.start_scan().unwrap();
        h.handle.start_scan().unwrap();

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Scanning);
        assert!(snapshot.scanning);
        assert_eq!(h.adapter.calls(), vec![Call::StartScan(true)]);

        h.handle.stop_scan().unwrap();
        h.handle.stop_scan().unwrap();
        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert_eq!(h.adapter.count(|c| *c == Call::StopScan), 1);
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_noop() {
        let h = Harness::new();
        h.handle.disconnect().unwrap();
        assert_eq!(h.snapshot().await, SessionSnapshot::default());
        assert!(h.adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_full_session_flow() {
        let h = Harness::new();
        let mut selections = h
            .bus
            .subscribe(Some(EventFilter::kinds(vec![EventKind::SelectionChanged])));

        let snapshot = h.activate("XYZ123", 7).await;
        let id = DeviceIdentity::new("XYZ123");

        assert_eq!(
            snapshot.status,
            SessionStatus::Active {
                identity: id.clone(),
                channels: channels(ConnectionHandle(7)),
            }
        );
        assert_eq!(snapshot.selected, Some(id.clone()));
        assert_eq!(next(&mut selections).await, Event::SelectionChanged(id.clone()));
        assert_eq!(
            h.adapter.calls(),
            vec![
                Call::Connect(id, ConnectAttempt(1)),
                Call::Discover(ConnectionHandle(7), CHANNEL_GROUPS.to_vec()),
                Call::Subscribe(POWER_INFO_CHANNEL),
                Call::Read(POWER_INFO_CHANNEL),
                Call::Read(NETWORK_INFO_CHANNEL),
            ]
        );
    }

    #[tokio::test]
    async fn test_reselect_discards_late_connection() {
        let h = Harness::new();
        let a = DeviceIdentity::new("A1");
        let b = DeviceIdentity::new("B2");

        h.handle.select(a.clone()).unwrap();
        h.handle.select(b.clone()).unwrap();
        h.adapter.emit(AdapterEvent::Connected {
            identity: a.clone(),
            attempt: ConnectAttempt(1),
            connection: ConnectionHandle(1),
        });

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Connecting(b.clone()));
        assert_eq!(h.adapter.count(|c| matches!(c, Call::Discover(..))), 0);
        // Pending attempt cancelled on reselect, late link closed on arrival
        assert_eq!(
            h.adapter
                .count(|c| *c == Call::Disconnect(a.clone(), ConnectAttempt(1))),
            2
        );

        h.adapter.emit(AdapterEvent::Connected {
            identity: b.clone(),
            attempt: ConnectAttempt(2),
            connection: ConnectionHandle(2),
        });
        // Channels from the abandoned connection must not activate anything
        h.adapter.emit(AdapterEvent::ChannelsResolved {
            connection: ConnectionHandle(1),
            channels: channels(ConnectionHandle(1)),
        });
        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::DiscoveringChannels(b.clone()));

        h.adapter.emit(AdapterEvent::ChannelsResolved {
            connection: ConnectionHandle(2),
            channels: channels(ConnectionHandle(2)),
        });
        let snapshot = h.snapshot().await;
        assert!(matches!(
            snapshot.status,
            SessionStatus::Active { ref identity, .. } if *identity == b
        ));
    }

    #[tokio::test]
    async fn test_selecting_same_scanner_twice_is_noop() {
        let h = Harness::new();
        let id = DeviceIdentity::new("A1");
        h.handle.select(id.clone()).unwrap();
        h.handle.select(id.clone()).unwrap();
        h.snapshot().await;
        assert_eq!(h.adapter.calls(), vec![Call::Connect(id, ConnectAttempt(1))]);
    }

    #[tokio::test]
    async fn test_late_disconnect_spares_reconnect_to_same_scanner() {
        let h = Harness::new();
        let id = DeviceIdentity::new("A1");
        h.activate("A1", 3).await;

        h.handle.disconnect().unwrap();
        h.handle.select(id.clone()).unwrap();
        // Report for the link closed by the disconnect above
        h.adapter.emit(AdapterEvent::Disconnected {
            identity: id.clone(),
            attempt: ConnectAttempt(1),
        });
        assert_eq!(h.snapshot().await.status, SessionStatus::Connecting(id.clone()));

        h.adapter.emit(AdapterEvent::Connected {
            identity: id.clone(),
            attempt: ConnectAttempt(2),
            connection: ConnectionHandle(4),
        });
        assert_eq!(
            h.snapshot().await.status,
            SessionStatus::DiscoveringChannels(id.clone())
        );
        assert_eq!(
            h.adapter.count(|c| *c == Call::Disconnect(id.clone(), ConnectAttempt(2))),
            0
        );
    }

    #[tokio::test]
    async fn test_callbacks_of_cancelled_attempt_ignored() {
        let h = Harness::new();
        let a = DeviceIdentity::new("A1");
        let b = DeviceIdentity::new("B2");

        h.handle.select(a.clone()).unwrap();
        h.handle.select(b).unwrap();
        h.handle.select(a.clone()).unwrap();
        h.adapter.emit(AdapterEvent::Disconnected {
            identity: a.clone(),
            attempt: ConnectAttempt(1),
        });
        assert_eq!(h.snapshot().await.status, SessionStatus::Connecting(a.clone()));

        // The first attempt's link is closed, the third one stays pending
        h.adapter.emit(AdapterEvent::Connected {
            identity: a.clone(),
            attempt: ConnectAttempt(1),
            connection: ConnectionHandle(5),
        });
        assert_eq!(h.snapshot().await.status, SessionStatus::Connecting(a.clone()));
        assert_eq!(
            h.adapter.count(|c| matches!(c, Call::Disconnect(_, ConnectAttempt(3)))),
            0
        );

        h.adapter.emit(AdapterEvent::Connected {
            identity: a.clone(),
            attempt: ConnectAttempt(3),
            connection: ConnectionHandle(6),
        });
        assert_eq!(h.snapshot().await.status, SessionStatus::DiscoveringChannels(a));
    }

    #[tokio::test]
    async fn test_channel_values_published() {
        let h = Harness::new();
        h.activate("A1", 3).await;
        let mut sub = h.bus.subscribe(None);
        let id = DeviceIdentity::new("A1");

        h.adapter.emit(AdapterEvent::ChannelValue {
            connection: ConnectionHandle(3),
            channel: POWER_INFO_CHANNEL,
            value: Bytes::from_static(&[1]),
        });
        h.adapter.emit(AdapterEvent::ChannelValue {
            connection: ConnectionHandle(3),
            channel: NETWORK_INFO_CHANNEL,
            value: Bytes::from_static(b"ssid: DIRECT-C3HD3\npw: Secure\nip4: 192.168.0.1\ncast: 33546"),
        });

        assert_eq!(
            next(&mut sub).await,
            Event::PoweredChanged {
                identity: id.clone(),
                powered: true,
            }
        );
        let Event::NetworkConfigReceived { identity, config } = next(&mut sub).await else {
            panic!("expected network config");
        };
        assert_eq!(identity, id);
        assert_eq!(config.ip, "192.168.0.1");
        assert_eq!(config.port, 33546);
    }

    #[tokio::test]
    async fn test_stale_and_malformed_values_dropped() {
        let h = Harness::new();
        h.activate("A1", 3).await;
        let mut sub = h.bus.subscribe(None);

        h.adapter.emit(AdapterEvent::ChannelValue {
            connection: ConnectionHandle(99),
            channel: POWER_INFO_CHANNEL,
            value: Bytes::from_static(&[1]),
        });
        h.adapter.emit(AdapterEvent::ChannelValue {
            connection: ConnectionHandle(3),
            channel: NETWORK_INFO_CHANNEL,
            value: Bytes::from_static(&[0xFF, 0x00]),
        });
        h.adapter.emit(AdapterEvent::ChannelValue {
            connection: ConnectionHandle(3),
            channel: POWER_INFO_CHANNEL,
            value: Bytes::new(),
        });
        h.adapter.emit(AdapterEvent::ChannelValue {
            connection: ConnectionHandle(3),
            channel: POWER_INFO_CHANNEL,
            value: Bytes::from_static(&[0]),
        });

        // Only the last value decodes
        assert_eq!(
            next(&mut sub).await,
            Event::PoweredChanged {
                identity: DeviceIdentity::new("A1"),
                powered: false,
            }
        );
    }

    #[tokio::test]
    async fn test_transport_error_returns_to_idle() {
        let h = Harness::new();
        h.handle.start_scan().unwrap();
        h.activate("A1", 3).await;

        h.adapter.emit(AdapterEvent::Error {
            message: "link supervision timeout".into(),
        });
        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert!(!snapshot.scanning);
        assert_eq!(
            snapshot.last_error.as_deref(),
            Some("transport error: link supervision timeout")
        );
        // No automatic reconnect
        assert_eq!(h.adapter.count(|c| matches!(c, Call::Connect(..))), 1);

        // Values from the torn-down connection are ignored
        let mut sub = h.bus.subscribe(None);
        h.adapter.emit(AdapterEvent::ChannelValue {
            connection: ConnectionHandle(3),
            channel: POWER_INFO_CHANNEL,
            value: Bytes::from_static(&[1]),
        });
        h.snapshot().await;
        assert!(
            tokio::time::timeout(Duration::from_millis(50), sub.recv())
                .await
                .is_err()
        );

        // Manual reselection of the same scanner works
        h.handle.select(DeviceIdentity::new("A1")).unwrap();
        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Connecting(DeviceIdentity::new("A1")));
        assert_eq!(snapshot.last_error, None);
    }

    #[tokio::test]
    async fn test_failed_connect_is_transport_error() {
        let h = Harness::new();
        h.adapter.fail_connect.store(true, Ordering::SeqCst);
        h.handle.select(DeviceIdentity::new("A1")).unwrap();

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert_eq!(snapshot.selected, Some(DeviceIdentity::new("A1")));
        assert!(snapshot.last_error.is_some());
    }

    #[tokio::test]
    async fn test_remote_disconnect() {
        let h = Harness::new();
        h.activate("A1", 3).await;

        h.adapter.emit(AdapterEvent::Disconnected {
            identity: DeviceIdentity::new("B2"),
            attempt: ConnectAttempt(1),
        });
        h.adapter.emit(AdapterEvent::Disconnected {
            identity: DeviceIdentity::new("A1"),
            attempt: ConnectAttempt(7),
        });
        assert!(matches!(h.snapshot().await.status, SessionStatus::Active { .. }));

        h.adapter.emit(AdapterEvent::Disconnected {
            identity: DeviceIdentity::new("A1"),
            attempt: ConnectAttempt(1),
        });
        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert_eq!(snapshot.last_error, None);
    }

    #[tokio::test]
    async fn test_advertisements_filtered_and_published() {
        let h = Harness::new();
        h.activate("A1", 3).await;
        let mut sub = h.bus.subscribe(None);

        h.adapter.emit(AdapterEvent::Advertisement {
            name: Some("Headphones".into()),
            manufacturer_data: Bytes::from_static(&[0xFB, 0x02, 1, 2, 3, 4]),
            rssi: -40,
        });
        h.adapter.emit(AdapterEvent::Advertisement {
            name: None,
            manufacturer_data: Bytes::from_static(&[0xFB, 0x02, 1, 2, 3, 4]),
            rssi: -40,
        });
        h.adapter.emit(advertisement("CUS-B2", 80));

        // Discovery of other scanners continues during an active session
        let Event::DeviceDiscovered(snapshot) = next(&mut sub).await else {
            panic!("expected discovery");
        };
        assert_eq!(snapshot.identity, DeviceIdentity::new("B2"));
        assert_eq!(snapshot.battery, 80);
        assert!(matches!(h.snapshot().await.status, SessionStatus::Active { .. }));
    }

    #[tokio::test]
    async fn test_scan_waits_for_radio() {
        let h = Harness::new();
        h.adapter.emit(AdapterEvent::RadioState { powered_on: false });
        h.handle.start_scan().unwrap();
        assert_eq!(h.snapshot().await.status, SessionStatus::Idle);
        assert!(h.adapter.calls().is_empty());

        h.adapter.emit(AdapterEvent::RadioState { powered_on: true });
        assert_eq!(h.snapshot().await.status, SessionStatus::Scanning);
        assert_eq!(h.adapter.calls(), vec![Call::StartScan(true)]);

        h.adapter.emit(AdapterEvent::RadioState { powered_on: false });
        assert_eq!(h.snapshot().await.status, SessionStatus::Idle);
        h.adapter.emit(AdapterEvent::RadioState { powered_on: true });
        assert_eq!(h.snapshot().await.status, SessionStatus::Scanning);
        assert_eq!(h.adapter.count(|c| matches!(c, Call::StartScan(_))), 2);
    }

    #[tokio::test]
    async fn test_watch_reports_changes() {
        let h = Harness::new();
        h.handle.start_scan().unwrap();
        let snapshot = h
            .handle
            .wait_for(|s| s.status == SessionStatus::Scanning, WAIT)
            .await;
        assert!(snapshot.is_some());
        assert!(h.handle.current().scanning);
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let h = Harness::new();
        h.handle.start_scan().unwrap();
        h.activate("A1", 3).await;
        h.handle.shutdown().unwrap();

        tokio::time::timeout(WAIT, h.task).await.unwrap().unwrap();
        assert!(h.adapter.calls().contains(&Call::StopScan));
        assert!(
            h.adapter
                .calls()
                .contains(&Call::Disconnect(DeviceIdentity::new("A1"), ConnectAttempt(1)))
        );
        assert!(matches!(
            h.handle.snapshot().await,
            Err(Error::SessionClosed)
        ));
    }
}
