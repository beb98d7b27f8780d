//! Event bus connecting the session controller to its consumers.
//!
//! The bus is an in-process broadcast hub. Publishing never blocks; a
//! subscriber only sees events published after it subscribed, in
//! publication order. A regular subscriber that falls more than the bus
//! capacity behind skips the events it missed. Consumers that must see
//! every event use [`EventBus::subscribe_lossless`] instead.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use crate::types::{DeviceIdentity, DeviceRecord, DiscoverySnapshot, NetworkConfig};

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Event types that can be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A scanner advertisement was decoded.
    DeviceDiscovered(DiscoverySnapshot),
    /// Network configuration was read from the selected scanner.
    NetworkConfigReceived {
        identity: DeviceIdentity,
        config: NetworkConfig,
    },
    /// The selected scanner reported its powered state.
    PoweredChanged {
        identity: DeviceIdentity,
        powered: bool,
    },
    /// A scanner was selected for the session.
    SelectionChanged(DeviceIdentity),
    /// Current record of a scanner, published on request.
    ScannerDetails(Box<DeviceRecord>),
}

/// Discriminant of an [`Event`], used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DeviceDiscovered,
    NetworkConfigReceived,
    PoweredChanged,
    SelectionChanged,
    ScannerDetails,
}

impl Event {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::DeviceDiscovered(_) => EventKind::DeviceDiscovered,
            Self::NetworkConfigReceived { .. } => EventKind::NetworkConfigReceived,
            Self::PoweredChanged { .. } => EventKind::PoweredChanged,
            Self::SelectionChanged(_) => EventKind::SelectionChanged,
            Self::ScannerDetails(_) => EventKind::ScannerDetails,
        }
    }

    /// Returns the scanner this event concerns.
    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        match self {
            Self::DeviceDiscovered(snapshot) => &snapshot.identity,
            Self::NetworkConfigReceived { identity, .. }
            | Self::PoweredChanged { identity, .. }
            | Self::SelectionChanged(identity) => identity,
            Self::ScannerDetails(record) => &record.identity,
        }
    }
}

/// Subscription filter for specific event kinds or scanners.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by event kinds.
    pub kinds: Option<Vec<EventKind>>,
    /// Filter by scanner.
    pub identity: Option<DeviceIdentity>,
}

impl EventFilter {
    /// Creates a filter for specific event kinds.
    #[must_use]
    pub const fn kinds(kinds: Vec<EventKind>) -> Self {
        Self {
            kinds: Some(kinds),
            identity: None,
        }
    }

    /// Creates a filter for events about one scanner.
    #[must_use]
    pub const fn identity(identity: DeviceIdentity) -> Self {
        Self {
            kinds: None,
            identity: Some(identity),
        }
    }

    /// Restricts the filter to one scanner.
    #[must_use]
    pub fn for_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Checks if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }

        if let Some(ref identity) = self.identity {
            if event.identity() != identity {
                return false;
            }
        }

        true
    }
}

enum Receiver {
    Broadcast(broadcast::Receiver<Event>),
    Lossless(mpsc::UnboundedReceiver<Event>),
}

/// A subscription to events.
pub struct Subscription {
    receiver: Receiver,
    filter: Option<EventFilter>,
}

impl Subscription {
    /// Receives the next matching event.
    ///
    /// Returns `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let event = match &mut self.receiver {
                Receiver::Broadcast(rx) => match rx.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("subscriber lagged, skipped {skipped} events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                Receiver::Lossless(rx) => rx.recv().await?,
            };
            if self.filter.as_ref().is_none_or(|f| f.matches(&event)) {
                return Some(event);
            }
        }
    }
}

/// Publishes events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    lossless: Arc<Mutex<Vec<mpsc::UnboundedSender<Event>>>>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            lossless: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Publishes an event to all current subscribers.
    ///
    /// Returns the number of subscribers that will see it.
    pub fn publish(&self, event: Event) -> usize {
        tracing::trace!(kind = ?event.kind(), identity = %event.identity(), "publishing event");
        // Held across both sends so every subscriber sees one order
        let mut lossless = self.lossless.lock().unwrap_or_else(PoisonError::into_inner);
        lossless.retain(|tx| tx.send(event.clone()).is_ok());
        // No subscribers is fine
        lossless.len() + self.sender.send(event).unwrap_or(0)
    }

    /// Subscribes to events with an optional filter.
    #[must_use]
    pub fn subscribe(&self, filter: Option<EventFilter>) -> Subscription {
        Subscription {
            receiver: Receiver::Broadcast(self.sender.subscribe()),
            filter,
        }
    }

    /// Subscribes through an unbounded queue that never skips events.
    ///
    /// Events queue up for as long as the subscriber does not keep up.
    #[must_use]
    pub fn subscribe_lossless(&self, filter: Option<EventFilter>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lossless
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        Subscription {
            receiver: Receiver::Lossless(rx),
            filter,
        }
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let lossless = self
            .lossless
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|tx| !tx.is_closed())
            .count();
        lossless + self.sender.receiver_count()
    }

    /// Waits for an event matching the filter with timeout.
    ///
    /// Returns `None` if the timeout expires or the bus is closed.
    pub async fn wait_for(&self, filter: EventFilter, timeout: Duration) -> Option<Event> {
        let mut subscription = self.subscribe(Some(filter));
        tokio::time::timeout(timeout, subscription.recv())
            .await
            .ok()
            .flatten()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Availability, ChargingStatus, ListenPolicy};

    fn discovered(serial: &str, battery: u8) -> Event {
        Event::DeviceDiscovered(DiscoverySnapshot {
            identity: DeviceIdentity::new(serial),
            rssi: -60,
            battery,
            temperature: 30,
            availability: Availability::Available,
            listen_policy: ListenPolicy::Disabled,
            charging_status: ChargingStatus::None,
            powered: true,
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe(None);
        let mut second = bus.subscribe(None);

        assert_eq!(bus.publish(discovered("A1", 50)), 2);

        for sub in [&mut first, &mut second] {
            let event = tokio::time::timeout(Duration::from_millis(100), sub.recv())
                .await
                .unwrap();
            assert_eq!(event, Some(discovered("A1", 50)));
        }
    }

    #[tokio::test]
    async fn test_no_replay_for_late_subscribers() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(discovered("A1", 50)), 0);

        let mut sub = bus.subscribe(None);
        bus.publish(discovered("A1", 51));

        let event = sub.recv().await;
        assert_eq!(event, Some(discovered("A1", 51)));
    }

    #[tokio::test]
    async fn test_per_identity_order_preserved() {
        let bus = EventBus::new(64);
        let mut sub = bus.subscribe(Some(EventFilter::identity(DeviceIdentity::new("A1"))));

        for battery in 0..10 {
            bus.publish(discovered("A1", battery));
            bus.publish(discovered("B2", battery));
        }

        for battery in 0..10 {
            assert_eq!(sub.recv().await, Some(discovered("A1", battery)));
        }
    }

    #[tokio::test]
    async fn test_closed_bus_ends_subscription() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe(None);
        drop(bus);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_lossless_subscriber_survives_burst() {
        let bus = EventBus::new(2);
        let mut lossy = bus.subscribe(None);
        let mut lossless = bus.subscribe_lossless(None);

        for battery in 0..5 {
            assert_eq!(bus.publish(discovered("A1", battery)), 2);
        }

        for battery in 0..5 {
            assert_eq!(lossless.recv().await, Some(discovered("A1", battery)));
        }
        // The bounded subscriber only has the newest two left
        assert_eq!(lossy.recv().await, Some(discovered("A1", 3)));
        assert_eq!(lossy.recv().await, Some(discovered("A1", 4)));
    }

    #[tokio::test]
    async fn test_lossless_subscription_filter_and_close() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe_lossless(Some(EventFilter::kinds(vec![
            EventKind::SelectionChanged,
        ])));
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(discovered("A1", 10));
        bus.publish(Event::SelectionChanged(DeviceIdentity::new("A1")));
        drop(bus);

        assert_eq!(
            sub.recv().await,
            Some(Event::SelectionChanged(DeviceIdentity::new("A1")))
        );
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn test_dropped_lossless_subscriber_pruned() {
        let bus = EventBus::new(2);
        let sub = bus.subscribe_lossless(None);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.publish(discovered("A1", 10)), 0);
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let bus = EventBus::new(4);
        let filter = EventFilter::kinds(vec![EventKind::SelectionChanged]);
        let event = bus.wait_for(filter, Duration::from_millis(20)).await;
        assert!(event.is_none());
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::kinds(vec![EventKind::PoweredChanged])
            .for_identity(DeviceIdentity::new("A1"));

        assert!(filter.matches(&Event::PoweredChanged {
            identity: DeviceIdentity::new("A1"),
            powered: false,
        }));
        assert!(!filter.matches(&Event::PoweredChanged {
            identity: DeviceIdentity::new("B2"),
            powered: false,
        }));
        assert!(!filter.matches(&discovered("A1", 10)));
        assert!(EventFilter::default().matches(&discovered("B2", 10)));
    }
}
