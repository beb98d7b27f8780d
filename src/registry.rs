//! Registry of every scanner seen on the event bus.
//!
//! The registry task is the only writer. It reads the bus through a lossless
//! subscription, so bursts of advertisements never push out a network config.
//! Readers get cloned records, so they never observe a half-applied update.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::event::{Event, EventBus, Subscription};
use crate::types::{DeviceIdentity, DeviceRecord};

#[derive(Debug, Default)]
struct Records {
    /// Records in first-seen order.
    list: Vec<DeviceRecord>,
    index: HashMap<DeviceIdentity, usize>,
}

impl Records {
    fn get_mut(&mut self, identity: &DeviceIdentity) -> Option<&mut DeviceRecord> {
        let &i = self.index.get(identity)?;
        self.list.get_mut(i)
    }

    /// Applies one event. Returns true if a record changed.
    fn apply(&mut self, event: &Event) -> bool {
        match event {
            Event::DeviceDiscovered(snapshot) => {
                if let Some(record) = self.get_mut(&snapshot.identity) {
                    record.apply_snapshot(snapshot);
                } else {
                    tracing::debug!(identity = %snapshot.identity, "new scanner record");
                    self.index
                        .insert(snapshot.identity.clone(), self.list.len());
                    self.list.push(DeviceRecord::from_snapshot(snapshot));
                }
                true
            }
            Event::NetworkConfigReceived { identity, config } => {
                if let Some(record) = self.get_mut(identity) {
                    record.apply_network(config);
                    true
                } else {
                    tracing::debug!(%identity, "network config for unknown scanner discarded");
                    false
                }
            }
            Event::PoweredChanged { identity, powered } => {
                if let Some(record) = self.get_mut(identity) {
                    record.powered = *powered;
                    true
                } else {
                    tracing::debug!(%identity, "power state for unknown scanner discarded");
                    false
                }
            }
            Event::SelectionChanged(_) | Event::ScannerDetails(_) => false,
        }
    }
}

/// Aggregates bus events into one [`DeviceRecord`] per scanner.
#[derive(Clone)]
pub struct DeviceRegistry {
    records: Arc<RwLock<Records>>,
    bus: EventBus,
}

impl DeviceRegistry {
    /// Creates a registry subscribed to `bus` and spawns its update task.
    ///
    /// The subscription is registered before this returns, so every event
    /// published afterwards is applied.
    #[must_use]
    pub fn spawn(bus: &EventBus) -> (Self, JoinHandle<()>) {
        let registry = Self {
            records: Arc::new(RwLock::new(Records::default())),
            bus: bus.clone(),
        };
        let subscription = bus.subscribe_lossless(None);
        let task = tokio::spawn(Self::run(Arc::clone(&registry.records), subscription));
        (registry, task)
    }

    async fn run(records: Arc<RwLock<Records>>, mut subscription: Subscription) {
        while let Some(event) = subscription.recv().await {
            records.write().await.apply(&event);
        }
        tracing::debug!("registry stopped, bus closed");
    }

    /// Returns copies of all records in first-seen order.
    pub async fn scanners(&self) -> Vec<DeviceRecord> {
        self.records.read().await.list.clone()
    }

    /// Returns a copy of one record.
    pub async fn get(&self, identity: &DeviceIdentity) -> Option<DeviceRecord> {
        let records = self.records.read().await;
        let &i = records.index.get(identity)?;
        records.list.get(i).cloned()
    }

    /// Returns the number of known scanners.
    pub async fn len(&self) -> usize {
        self.records.read().await.list.len()
    }

    /// Returns true if no scanner has been seen yet.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.list.is_empty()
    }

    /// Publishes the current record of a scanner as [`Event::ScannerDetails`].
    ///
    /// Returns false if the scanner is unknown.
    pub async fn request_details(&self, identity: &DeviceIdentity) -> bool {
        let Some(record) = self.get(identity).await else {
            tracing::info!(%identity, "no details for unknown scanner");
            return false;
        };
        self.bus.publish(Event::ScannerDetails(Box::new(record)));
        true
    }

    /// Forgets every record.
    pub async fn clear(&self) {
        *self.records.write().await = Records::default();
    }
}
