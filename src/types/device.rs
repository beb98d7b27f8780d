//! Telemetry snapshots and the aggregated per-scanner record.

use crate::types::identity::DeviceIdentity;
use crate::types::network::{CastParams, NetworkConfig};
use crate::types::status::{Availability, ChargingStatus, ListenPolicy};

/// Placeholder shown for SSID and address until network config arrives.
pub const UNKNOWN_FIELD: &str = "-";

/// One decoded advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySnapshot {
    /// Scanner serial.
    pub identity: DeviceIdentity,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Battery level, 0-100%.
    pub battery: u8,
    /// Temperature in degrees Celsius.
    pub temperature: u8,
    /// Current availability.
    pub availability: Availability,
    /// Listen policy.
    pub listen_policy: ListenPolicy,
    /// Charging status.
    pub charging_status: ChargingStatus,
    /// True if the scanner is powered on.
    pub powered: bool,
}

/// Everything known about one scanner.
///
/// Updates are applied field group by field group; fields an update does not
/// carry keep their previous values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Scanner serial.
    pub identity: DeviceIdentity,
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Battery level, 0-100%.
    pub battery: u8,
    /// Temperature in degrees Celsius.
    pub temperature: u8,
    /// True if the scanner is powered on.
    pub powered: bool,
    /// Current availability.
    pub availability: Availability,
    /// Listen policy.
    pub listen_policy: ListenPolicy,
    /// Charging status.
    pub charging_status: ChargingStatus,
    /// SSID of the scanner's Wi-Fi network.
    pub ssid: String,
    /// Wi-Fi Direct pre-shared key.
    pub password: String,
    /// IP address (v4 preferred).
    pub ip: String,
    /// TCP port for control connections.
    pub port: u32,
}

impl DeviceRecord {
    /// Creates a record from the first snapshot seen for a scanner.
    #[must_use]
    pub fn from_snapshot(snapshot: &DiscoverySnapshot) -> Self {
        Self {
            identity: snapshot.identity.clone(),
            rssi: snapshot.rssi,
            battery: snapshot.battery,
            temperature: snapshot.temperature,
            powered: snapshot.powered,
            availability: snapshot.availability,
            listen_policy: snapshot.listen_policy,
            charging_status: snapshot.charging_status,
            ssid: UNKNOWN_FIELD.to_owned(),
            password: String::new(),
            ip: UNKNOWN_FIELD.to_owned(),
            port: 0,
        }
    }

    /// Overwrites the telemetry fields from a newer snapshot.
    pub fn apply_snapshot(&mut self, snapshot: &DiscoverySnapshot) {
        self.rssi = snapshot.rssi;
        self.battery = snapshot.battery;
        self.temperature = snapshot.temperature;
        self.powered = snapshot.powered;
        self.availability = snapshot.availability;
        self.listen_policy = snapshot.listen_policy;
        self.charging_status = snapshot.charging_status;
    }

    /// Overwrites the network fields.
    pub fn apply_network(&mut self, config: &NetworkConfig) {
        self.ssid.clone_from(&config.ssid);
        self.password.clone_from(&config.password);
        self.ip.clone_from(&config.ip);
        self.port = config.port;
    }

    /// Returns true once an address and port have been received.
    #[must_use]
    pub fn has_network(&self) -> bool {
        !self.ip.is_empty() && self.ip != UNKNOWN_FIELD && self.port != 0
    }

    /// Builds imaging session parameters for this scanner.
    ///
    /// Returns `None` until the scanner has reported an address and port.
    #[must_use]
    pub fn cast_params(&self, certificate: impl Into<String>) -> Option<CastParams> {
        if !self.has_network() {
            return None;
        }
        Some(CastParams {
            address: self.ip.clone(),
            port: self.port,
            certificate: certificate.into(),
        })
    }
}
