//! Data types for scanner discovery.
//!
//! This module contains the core data structures used throughout the library:
//! - Scanner identities
//! - Advertised status enumerations
//! - Telemetry snapshots and aggregated records
//! - Network configuration

pub mod device;
pub mod identity;
pub mod network;
pub mod status;

pub use device::{DeviceRecord, DiscoverySnapshot, UNKNOWN_FIELD};
pub use identity::{DeviceIdentity, VENDOR_NAME_PREFIX};
pub use network::{CastParams, DEFAULT_CERTIFICATE, NetworkConfig};
pub use status::{Availability, ChargingStatus, ListenPolicy};
