//! # cast-scanner
//!
//! Discovery and telemetry decoding for battery-powered wireless ultrasound
//! scanners that advertise over Bluetooth LE.
//!
//! The library continuously discovers nearby scanners, keeps one session
//! with an operator-selected scanner, reads its power and network channels,
//! and publishes typed records to interested consumers.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Pure, total decoders for advertisements and channel payloads
//! - Single-writer session state machine over an abstract radio adapter
//! - Event bus and a registry of every scanner seen
//!
//! ## Quick Start
//!
//! ```no_run
//! use cast_scanner::{DeviceIdentity, RadioAdapter, ScannerDiscovery};
//!
//! async fn run(adapter: impl RadioAdapter) -> Result<(), cast_scanner::Error> {
//!     let client = ScannerDiscovery::new(adapter);
//!     client.start_scan()?;
//!
//!     // Later, once the operator picked a scanner
//!     client.select(DeviceIdentity::new("XYZ123"))?;
//!
//!     for scanner in client.scanners().await {
//!         println!("{}: {}% {}", scanner.identity, scanner.battery, scanner.ip);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Advertisement and channel payload decoders
//! - [`types`] - Data structures (identities, snapshots, records)
//! - [`adapter`] - Radio adapter trait implemented per platform
//! - [`event`] - Event bus for publishing discoveries and channel values
//! - [`session`] - Scan and connection state machine
//! - [`registry`] - Aggregated per-scanner records
//! - [`client`] - High-level [`ScannerDiscovery`] client

pub mod adapter;
pub mod client;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod types;

// Re-exports for convenience
pub use adapter::{
    AdapterEvent, AdapterEventSink, ChannelHandle, ChannelProperties, ConnectAttempt,
    ConnectionHandle, RadioAdapter,
};
pub use client::ScannerDiscovery;
pub use error::{Error, Result};
pub use event::{Event, EventBus, EventFilter, EventKind, Subscription};
pub use protocol::{
    ChannelKind, ChannelValue, decode_advertisement, decode_channel_value,
    decode_network_config, decode_power_status,
};
pub use registry::DeviceRegistry;
pub use session::{
    SessionConfig, SessionController, SessionHandle, SessionSnapshot, SessionStatus,
};
pub use types::{
    Availability, CastParams, ChargingStatus, DeviceIdentity, DeviceRecord, DiscoverySnapshot,
    ListenPolicy, NetworkConfig,
};
