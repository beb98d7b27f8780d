//! Network configuration reported over the Wi-Fi info channel.

/// Certificate used for imaging sessions when the caller supplies none.
pub const DEFAULT_CERTIFICATE: &str = "research";

/// Decoded network configuration.
///
/// Missing fields decode to empty strings and port 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    /// SSID of the scanner's current network.
    pub ssid: String,
    /// Pre-shared key, only set for Wi-Fi Direct networks.
    pub password: String,
    /// IP address, v4 if the scanner reported one, otherwise v6.
    pub ip: String,
    /// TCP port for control connections.
    pub port: u32,
}

/// Connection parameters handed to the external imaging session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastParams {
    /// Scanner IP address.
    pub address: String,
    /// Scanner control port.
    pub port: u32,
    /// Certificate authorising the session.
    pub certificate: String,
}
