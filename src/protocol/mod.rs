//! Payload decoding for scanner advertisements and channels.
//!
//! Every decoder here is pure and total: malformed or foreign input yields
//! `None`, never an error or a panic.
//!
//! - Advertisement manufacturer data
//! - Power status channel
//! - Network configuration channel
//! - Channel group and channel identifiers

pub mod advertisement;
pub mod channel;
pub mod network;
pub mod power;

pub use advertisement::{ADVERTISEMENT_MIN_LEN, VENDOR_SIGNATURE, decode_advertisement};
pub use channel::{
    CHANNEL_GROUPS, ChannelKind, NETWORK_GROUP, NETWORK_INFO_CHANNEL, POWER_GROUP,
    POWER_INFO_CHANNEL,
};
pub use network::decode_network_config;
pub use power::decode_power_status;

use crate::types::NetworkConfig;

/// A decoded channel value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelValue {
    /// Powered flag from the power channel.
    Powered(bool),
    /// Configuration from the network channel.
    Network(NetworkConfig),
}

/// Decodes a raw value read from or pushed by a channel of the given kind.
#[must_use]
pub fn decode_channel_value(kind: ChannelKind, payload: &[u8]) -> Option<ChannelValue> {
    match kind {
        ChannelKind::Power => decode_power_status(payload).map(ChannelValue::Powered),
        ChannelKind::Network => decode_network_config(payload).map(ChannelValue::Network),
    }
}
