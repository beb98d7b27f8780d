//! Manufacturer-data decoding for scanner advertisements.
//!
//! The manufacturer-specific payload has the layout:
//! ```text
//! ┌──────┬──────┬─────────┬─────────────┬────────────┬─────────┐
//! │ 0xFB │ 0x02 │ battery │ temperature │ status     │ flags   │
//! │      │      │ 0-100 % │ °C          │ packed     │ bit 0 = │
//! │      │      │         │             │ (see below)│ powered │
//! └──────┴──────┴─────────┴─────────────┴────────────┴─────────┘
//!
//! status: bits 0-2 availability, bits 3-4 listen policy, bits 6-7 charging
//! ```

use bytes::Buf;

use crate::types::{
    Availability, ChargingStatus, DeviceIdentity, DiscoverySnapshot, ListenPolicy,
};

/// Company signature at the start of the manufacturer data.
pub const VENDOR_SIGNATURE: [u8; 2] = [0xFB, 0x02];

/// Minimum manufacturer payload length.
pub const ADVERTISEMENT_MIN_LEN: usize = 6;

/// Upper bound applied to the battery percentage.
const MAX_BATTERY: u8 = 100;

/// Upper bound applied to the temperature.
const MAX_TEMPERATURE: u8 = 100;

const AVAILABILITY_MASK: u8 = 0x07;
const LISTEN_POLICY_SHIFT: u8 = 3;
const LISTEN_POLICY_MASK: u8 = 0x03;
const CHARGING_SHIFT: u8 = 6;
const CHARGING_MASK: u8 = 0x03;
const POWERED_BIT: u8 = 0x01;

/// Decodes a discovery advertisement.
///
/// Returns `None` for anything that is not one of our scanners: a name
/// without the vendor prefix, a payload shorter than
/// [`ADVERTISEMENT_MIN_LEN`] or a payload without [`VENDOR_SIGNATURE`].
#[must_use]
pub fn decode_advertisement(
    name: &str,
    manufacturer_data: &[u8],
    rssi: i16,
) -> Option<DiscoverySnapshot> {
    let identity = DeviceIdentity::from_advertised_name(name)?;

    if manufacturer_data.len() < ADVERTISEMENT_MIN_LEN {
        return None;
    }

    let mut buf = manufacturer_data;
    let signature = [buf.get_u8(), buf.get_u8()];
    if signature != VENDOR_SIGNATURE {
        return None;
    }

    let battery = buf.get_u8().min(MAX_BATTERY);
    let temperature = buf.get_u8().min(MAX_TEMPERATURE);
    let status = buf.get_u8();
    let flags = buf.get_u8();

    Some(DiscoverySnapshot {
        identity,
        rssi,
        battery,
        temperature,
        availability: Availability::from_index(status & AVAILABILITY_MASK),
        listen_policy: ListenPolicy::from_index((status >> LISTEN_POLICY_SHIFT) & LISTEN_POLICY_MASK),
        charging_status: ChargingStatus::from_index((status >> CHARGING_SHIFT) & CHARGING_MASK),
        powered: flags & POWERED_BIT != 0,
    })
}
