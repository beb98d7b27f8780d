//! Decoding of the power status channel.

/// Value the scanner sends when powered on.
const POWERED_ON: u8 = 1;

/// Decodes the powered flag. Returns `None` for an empty payload.
#[must_use]
pub fn decode_power_status(payload: &[u8]) -> Option<bool> {
    payload.first().map(|&b| b == POWERED_ON)
}
