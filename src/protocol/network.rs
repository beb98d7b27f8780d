//! Decoding of the Wi-Fi info channel.
//!
//! The scanner sends a flat YAML mapping, for example:
//! ```text
//! ssid: DIRECT-C3HD3
//! pw: Secure
//! ip4: 192.168.0.1
//! cast: 33546
//! ```

use serde::Deserialize;
use serde_yaml::Value;

use crate::types::NetworkConfig;

/// Wire representation; every key is optional and may carry any type.
#[derive(Debug, Deserialize)]
struct RawNetworkConfig {
    ssid: Option<Value>,
    pw: Option<Value>,
    ip4: Option<Value>,
    ip6: Option<Value>,
    cast: Option<Value>,
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_owned)
}

fn port_field(value: Option<&Value>) -> u32 {
    value
        .and_then(Value::as_u64)
        .and_then(|port| u32::try_from(port).ok())
        .unwrap_or(0)
}

/// Decodes a network config payload.
///
/// Returns `None` if the payload is not UTF-8 or is not a key-value
/// mapping. Missing or mistyped keys decode to their defaults, and `ip4`
/// wins over `ip6` when both are present.
#[must_use]
pub fn decode_network_config(payload: &[u8]) -> Option<NetworkConfig> {
    let text = std::str::from_utf8(payload).ok()?;
    if text.trim().is_empty() {
        return None;
    }

    let document: Value = serde_yaml::from_str(text).ok()?;
    if !document.is_mapping() {
        return None;
    }
    let raw: RawNetworkConfig = serde_yaml::from_value(document).ok()?;

    let ip = string_field(raw.ip4.as_ref())
        .or_else(|| string_field(raw.ip6.as_ref()))
        .unwrap_or_default();

    Some(NetworkConfig {
        ssid: string_field(raw.ssid.as_ref()).unwrap_or_default(),
        password: string_field(raw.pw.as_ref()).unwrap_or_default(),
        ip,
        port: port_field(raw.cast.as_ref()),
    })
}
