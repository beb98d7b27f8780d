//! Scanner identity derived from the advertised device name.

use std::fmt;

/// Prefix every scanner puts in front of its serial in the advertised name.
pub const VENDOR_NAME_PREFIX: &str = "CUS-";

/// Serial number identifying one physical scanner.
///
/// This is the primary key for every record the crate keeps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Creates an identity from a bare serial number.
    #[must_use]
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    /// Derives the identity from an advertised name.
    ///
    /// Returns `None` if the name does not carry the vendor prefix. A bare
    /// prefix yields an empty serial.
    #[must_use]
    pub fn from_advertised_name(name: &str) -> Option<Self> {
        name.strip_prefix(VENDOR_NAME_PREFIX)
            .map(|serial| Self(serial.to_owned()))
    }

    /// Returns the serial as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name the scanner advertises under.
    #[must_use]
    pub fn advertised_name(&self) -> String {
        format!("{VENDOR_NAME_PREFIX}{}", self.0)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceIdentity {
    fn from(serial: &str) -> Self {
        Self::new(serial)
    }
}
