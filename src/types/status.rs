//! Status enumerations packed into the scanner advertisement.
//!
//! Indices beyond the known range resolve to the last variant instead of
//! failing, so newer firmware with wider fields still decodes.

/// Whether the scanner can currently be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Availability {
    /// Free for a new session.
    #[default]
    Available = 0,
    /// In use, but accepts listen-only connections.
    ListenOnly = 1,
    /// In use and not accepting connections.
    NotAvailable = 2,
}

impl Availability {
    /// All variants in index order.
    pub const ALL: [Self; 3] = [Self::Available, Self::ListenOnly, Self::NotAvailable];

    /// Resolves an index, clamping to the last variant.
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        match index {
            0 => Self::Available,
            1 => Self::ListenOnly,
            _ => Self::NotAvailable,
        }
    }

    /// Returns the wire index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }
}

/// Who may listen in on the scanner's image stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ListenPolicy {
    /// Listening disabled.
    #[default]
    Disabled = 0,
    /// Members of the same institution.
    Institution = 1,
    /// Anyone.
    Global = 2,
    /// Research listeners.
    Research = 3,
}

impl ListenPolicy {
    /// All variants in index order.
    pub const ALL: [Self; 4] = [
        Self::Disabled,
        Self::Institution,
        Self::Global,
        Self::Research,
    ];

    /// Resolves an index, clamping to the last variant.
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        match index {
            0 => Self::Disabled,
            1 => Self::Institution,
            2 => Self::Global,
            _ => Self::Research,
        }
    }

    /// Returns the wire index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }
}

/// Battery charging state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChargingStatus {
    /// Not charging.
    #[default]
    None = 0,
    /// Pre-charge.
    Pre = 1,
    /// Fast charge.
    Fast = 2,
    /// Charge complete.
    Done = 3,
}

impl ChargingStatus {
    /// All variants in index order.
    pub const ALL: [Self; 4] = [Self::None, Self::Pre, Self::Fast, Self::Done];

    /// Resolves an index, clamping to the last variant.
    #[must_use]
    pub const fn from_index(index: u8) -> Self {
        match index {
            0 => Self::None,
            1 => Self::Pre,
            2 => Self::Fast,
            _ => Self::Done,
        }
    }

    /// Returns the wire index.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }
}
