//! Channel groups and channels exposed by a connected scanner.

use uuid::Uuid;

/// Power status channel group.
pub const POWER_GROUP: Uuid = Uuid::from_u128(0x8c85_3b6a_2297_44c1_8277_7362_7c8d_2abc);

/// Power status info channel (read/notify, one byte).
pub const POWER_INFO_CHANNEL: Uuid = Uuid::from_u128(0x8c85_3b6a_2297_44c1_8277_7362_7c8d_2abd);

/// Network configuration channel group.
pub const NETWORK_GROUP: Uuid = Uuid::from_u128(0xf9eb_3fae_947a_4e5b_ab7c_c799_e91e_d780);

/// Network configuration info channel (read/notify, YAML text).
pub const NETWORK_INFO_CHANNEL: Uuid = Uuid::from_u128(0xf9eb_3fae_947a_4e5b_ab7c_c799_e91e_d781);

/// Groups requested from every connected scanner.
pub const CHANNEL_GROUPS: [Uuid; 2] = [POWER_GROUP, NETWORK_GROUP];

/// Channels this crate knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Powered flag.
    Power,
    /// Wi-Fi network configuration.
    Network,
}

impl ChannelKind {
    /// Maps a channel UUID to its kind.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        if uuid == POWER_INFO_CHANNEL {
            Some(Self::Power)
        } else if uuid == NETWORK_INFO_CHANNEL {
            Some(Self::Network)
        } else {
            None
        }
    }

    /// Returns the channel UUID.
    #[must_use]
    pub const fn uuid(self) -> Uuid {
        match self {
            Self::Power => POWER_INFO_CHANNEL,
            Self::Network => NETWORK_INFO_CHANNEL,
        }
    }

    /// Returns the UUID of the group containing this channel.
    #[must_use]
    pub const fn group(self) -> Uuid {
        match self {
            Self::Power => POWER_GROUP,
            Self::Network => NETWORK_GROUP,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_constants() {
        assert_eq!(
            POWER_INFO_CHANNEL.to_string(),
            "8c853b6a-2297-44c1-8277-73627c8d2abd"
        );
        assert_eq!(
            NETWORK_GROUP.to_string(),
            "f9eb3fae-947a-4e5b-ab7c-c799e91ed780"
        );
    }

    #[test]
    fn test_kind_lookup() {
        assert_eq!(
            ChannelKind::from_uuid(POWER_INFO_CHANNEL),
            Some(ChannelKind::Power)
        );
        assert_eq!(
            ChannelKind::from_uuid(NETWORK_INFO_CHANNEL),
            Some(ChannelKind::Network)
        );
        assert_eq!(ChannelKind::from_uuid(POWER_GROUP), None);
        assert_eq!(ChannelKind::Network.group(), NETWORK_GROUP);
        assert_eq!(ChannelKind::Power.uuid(), POWER_INFO_CHANNEL);
    }
}
