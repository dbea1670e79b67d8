//! Decoding of the packed discovery MAC randomisation parameter.
//!
//! The HAL enable/config requests carry a single 32-bit value whose top two
//! bits select cluster-merge behaviour and whose low 30 bits hold the NMI
//! randomisation interval in seconds. It is decoded once here so nothing
//! downstream handles the raw encoding.

use serde::{Deserialize, Serialize};

/// Both top bits set: cluster merge enabled.
pub const CLUSTER_MERGE_ENABLE_MASK: u32 = 0xC000_0000;

/// Only the top bit set: cluster merge disabled.
pub const CLUSTER_MERGE_DISABLE_MASK: u32 = 0x8000_0000;

/// Randomisation interval bits.
pub const MAC_RANDOM_INTERVAL_MASK: u32 = 0x3FFF_FFFF;

/// Cluster merge selection carried in the top bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMerge {
    /// No selection encoded; the firmware default applies.
    #[default]
    Unspecified,
    Enabled,
    Disabled,
}

/// Decoded `disc_mac_addr_rand_interval`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryMacRandomization {
    /// Interval between NMI randomisations, in seconds. Zero disables it.
    pub interval_secs: u32,
    pub cluster_merge: ClusterMerge,
}

impl DiscoveryMacRandomization {
    /// Decodes the raw parameter.
    ///
    /// When the top bits match neither selector pattern the value is taken
    /// verbatim as the interval and no cluster-merge selection is made.
    pub const fn from_raw(raw: u32) -> Self {
        let selector = raw & CLUSTER_MERGE_ENABLE_MASK;
        if selector == CLUSTER_MERGE_ENABLE_MASK {
            Self {
                interval_secs: raw & MAC_RANDOM_INTERVAL_MASK,
                cluster_merge: ClusterMerge::Enabled,
            }
        } else if selector == CLUSTER_MERGE_DISABLE_MASK {
            Self {
                interval_secs: raw & MAC_RANDOM_INTERVAL_MASK,
                cluster_merge: ClusterMerge::Disabled,
            }
        } else {
            Self {
                interval_secs: raw,
                cluster_merge: ClusterMerge::Unspecified,
            }
        }
    }

    /// Re-encodes into the packed form.
    pub const fn to_raw(&self) -> u32 {
        match self.cluster_merge {
            ClusterMerge::Enabled => {
                CLUSTER_MERGE_ENABLE_MASK | (self.interval_secs & MAC_RANDOM_INTERVAL_MASK)
            }
            ClusterMerge::Disabled => {
                CLUSTER_MERGE_DISABLE_MASK | (self.interval_secs & MAC_RANDOM_INTERVAL_MASK)
            }
            ClusterMerge::Unspecified => self.interval_secs,
        }
    }

    pub const fn disables_cluster_merge(&self) -> bool {
        matches!(self.cluster_merge, ClusterMerge::Disabled)
    }
}

impl From<u32> for DiscoveryMacRandomization {
    fn from(raw: u32) -> Self {
        Self::from_raw(raw)
    }
}
