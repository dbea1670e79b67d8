//! Common types shared by the NAN (Neighbor Awareness Networking) crates.
//!
//! This crate provides type-safe representations of the primitives the NAN
//! state core and its daemon exchange:
//!
//! - [`MacAddress`]: 48-bit peer/local interface addresses (NMI and NDI)
//! - [`DiscoveryMacRandomization`]: the decoded form of the packed
//!   `disc_mac_addr_rand_interval` enable parameter

mod discovery;
mod mac;

pub use discovery::{ClusterMerge, DiscoveryMacRandomization};
pub use mac::MacAddress;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),
}
