//! Plain request and reply structs exchanged with the HAL-facing caller.
//!
//! Whatever decodes the wire format produces these; the state machine in
//! [`crate::interface`] consumes them and produces [`CommandReply`] values
//! for the reply serialiser.

use nan_types::{DiscoveryMacRandomization, MacAddress};
use serde::{Deserialize, Serialize};

use crate::registry::{NdpInstanceId, ServiceId, ServiceOptions};
use crate::status::{HalStatus, ResponseType};

/// HAL transaction identifier echoed in command replies and follow-up
/// status events.
pub type TransactionId = u16;

/// Identifier of a discovered peer instance a follow-up is addressed to.
pub type MatchKey = u16;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnableRequest {
    pub transaction_id: TransactionId,
    pub master_preference: u8,
    pub discovery: DiscoveryMacRandomization,
}

impl EnableRequest {
    /// Builds the request from the packed `disc_mac_addr_rand_interval`
    /// value the HAL sends.
    pub fn from_raw(
        transaction_id: TransactionId,
        master_preference: u8,
        disc_mac_addr_rand_interval: u32,
    ) -> Self {
        Self {
            transaction_id,
            master_preference,
            discovery: DiscoveryMacRandomization::from_raw(disc_mac_addr_rand_interval),
        }
    }
}

/// Runtime reconfiguration of an enabled interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigRequest {
    pub transaction_id: TransactionId,
    /// New master preference; `None` keeps the current one.
    pub master_preference: Option<u8>,
    pub discovery: DiscoveryMacRandomization,
}

impl ConfigRequest {
    pub fn from_raw(
        transaction_id: TransactionId,
        master_preference: Option<u8>,
        disc_mac_addr_rand_interval: u32,
    ) -> Self {
        Self {
            transaction_id,
            master_preference,
            discovery: DiscoveryMacRandomization::from_raw(disc_mac_addr_rand_interval),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    #[serde(default)]
    pub transaction_id: TransactionId,
    /// Zero requests a new publish; anything else updates that publish.
    #[serde(default)]
    pub publish_id: ServiceId,
    #[serde(default)]
    pub service_name: String,
    /// Lifetime in seconds; zero runs until cancelled.
    #[serde(default)]
    pub ttl: u16,
    #[serde(default)]
    pub options: ServiceOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub transaction_id: TransactionId,
    #[serde(default)]
    pub subscribe_id: ServiceId,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub ttl: u16,
    #[serde(default)]
    pub options: ServiceOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowupRequest {
    /// Publish or subscribe session the follow-up is sent on.
    pub service_id: ServiceId,
    pub match_key: MatchKey,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPathInitiateRequest {
    #[serde(default)]
    pub transaction_id: TransactionId,
    /// Peer NMI address.
    pub peer: MacAddress,
    /// Local NDI the data path is created on.
    #[serde(default)]
    pub local_ndi: Option<MacAddress>,
    /// Peer service instance the request is addressed to.
    #[serde(default)]
    pub requestor_instance_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPathRespondRequest {
    #[serde(default)]
    pub transaction_id: TransactionId,
    pub ndp_instance_id: NdpInstanceId,
    pub accept: bool,
    #[serde(default)]
    pub local_ndi: Option<MacAddress>,
}

/// Firmware-side data-path request received for one of our services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPathIndication {
    pub service_id: ServiceId,
    pub peer: MacAddress,
    /// The firmware's request id, quoted back in the response.
    pub local_instance_tag: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryEventKind {
    /// The local NMI address was re-randomised.
    NmiAddressChanged,
    ClusterStarted,
    ClusterJoined,
}

/// Discovery engine indication. `address` is the new NMI for
/// [`DiscoveryEventKind::NmiAddressChanged`] and the cluster id otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEngineEvent {
    pub kind: DiscoveryEventKind,
    pub address: MacAddress,
}

/// Limits reported to the HAL by `get_capabilities`.
///
/// The firmware fills in what it knows; zero means "not reported".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NanCapabilities {
    pub max_concurrent_nan_clusters: u32,
    pub max_publishes: u32,
    pub max_subscribes: u32,
    pub max_service_name_len: u32,
    pub max_ndi_interfaces: u32,
    pub max_ndp_sessions: u32,
    pub max_app_info_len: u32,
    pub max_queued_transmit_followup_msgs: u32,
}

impl NanCapabilities {
    /// Fills unreported NDI and NDP counts with `max_ndp_instances` and caps
    /// both at it.
    pub fn bounded_by(mut self, max_ndp_instances: u16) -> Self {
        let max = u32::from(max_ndp_instances);
        for value in [&mut self.max_ndi_interfaces, &mut self.max_ndp_sessions] {
            if *value == 0 || *value > max {
                *value = max;
            }
        }
        self
    }
}

/// What a termination indication refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationTarget {
    Publish(ServiceId),
    Subscribe(ServiceId),
    DataPath(NdpInstanceId),
}

/// Synchronous reply to a HAL command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    pub response: ResponseType,
    /// Copied from the request.
    pub transaction_id: TransactionId,
    pub status: HalStatus,
    /// Identifier the command produced or referred to; zero when none.
    pub id: u16,
}

impl CommandReply {
    pub fn success(response: ResponseType, transaction_id: TransactionId, id: u16) -> Self {
        Self {
            response,
            transaction_id,
            status: HalStatus::Success,
            id,
        }
    }

    pub fn failure(
        response: ResponseType,
        transaction_id: TransactionId,
        status: HalStatus,
        id: u16,
    ) -> Self {
        Self {
            response,
            transaction_id,
            status,
            id,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
