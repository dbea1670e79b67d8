//! Seam to the firmware-facing signalling layer.

use nan_types::MacAddress;

use crate::registry::{NdpInstanceId, ServiceId};
use crate::request::{
    ConfigRequest, DataPathInitiateRequest, EnableRequest, FollowupRequest, NanCapabilities,
    PublishRequest, SubscribeRequest,
};

/// Response to a peer's data-path request, as sent to the firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdpResponse {
    /// Zero when the request was refused before an id was assigned.
    pub ndp_instance_id: NdpInstanceId,
    /// NDL data interface index, zero when none was assigned.
    pub ndl_ifindex: u16,
    pub local_instance_tag: u16,
    pub local_ndi: Option<MacAddress>,
    pub accept: bool,
}

impl NdpResponse {
    pub fn reject(local_instance_tag: u16) -> Self {
        Self {
            ndp_instance_id: 0,
            ndl_ifindex: 0,
            local_instance_tag,
            local_ndi: None,
            accept: false,
        }
    }
}

/// Request signals towards the firmware.
///
/// Each call returns once the firmware confirmed or refused the request;
/// asynchronous outcomes come back through the indication methods of
/// [`NanInterface`](crate::NanInterface). Implementations are called with
/// the interface lock held and must not call back into the interface.
pub trait NanLowerLayer: Send + Sync {
    fn enable(&self, request: &EnableRequest) -> Result<(), String>;
    fn disable(&self) -> Result<(), String>;
    fn set_config(&self, request: &ConfigRequest) -> Result<(), String>;
    /// Reads the limits the firmware advertises.
    fn capabilities(&self) -> Result<NanCapabilities, String>;
    fn publish(&self, publish_id: ServiceId, request: &PublishRequest) -> Result<(), String>;
    fn publish_cancel(&self, publish_id: ServiceId) -> Result<(), String>;
    fn subscribe(&self, subscribe_id: ServiceId, request: &SubscribeRequest)
        -> Result<(), String>;
    fn subscribe_cancel(&self, subscribe_id: ServiceId) -> Result<(), String>;
    fn transmit_followup(&self, request: &FollowupRequest) -> Result<(), String>;
    fn ndp_request(
        &self,
        ndp_instance_id: NdpInstanceId,
        ndl_ifindex: u16,
        request: &DataPathInitiateRequest,
    ) -> Result<(), String>;
    fn ndp_response(&self, response: &NdpResponse) -> Result<(), String>;
    fn ndp_terminate(&self, ndp_instance_id: NdpInstanceId) -> Result<(), String>;
}
