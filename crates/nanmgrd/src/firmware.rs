//! Simulated firmware lower layer.
//!
//! Accepts every signal, logs it at debug level and counts it. Outcomes the
//! real firmware would report later (setup confirms, terminations) arrive as
//! indications in the request stream instead.

use std::sync::atomic::{AtomicU64, Ordering};

use nan_core::{
    ConfigRequest, DataPathInitiateRequest, EnableRequest, FollowupRequest, NanCapabilities,
    NanLowerLayer, NdpInstanceId, NdpResponse, PublishRequest, ServiceId, SubscribeRequest,
};
use tracing::debug;

/// Limits the simulated firmware advertises. NDI and NDP counts are left
/// unreported so the interface fills them from its own configuration.
const CAPABILITIES: NanCapabilities = NanCapabilities {
    max_concurrent_nan_clusters: 1,
    max_publishes: 8,
    max_subscribes: 8,
    max_service_name_len: 255,
    max_ndi_interfaces: 0,
    max_ndp_sessions: 0,
    max_app_info_len: 255,
    max_queued_transmit_followup_msgs: 20,
};

#[derive(Debug, Default)]
pub struct SimulatedFirmware {
    signal_count: AtomicU64,
}

impl SimulatedFirmware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal_count(&self) -> u64 {
        self.signal_count.load(Ordering::Relaxed)
    }

    fn record(&self, signal: String) -> Result<(), String> {
        let seq = self.signal_count.fetch_add(1, Ordering::Relaxed);
        debug!(seq, signal = %signal, "firmware signal");
        Ok(())
    }
}

impl NanLowerLayer for SimulatedFirmware {
    fn enable(&self, request: &EnableRequest) -> Result<(), String> {
        self.record(format!(
            "enable master_preference={} interval={}",
            request.master_preference, request.discovery.interval_secs
        ))
    }

    fn disable(&self) -> Result<(), String> {
        self.record("disable".to_string())
    }

    fn set_config(&self, request: &ConfigRequest) -> Result<(), String> {
        self.record(format!(
            "set_config master_preference={:?} interval={}",
            request.master_preference, request.discovery.interval_secs
        ))
    }

    fn capabilities(&self) -> Result<NanCapabilities, String> {
        self.record("capabilities".to_string())?;
        Ok(CAPABILITIES)
    }

    fn publish(&self, publish_id: ServiceId, request: &PublishRequest) -> Result<(), String> {
        self.record(format!(
            "publish id={} service={:?} ttl={}",
            publish_id, request.service_name, request.ttl
        ))
    }

    fn publish_cancel(&self, publish_id: ServiceId) -> Result<(), String> {
        self.record(format!("publish_cancel id={}", publish_id))
    }

    fn subscribe(&self, subscribe_id: ServiceId, request: &SubscribeRequest) -> Result<(), String> {
        self.record(format!(
            "subscribe id={} service={:?} ttl={}",
            subscribe_id, request.service_name, request.ttl
        ))
    }

    fn subscribe_cancel(&self, subscribe_id: ServiceId) -> Result<(), String> {
        self.record(format!("subscribe_cancel id={}", subscribe_id))
    }

    fn transmit_followup(&self, request: &FollowupRequest) -> Result<(), String> {
        self.record(format!(
            "transmit_followup service={} match_key={}",
            request.service_id, request.match_key
        ))
    }

    fn ndp_request(
        &self,
        ndp_instance_id: NdpInstanceId,
        ndl_ifindex: u16,
        request: &DataPathInitiateRequest,
    ) -> Result<(), String> {
        self.record(format!(
            "ndp_request ndp={} ifindex={} peer={}",
            ndp_instance_id, ndl_ifindex, request.peer
        ))
    }

    fn ndp_response(&self, response: &NdpResponse) -> Result<(), String> {
        self.record(format!(
            "ndp_response ndp={} ifindex={} tag={} accept={}",
            response.ndp_instance_id,
            response.ndl_ifindex,
            response.local_instance_tag,
            response.accept
        ))
    }

    fn ndp_terminate(&self, ndp_instance_id: NdpInstanceId) -> Result<(), String> {
        self.record(format!("ndp_terminate ndp={}", ndp_instance_id))
    }
}
