//! Request script parsing.
//!
//! Each non-empty line is one JSON object tagged by `op`. Host commands and
//! firmware indications share the same stream so a script can replay a full
//! session. Lines starting with `#` are comments.

use nan_core::{
    DataPathIndication, DataPathInitiateRequest, DataPathRespondRequest, DiscoveryEngineEvent,
    FollowupRequest, LowerResultCode, MatchKey, NdpInstanceId, PublishRequest, ServiceId,
    ServiceReason, SubscribeRequest, TerminationTarget, TransactionId,
};
use serde::Deserialize;

use crate::error::{NanmgrError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    // Host commands
    Enable {
        #[serde(default)]
        transaction_id: TransactionId,
        #[serde(default)]
        master_preference: u8,
        /// Packed discovery MAC randomisation word, decoded by the core.
        #[serde(default)]
        disc_mac_addr_rand_interval: u32,
    },
    Disable {
        #[serde(default)]
        transaction_id: TransactionId,
    },
    SetConfig {
        #[serde(default)]
        transaction_id: TransactionId,
        #[serde(default)]
        master_preference: Option<u8>,
        #[serde(default)]
        disc_mac_addr_rand_interval: u32,
    },
    GetCapabilities {
        #[serde(default)]
        transaction_id: TransactionId,
    },
    Publish(PublishRequest),
    PublishCancel {
        #[serde(default)]
        transaction_id: TransactionId,
        publish_id: ServiceId,
    },
    Subscribe(SubscribeRequest),
    SubscribeCancel {
        #[serde(default)]
        transaction_id: TransactionId,
        subscribe_id: ServiceId,
    },
    TransmitFollowup(FollowupRequest),
    DataPathInitiate(DataPathInitiateRequest),
    DataPathRespond(DataPathRespondRequest),
    DataPathEnd {
        #[serde(default)]
        transaction_id: TransactionId,
        ndp_instance_ids: Vec<NdpInstanceId>,
    },

    // Firmware indications
    NdpSetup {
        ndp_instance_id: NdpInstanceId,
        result: LowerResultCode,
    },
    NdpRequested(DataPathIndication),
    Terminated {
        target: TerminationTarget,
        #[serde(default = "default_reason")]
        reason: ServiceReason,
    },
    FollowupStatus {
        match_key: MatchKey,
        reason: ServiceReason,
    },
    MatchExpired {
        service_id: ServiceId,
    },
    DiscoveryEngine(DiscoveryEngineEvent),

    /// Emit a snapshot of the interface tables.
    Dump,
}

fn default_reason() -> ServiceReason {
    ServiceReason::UserRequest
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::Enable { .. } => "enable",
            Request::Disable { .. } => "disable",
            Request::SetConfig { .. } => "set_config",
            Request::GetCapabilities { .. } => "get_capabilities",
            Request::Publish(_) => "publish",
            Request::PublishCancel { .. } => "publish_cancel",
            Request::Subscribe(_) => "subscribe",
            Request::SubscribeCancel { .. } => "subscribe_cancel",
            Request::TransmitFollowup(_) => "transmit_followup",
            Request::DataPathInitiate(_) => "data_path_initiate",
            Request::DataPathRespond(_) => "data_path_respond",
            Request::DataPathEnd { .. } => "data_path_end",
            Request::NdpSetup { .. } => "ndp_setup",
            Request::NdpRequested(_) => "ndp_requested",
            Request::Terminated { .. } => "terminated",
            Request::FollowupStatus { .. } => "followup_status",
            Request::MatchExpired { .. } => "match_expired",
            Request::DiscoveryEngine(_) => "discovery_engine",
            Request::Dump => "dump",
        }
    }
}

/// Parses one script line. Returns `Ok(None)` for blank and comment lines.
pub fn parse_line(line_no: usize, line: &str) -> Result<Option<Request>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| NanmgrError::script(line_no, e.to_string()))
}
