//! HAL-facing status and response codes, and the lower-layer outcome codes
//! they are derived from.

use serde::{Deserialize, Serialize};

/// Status code returned to the HAL with every response and notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HalStatus {
    Success = 0,
    InternalFailure = 1,
    ProtocolFailure = 2,
    InvalidPublishSubscribeId = 3,
    NoResourceAvailable = 4,
    InvalidParam = 5,
    InvalidNdpId = 7,
    NanNotAllowed = 8,
    NoOtaAck = 9,
    AlreadyEnabled = 10,
    FollowupQueueFull = 11,
}

impl HalStatus {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn is_success(&self) -> bool {
        matches!(self, HalStatus::Success)
    }
}

/// Which HAL command a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ResponseType {
    Enabled = 0,
    Disabled = 1,
    Publish = 2,
    PublishCancel = 3,
    TransmitFollowup = 4,
    Subscribe = 5,
    SubscribeCancel = 6,
    Config = 8,
    GetCapabilities = 12,
    DataPathInitiator = 15,
    DataPathResponder = 16,
    DataPathEnd = 17,
}

impl ResponseType {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Coarse outcome of a data-path negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DataPathResponse {
    Accept = 0,
    Reject = 1,
}

/// Outcome code reported by the firmware in a data-path setup indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LowerResultCode {
    Success,
    NdpRejected,
    NoOtaAck,
    InvalidAvailability,
    ImmutableUnacceptable,
    RejectedSecurityPolicy,
    NdlUnacceptable,
    TransmissionFailure,
    /// Any code this layer has no mapping for.
    Other(u16),
}

/// Reason carried by service-level indications (termination, follow-up
/// transmit status).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceReason {
    Timeout,
    CountReached,
    DiscoveryShutdown,
    UserRequest,
    FollowupTransmitSuccess,
    FollowupTransmitFailure,
    Other(u16),
}
