//! Translation of lifecycle transitions into ordered HAL notifications.

use nan_types::MacAddress;
use serde::Serialize;
use tracing::debug;

use crate::request::DiscoveryEventKind;
use crate::status::{DataPathResponse, HalStatus, LowerResultCode, ServiceReason};

/// Maps a data-path setup outcome to the response and status reported to
/// the HAL. Codes without a mapping are treated as internal failures.
pub fn map_result_code(code: LowerResultCode) -> (DataPathResponse, HalStatus) {
    match code {
        LowerResultCode::Success => (DataPathResponse::Accept, HalStatus::Success),
        LowerResultCode::NdpRejected => (DataPathResponse::Reject, HalStatus::Success),
        LowerResultCode::NoOtaAck => (DataPathResponse::Reject, HalStatus::NoOtaAck),
        LowerResultCode::InvalidAvailability
        | LowerResultCode::ImmutableUnacceptable
        | LowerResultCode::RejectedSecurityPolicy
        | LowerResultCode::NdlUnacceptable => {
            (DataPathResponse::Reject, HalStatus::ProtocolFailure)
        }
        LowerResultCode::TransmissionFailure | LowerResultCode::Other(_) => {
            (DataPathResponse::Reject, HalStatus::InternalFailure)
        }
    }
}

/// Maps the reason attached to a service indication to a HAL status.
pub fn map_service_reason(reason: ServiceReason) -> HalStatus {
    match reason {
        ServiceReason::Timeout
        | ServiceReason::CountReached
        | ServiceReason::DiscoveryShutdown
        | ServiceReason::UserRequest
        | ServiceReason::FollowupTransmitSuccess => HalStatus::Success,
        ServiceReason::FollowupTransmitFailure => HalStatus::ProtocolFailure,
        ServiceReason::Other(_) => HalStatus::InternalFailure,
    }
}

/// Lifecycle event delivered to the HAL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NanEvent {
    PublishTerminated {
        publish_id: u16,
        status: HalStatus,
    },
    SubscribeTerminated {
        subscribe_id: u16,
        status: HalStatus,
    },
    MatchExpired {
        service_id: u16,
    },
    /// A peer asked to set up a data path to one of our services.
    DataPathRequested {
        ndp_instance_id: u16,
        service_id: u16,
        peer: MacAddress,
    },
    DataPathEstablished {
        ndp_instance_id: u16,
        peer: MacAddress,
        status: HalStatus,
    },
    DataPathRejected {
        ndp_instance_id: u16,
        peer: MacAddress,
        status: HalStatus,
    },
    DataPathEnded {
        ndp_instance_id: u16,
    },
    FollowupDelivered {
        transaction_id: u16,
        status: HalStatus,
    },
    DiscoveryEngine {
        discovery_event: DiscoveryEventKind,
        address: MacAddress,
    },
    Disabled {
        status: HalStatus,
    },
}

impl NanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NanEvent::PublishTerminated { .. } => "publish_terminated",
            NanEvent::SubscribeTerminated { .. } => "subscribe_terminated",
            NanEvent::MatchExpired { .. } => "match_expired",
            NanEvent::DataPathRequested { .. } => "data_path_requested",
            NanEvent::DataPathEstablished { .. } => "data_path_established",
            NanEvent::DataPathRejected { .. } => "data_path_rejected",
            NanEvent::DataPathEnded { .. } => "data_path_ended",
            NanEvent::FollowupDelivered { .. } => "followup_delivered",
            NanEvent::DiscoveryEngine { .. } => "discovery_engine",
            NanEvent::Disabled { .. } => "disabled",
        }
    }

    /// Builds the setup-confirm event for a data path from the firmware's
    /// outcome code.
    pub fn data_path_confirm(ndp_instance_id: u16, peer: MacAddress, code: LowerResultCode) -> Self {
        let (response, status) = map_result_code(code);
        match response {
            DataPathResponse::Accept => NanEvent::DataPathEstablished {
                ndp_instance_id,
                peer,
                status,
            },
            DataPathResponse::Reject => NanEvent::DataPathRejected {
                ndp_instance_id,
                peer,
                status,
            },
        }
    }
}

/// An emitted event with its position in the outbound stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub seq: u64,
    #[serde(flatten)]
    pub event: NanEvent,
}

/// Ordered outbox of notifications awaiting delivery.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    next_seq: u64,
    outbox: Vec<Notification>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `event` and returns the notification record created for it.
    pub fn emit(&mut self, event: NanEvent) -> Notification {
        let notification = Notification {
            seq: self.next_seq,
            event,
        };
        self.next_seq += 1;
        debug!(
            "Queued {} notification seq {}",
            notification.event.name(),
            notification.seq
        );
        self.outbox.push(notification.clone());
        notification
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Hands every queued notification to the caller, oldest first.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }
}
