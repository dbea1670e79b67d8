//! NAN session and data-path state core.
//!
//! Tracks publish/subscribe service ids, NDP instance allocation, the NDL
//! peer-link table and outstanding follow-up transmissions for one NAN
//! interface, and turns lifecycle transitions into ordered notifications.
//!
//! # Architecture
//!
//! ```text
//! HAL command ─► NanInterface ─► SessionRegistry ─► IdentifierPool (service, NDP)
//!                    │    ▲              └────────► PeerLinkTable
//!                    │    │          FollowupCorrelationTable
//!                    ▼    │          EventDispatcher ─► Notification outbox
//!              NanLowerLayer (firmware signals) ── indications ──┘
//! ```
//!
//! [`NanInterface`] holds one mutex around all tables; commands and
//! indications are applied one at a time. Ending or cancelling something
//! that is already gone is a no-op or an expected `NotFound`, which keeps
//! host cancels and firmware terminations racing for the same id safe.

pub mod dispatcher;
pub mod error;
pub mod followup;
pub mod id_pool;
pub mod interface;
pub mod limits;
pub mod lower_layer;
pub mod peer_link;
pub mod registry;
pub mod request;
pub mod status;

pub use dispatcher::{map_result_code, map_service_reason, EventDispatcher, NanEvent, Notification};
pub use error::{IdKind, NanError, NanResult};
pub use followup::{FollowupCorrelation, FollowupCorrelationTable};
pub use id_pool::IdentifierPool;
pub use interface::{InterfaceSnapshot, NanInterface, ServiceState};
pub use limits::{
    NanLimits, DATA_IFINDEX_START, MAX_FOLLOWUP_REQUESTS, MAX_NDP_INSTANCES, MAX_POOL_CAPACITY,
    MAX_SERVICE_ID,
};
pub use lower_layer::{NanLowerLayer, NdpResponse};
pub use peer_link::{LinkHandle, PeerLink, PeerLinkTable};
pub use registry::{
    DataPathParams, DataPathRole, DataPathSession, DataPathState, NdpInstanceId, RegistrySnapshot,
    ServiceGrant, ServiceId, ServiceKind, ServiceOptions, ServiceSession, SessionRegistry,
    TeardownReport,
};
pub use request::{
    CommandReply, ConfigRequest, DataPathIndication, DataPathInitiateRequest,
    DataPathRespondRequest, DiscoveryEngineEvent, DiscoveryEventKind, EnableRequest,
    FollowupRequest, MatchKey, NanCapabilities, PublishRequest, SubscribeRequest,
    TerminationTarget, TransactionId,
};
pub use status::{DataPathResponse, HalStatus, LowerResultCode, ResponseType, ServiceReason};
