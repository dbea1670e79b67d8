//! Error types for the NAN state core.
//!
//! Every failure a table or the interface can report is a typed variant
//! here. None of them is fatal: the caller turns them into a HAL status via
//! [`NanError::status`].

use thiserror::Error;

use crate::status::HalStatus;

/// Result type alias for NAN core operations.
pub type NanResult<T> = Result<T, NanError>;

/// Which identifier namespace or table an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// Shared publish/subscribe service id space.
    Service,
    Publish,
    Subscribe,
    NdpInstance,
    PeerLink,
    Followup,
}

impl IdKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdKind::Service => "service",
            IdKind::Publish => "publish",
            IdKind::Subscribe => "subscribe",
            IdKind::NdpInstance => "ndp instance",
            IdKind::PeerLink => "peer link",
            IdKind::Followup => "followup",
        }
    }
}

impl std::fmt::Display for IdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NanError {
    /// An identifier pool or the peer-link table is at capacity.
    #[error("No free {pool} slot available")]
    Exhausted {
        /// The pool that ran out.
        pool: IdKind,
    },

    /// The caller referenced an identifier that is not currently allocated.
    #[error("Invalid {kind} id {id}")]
    InvalidId {
        kind: IdKind,
        id: u16,
    },

    /// A follow-up for this match is already outstanding, or the
    /// correlation table is full.
    #[error("Followup queue full for match {match_key}")]
    QueueFull {
        match_key: u16,
    },

    /// A resolve/transition lookup missed, usually a race with teardown.
    #[error("{kind} {id} not found")]
    NotFound {
        kind: IdKind,
        id: u16,
    },

    #[error("NAN is not enabled")]
    NotEnabled,

    #[error("NAN is already enabled")]
    AlreadyEnabled,

    /// The firmware-facing layer refused or failed a signal.
    #[error("Lower layer {operation} failed: {message}")]
    LowerLayer {
        operation: String,
        message: String,
    },
}

impl NanError {
    /// Creates an exhausted error.
    pub fn exhausted(pool: IdKind) -> Self {
        Self::Exhausted { pool }
    }

    /// Creates an invalid id error.
    pub fn invalid_id(kind: IdKind, id: u16) -> Self {
        Self::InvalidId { kind, id }
    }

    /// Creates a not found error.
    pub fn not_found(kind: IdKind, id: u16) -> Self {
        Self::NotFound { kind, id }
    }

    /// Creates a lower layer error.
    pub fn lower_layer(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LowerLayer {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Returns the HAL status reported for this error.
    ///
    /// Exhaustion of the shared service id space is reported as an invalid
    /// publish/subscribe id, which is what the HAL contract expects for
    /// "too many publishes/subscribes".
    pub fn status(&self) -> HalStatus {
        match self {
            NanError::Exhausted { pool: IdKind::Service | IdKind::Publish | IdKind::Subscribe } => {
                HalStatus::InvalidPublishSubscribeId
            }
            NanError::Exhausted { .. } => HalStatus::NoResourceAvailable,
            NanError::InvalidId { kind: IdKind::NdpInstance, .. }
            | NanError::NotFound { kind: IdKind::NdpInstance, .. } => HalStatus::InvalidNdpId,
            NanError::InvalidId { .. } => HalStatus::InvalidPublishSubscribeId,
            NanError::NotFound { .. } => HalStatus::InvalidParam,
            NanError::QueueFull { .. } => HalStatus::FollowupQueueFull,
            NanError::NotEnabled => HalStatus::NanNotAllowed,
            NanError::AlreadyEnabled => HalStatus::AlreadyEnabled,
            NanError::LowerLayer { .. } => HalStatus::InternalFailure,
        }
    }

    /// Returns true for conditions that are part of normal operation
    /// (capacity limits, races with teardown) rather than caller bugs.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            NanError::Exhausted { .. } | NanError::QueueFull { .. } | NanError::NotFound { .. }
        )
    }
}
