//! Capacity limits of one NAN interface.

use serde::{Deserialize, Serialize};

/// Publish/subscribe identifier space is `1..=MAX_SERVICE_ID`.
pub const MAX_SERVICE_ID: u16 = 16;

/// NDP instance identifier space, and the number of peer-link slots.
pub const MAX_NDP_INSTANCES: u16 = 8;

/// Outstanding follow-up transmissions tracked at once.
pub const MAX_FOLLOWUP_REQUESTS: usize = 20;

/// Interface index of the first NDL data interface.
pub const DATA_IFINDEX_START: u16 = 5;

/// Largest identifier space a bitmap pool supports.
pub const MAX_POOL_CAPACITY: u16 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NanLimits {
    pub max_service_id: u16,
    pub max_ndp_instances: u16,
    pub max_followup_requests: usize,
    pub data_ifindex_start: u16,
}

impl Default for NanLimits {
    fn default() -> Self {
        Self {
            max_service_id: MAX_SERVICE_ID,
            max_ndp_instances: MAX_NDP_INSTANCES,
            max_followup_requests: MAX_FOLLOWUP_REQUESTS,
            data_ifindex_start: DATA_IFINDEX_START,
        }
    }
}

impl NanLimits {
    /// Checks the limits are usable, returning a description of the first
    /// problem found.
    pub fn check(&self) -> Result<(), String> {
        if self.max_service_id == 0 || self.max_service_id > MAX_POOL_CAPACITY {
            return Err(format!(
                "max_service_id must be in 1..={}, got {}",
                MAX_POOL_CAPACITY, self.max_service_id
            ));
        }
        if self.max_ndp_instances == 0 || self.max_ndp_instances > MAX_POOL_CAPACITY {
            return Err(format!(
                "max_ndp_instances must be in 1..={}, got {}",
                MAX_POOL_CAPACITY, self.max_ndp_instances
            ));
        }
        if self.max_followup_requests == 0 {
            return Err("max_followup_requests must be at least 1".to_string());
        }
        Ok(())
    }
}
