//! Correlation of outstanding follow-up transmissions with their HAL
//! transaction ids.

use serde::Serialize;
use tracing::debug;

use crate::error::{IdKind, NanError, NanResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FollowupCorrelation {
    pub match_key: u16,
    pub transaction_tag: u16,
}

/// Fixed-capacity table allowing one outstanding follow-up per match.
#[derive(Debug, Clone)]
pub struct FollowupCorrelationTable {
    entries: Vec<FollowupCorrelation>,
    capacity: usize,
}

impl FollowupCorrelationTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Records a follow-up for `match_key`.
    ///
    /// Fails with `QueueFull` if the match already has one outstanding or
    /// every slot is taken.
    pub fn register(&mut self, match_key: u16, transaction_tag: u16) -> NanResult<()> {
        if self.contains(match_key) || self.entries.len() >= self.capacity {
            return Err(NanError::QueueFull { match_key });
        }
        self.entries.push(FollowupCorrelation {
            match_key,
            transaction_tag,
        });
        debug!(
            "Followup for match {} registered as transaction {}",
            match_key, transaction_tag
        );
        Ok(())
    }

    /// Removes the entry for `match_key` and returns its transaction tag.
    pub fn resolve_and_remove(&mut self, match_key: u16) -> NanResult<u16> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.match_key == match_key)
            .ok_or_else(|| NanError::not_found(IdKind::Followup, match_key))?;
        Ok(self.entries.swap_remove(pos).transaction_tag)
    }

    pub fn contains(&self, match_key: u16) -> bool {
        self.entries.iter().any(|e| e.match_key == match_key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FollowupCorrelation] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
