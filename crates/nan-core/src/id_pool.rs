//! Bitmap identifier pool for service and NDP instance ids.
//!
//! Identifiers run `1..=capacity`; zero is reserved to mean "auto-assign".
//! Allocation scans forward from a hint and wraps back to 1, so freed low
//! ids are not starved and recently freed ids are not handed straight back
//! when the rotation cursor is used. Releasing the most recent grant rewinds
//! the cursor, so an allocation that is undone leaves the pool exactly as it
//! was.

use tracing::debug;

use crate::error::{IdKind, NanError, NanResult};
use crate::limits::MAX_POOL_CAPACITY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierPool {
    kind: IdKind,
    capacity: u16,
    /// Bit `n` set means id `n` is allocated. Bit 0 is never set.
    bitmap: u64,
    /// Where `allocate_next` starts scanning.
    next_hint: u16,
}

impl IdentifierPool {
    /// Creates an empty pool of ids `1..=capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or larger than [`MAX_POOL_CAPACITY`].
    pub fn new(kind: IdKind, capacity: u16) -> Self {
        assert!(
            capacity > 0 && capacity <= MAX_POOL_CAPACITY,
            "identifier pool capacity must be in 1..={MAX_POOL_CAPACITY}, got {capacity}"
        );
        Self {
            kind,
            capacity,
            bitmap: 0,
            next_hint: 1,
        }
    }

    pub fn kind(&self) -> IdKind {
        self.kind
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Allocates the first free id at or after `start_hint`, wrapping to 1.
    ///
    /// A hint of 0 or beyond the capacity starts the scan at 1.
    pub fn allocate(&mut self, start_hint: u16) -> NanResult<u16> {
        let start = if start_hint == 0 || start_hint > self.capacity {
            1
        } else {
            start_hint
        };

        let found = (start..=self.capacity)
            .chain(1..start)
            .find(|&id| !self.is_allocated(id));

        match found {
            Some(id) => {
                self.bitmap |= 1u64 << id;
                self.next_hint = self.cursor_after(id);
                debug!("Allocated {} id {}", self.kind, id);
                Ok(id)
            }
            None => Err(NanError::exhausted(self.kind)),
        }
    }

    /// Allocates starting from the rotation cursor left by the previous
    /// allocation.
    pub fn allocate_next(&mut self) -> NanResult<u16> {
        self.allocate(self.next_hint)
    }

    pub fn is_allocated(&self, id: u16) -> bool {
        id != 0 && id <= self.capacity && self.bitmap & (1u64 << id) != 0
    }

    /// Returns an id to the pool. Releasing a free or out-of-range id does
    /// nothing. If `id` was the latest grant the cursor moves back onto it.
    pub fn release(&mut self, id: u16) {
        if self.is_allocated(id) {
            self.bitmap &= !(1u64 << id);
            if self.next_hint == self.cursor_after(id) {
                self.next_hint = id;
            }
            debug!("Released {} id {}", self.kind, id);
        }
    }

    fn cursor_after(&self, id: u16) -> u16 {
        (id + 1) % (self.capacity + 1)
    }

    pub fn allocated_count(&self) -> usize {
        self.bitmap.count_ones() as usize
    }

    pub fn is_exhausted(&self) -> bool {
        self.allocated_count() == usize::from(self.capacity)
    }

    /// Allocated ids in ascending order.
    pub fn iter_allocated(&self) -> impl Iterator<Item = u16> + '_ {
        (1..=self.capacity).filter(move |&id| self.is_allocated(id))
    }

    /// Releases every id and resets the rotation cursor.
    pub fn clear(&mut self) {
        self.bitmap = 0;
        self.next_hint = 1;
    }
}
