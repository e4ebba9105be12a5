//! Fiber pool
//!
//! Bounds how many connections may hold request-processing state at once.
//! A slot is checked out when request bytes arrive on a connection and
//! returned when processing completes; idle connections hold no slot.
//!
//! Slots are semaphore permits, so returning on every exit path is
//! guaranteed by drop and a slot can never be double-booked.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct FiberPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

/// A checked-out request-processing slot. Dropping it returns the slot
/// to the pool.
pub struct FiberSlot {
    _permit: OwnedSemaphorePermit,
}

impl FiberPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Immediate checkout; `None` when the pool is exhausted.
    pub fn try_checkout(&self) -> Option<FiberSlot> {
        self.permits
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| FiberSlot { _permit: permit })
    }

    /// Waits for a slot to free up. Connections stay idle (and remain
    /// eligible for timeout eviction) while they wait here.
    pub async fn checkout(&self) -> FiberSlot {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("fiber pool semaphore closed");
        FiberSlot { _permit: permit }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
