//! Per-worker bookkeeping shared across connections.
//!
//! All three structures are mutated only between suspension points of the
//! single-threaded worker; the mutexes exist to satisfy the borrow rules,
//! not to arbitrate real parallelism.

pub mod fiber;
pub mod registry;
pub mod timeout;

/// Identifies one live connection within a worker.
pub type ConnId = u64;
