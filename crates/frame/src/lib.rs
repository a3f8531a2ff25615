//! Frames-in-flight primitives.
//!
//! [`FrameRing`] owns N copies of every per-frame resource and hands them out
//! round-robin. [`InFlightSemaphore`] caps how many of those copies the GPU may
//! be reading at once. Together they guarantee the CPU never writes a slot the
//! GPU has not finished with.
//!
//! # Invariants
//! - The slot used for frame `k` is `k mod N`.
//! - At most N [`FramePermit`]s exist at any instant; a permit is returned to
//!   the semaphore exactly once, when it is completed or dropped.
//! - The ring itself never locks. Exclusivity of the current slot follows from
//!   holding a permit before calling [`FrameRing::advance`].

mod ring;
mod semaphore;

pub use ring::FrameRing;
pub use semaphore::{FramePermit, InFlightSemaphore};

/// Errors from constructing frame primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("a frame ring needs at least one slot")]
    EmptyRing,
    #[error("an in-flight semaphore needs at least one permit")]
    ZeroCapacity,
}
