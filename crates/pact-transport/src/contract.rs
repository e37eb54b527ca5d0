//! The abstract transport contract.
//!
//! One value of the implementing type is one directed endpoint of a
//! bidirectional channel. Required semantics, in decreasing strictness:
//!
//! 1. Frames are delivered intact or not at all; the codec drops anything
//!    corrupt.
//! 2. There is no upper bound on the delay of an individual frame.
//! 3. Fair-lossy: a frame submitted infinitely often is delivered at least
//!    once with probability 1.
//!
//! Nothing stronger may be assumed. In particular, bounded delay must never
//! be relied on: fair-lossy gives eventual delivery only.

use async_trait::async_trait;
use thiserror::Error;

/// The transport is unusable. The flooding driver treats this exactly like
/// deadline expiry: abort the machine, return its decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport closed: {0}")]
    Closed(String),
}

/// One endpoint of an unreliable bidirectional channel.
#[async_trait]
pub trait Transport: Send {
    /// Submit a frame. Submission succeeding says nothing about delivery;
    /// the frame may be silently lost in transit.
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Await the next inbound frame.
    async fn recv(&mut self) -> Result<Vec<u8>, TransportError>;
}
