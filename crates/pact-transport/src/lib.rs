//! Transport layer for the PACT coordination protocol.
//!
//! The protocol core only ever sees the abstract [`Transport`] contract: an
//! unreliable bidirectional channel that delivers frames intact or not at
//! all, with no delay bound, but fair-lossy (a frame submitted forever is
//! eventually delivered with probability 1). Continuous flooding turns that
//! into an eventual-delivery channel without any message being special.
//!
//! Two implementations ship here: a seeded in-memory channel pair with
//! configurable loss, reordering, and duplication for tests and simulation,
//! and a UDP datagram transport for real deployments.

pub mod contract;
pub mod memory;
pub mod udp;
pub mod wire;

pub use contract::{Transport, TransportError};
pub use memory::{ChannelPair, ChannelStats, FaultConfig, InMemoryTransport, StatsSnapshot};
pub use udp::UdpTransport;
pub use wire::{
    decode_artifact_frame, encode_artifact_frame, CodecError, Frame, DEFAULT_MAX_FRAME_BYTES,
};
