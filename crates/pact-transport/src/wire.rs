// WIRE CODEC
// Tagged, length-prefixed frames:
//
//   +--------+-----------+------------------+
//   | tag(1) | len(4 BE) | payload(len)     |
//   +--------+-----------+------------------+
//
// The payload is the canonical encoding of the tagged variant. Encoding and
// decoding are total inverses on well-formed inputs; every ill-formed input
// is rejected without partial effects, and frames whose declared length
// exceeds the configured ceiling are dropped before the payload is touched.

use thiserror::Error;

use pact_proofs::artifact::tags;
use pact_proofs::{decode_artifact, Artifact, DecodeError};

/// Default ceiling for decoded payload length (2^20 octets).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1 << 20;

/// Octets of tag + length prefix.
pub const FRAME_HEADER_BYTES: usize = 5;

/// Errors raised by the wire codec. All are recovered locally: the frame is
/// dropped and the stream continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("frame too short: {0} octets")]
    Truncated(usize),

    #[error("unknown frame tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("declared payload length {declared} exceeds ceiling {ceiling}")]
    LengthOverflow { declared: usize, ceiling: usize },

    #[error("declared payload length {declared} does not match {actual} payload octets")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("frame tag 0x{tag:02x} does not match the payload variant 0x{payload_tag:02x}")]
    TagMismatch { tag: u8, payload_tag: u8 },

    #[error("malformed payload: {0}")]
    Payload(#[from] DecodeError),
}

fn known_tag(tag: u8) -> bool {
    matches!(
        tag,
        tags::COMMITMENT
            | tags::DOUBLE
            | tags::TRIPLE
            | tags::QUAD
            | tags::QUAD_CONFIRMATION
            | tags::QUAD_CONFIRMATION_FINAL
            | tags::DH_CONTRIBUTION
            | tags::BFT_PROPOSAL
            | tags::BFT_SHARE
            | tags::BFT_COMMIT
            | tags::ENCRYPTED
    )
}

/// A raw frame: variant tag plus opaque payload octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub tag: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(tag: u8, payload: Vec<u8>) -> Self {
        Self { tag, payload }
    }

    /// Serialize to wire octets.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FRAME_HEADER_BYTES + self.payload.len());
        out.push(self.tag);
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse one datagram as a frame. The datagram must contain exactly one
    /// frame; trailing octets are a length mismatch.
    pub fn decode(bytes: &[u8], max_payload: usize) -> Result<Self, CodecError> {
        if bytes.len() < FRAME_HEADER_BYTES {
            return Err(CodecError::Truncated(bytes.len()));
        }
        let tag = bytes[0];
        if !known_tag(tag) {
            return Err(CodecError::UnknownTag(tag));
        }
        let declared =
            u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        if declared > max_payload {
            return Err(CodecError::LengthOverflow {
                declared,
                ceiling: max_payload,
            });
        }
        let actual = bytes.len() - FRAME_HEADER_BYTES;
        if declared != actual {
            return Err(CodecError::LengthMismatch { declared, actual });
        }
        Ok(Self {
            tag,
            payload: bytes[FRAME_HEADER_BYTES..].to_vec(),
        })
    }
}

/// Encode a ladder artifact as a complete frame.
pub fn encode_artifact_frame(artifact: &Artifact) -> Vec<u8> {
    Frame::new(artifact.tag(), artifact.canonical_bytes()).encode()
}

/// Decode a datagram expected to carry a ladder artifact.
///
/// The frame tag must agree with the variant tag inside the canonical
/// payload; a disagreement means the frame was reassembled wrong or forged,
/// and the whole frame is rejected.
pub fn decode_artifact_frame(
    bytes: &[u8],
    max_payload: usize,
) -> Result<Artifact, CodecError> {
    let frame = Frame::decode(bytes, max_payload)?;
    let artifact = decode_artifact(&frame.payload)?;
    if frame.tag != artifact.tag() {
        return Err(CodecError::TagMismatch {
            tag: frame.tag,
            payload_tag: artifact.tag(),
        });
    }
    Ok(artifact)
}
