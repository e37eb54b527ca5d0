// BFT MESSAGE TYPES
// Three message kinds drive a round: a signed PROPOSAL from any node, a
// partial-signature SHARE from each arbitrator, and a COMMIT carrying the
// aggregated threshold signature. Canonical encodings follow the same
// tag-and-length discipline as the two-party artifacts and ride the same
// wire frames.

use serde::{Deserialize, Serialize};

use pact_crypto::{sha256, PublicKey, Signature, Signer, ThresholdSignature};
use pact_proofs::artifact::tags;
use pact_proofs::DecodeError;
use pact_transport::{CodecError, Frame};

/// Hash binding a value to its round: `SHA-256(round BE || value)`.
pub fn hash_round_value(round: u64, value: &[u8]) -> [u8; 32] {
    let mut material = Vec::with_capacity(8 + value.len());
    material.extend_from_slice(&round.to_be_bytes());
    material.extend_from_slice(value);
    sha256(&material)
}

fn put_len_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

// ==================== PROPOSAL ====================

/// A round proposal, signed by the proposing node's identity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub round: u64,
    pub value: Vec<u8>,
    pub proposer_id: u16,
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl Proposal {
    pub fn create(round: u64, value: Vec<u8>, proposer_id: u16, signer: &dyn Signer) -> Self {
        let payload = Self::signing_payload(round, &value, proposer_id);
        let signature = signer.sign(&payload);
        Self {
            round,
            value,
            proposer_id,
            signature,
            public_key: signer.public_key(),
        }
    }

    pub fn signing_payload(round: u64, value: &[u8], proposer_id: u16) -> Vec<u8> {
        let mut payload = Vec::with_capacity(10 + value.len());
        payload.extend_from_slice(&round.to_be_bytes());
        payload.extend_from_slice(&proposer_id.to_be_bytes());
        payload.extend_from_slice(value);
        payload
    }

    /// Verify the proposer signature against the expected identity key.
    pub fn verify(&self, expected_key: &PublicKey) -> bool {
        if &self.public_key != expected_key {
            return false;
        }
        let payload = Self::signing_payload(self.round, &self.value, self.proposer_id);
        expected_key.verify(&payload, &self.signature)
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.value.len() + 96);
        buf.push(tags::BFT_PROPOSAL);
        buf.extend_from_slice(&self.round.to_be_bytes());
        buf.extend_from_slice(&self.proposer_id.to_be_bytes());
        put_len_prefixed(&mut buf, &self.value);
        buf.extend_from_slice(self.signature.as_bytes());
        buf.extend_from_slice(self.public_key.as_bytes());
        buf
    }
}

// ==================== SHARE ====================

/// One node's partial signature over a round's value hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    pub round: u64,
    pub value_hash: [u8; 32],
    pub node_id: u16,
    pub share: Vec<u8>,
    pub public_key: PublicKey,
}

impl Share {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(44 + self.share.len() + 36);
        buf.push(tags::BFT_SHARE);
        buf.extend_from_slice(&self.round.to_be_bytes());
        buf.extend_from_slice(&self.value_hash);
        buf.extend_from_slice(&self.node_id.to_be_bytes());
        put_len_prefixed(&mut buf, &self.share);
        buf.extend_from_slice(self.public_key.as_bytes());
        buf
    }
}

// ==================== COMMIT ====================

/// A finalized round: the value plus its threshold proof. Any node holding
/// `t` valid shares may aggregate and emit one; no leader is involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub round: u64,
    pub value: Vec<u8>,
    pub proof: ThresholdSignature,
    pub aggregator_id: u16,
}

impl Commit {
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32 + self.value.len() + self.proof.signature.len());
        buf.push(tags::BFT_COMMIT);
        buf.extend_from_slice(&self.round.to_be_bytes());
        buf.extend_from_slice(&self.aggregator_id.to_be_bytes());
        put_len_prefixed(&mut buf, &self.value);
        put_len_prefixed(&mut buf, &self.proof.signature);
        buf.extend_from_slice(&(self.proof.contributing_nodes.len() as u16).to_be_bytes());
        for node in &self.proof.contributing_nodes {
            buf.extend_from_slice(&node.to_be_bytes());
        }
        buf.extend_from_slice(&(self.proof.threshold as u16).to_be_bytes());
        buf
    }
}

// ==================== WIRE ====================

/// Any BFT message, tagged for the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BftMessage {
    Proposal(Proposal),
    Share(Share),
    Commit(Commit),
}

impl BftMessage {
    pub fn tag(&self) -> u8 {
        match self {
            BftMessage::Proposal(_) => tags::BFT_PROPOSAL,
            BftMessage::Share(_) => tags::BFT_SHARE,
            BftMessage::Commit(_) => tags::BFT_COMMIT,
        }
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            BftMessage::Proposal(p) => p.canonical_bytes(),
            BftMessage::Share(s) => s.canonical_bytes(),
            BftMessage::Commit(c) => c.canonical_bytes(),
        }
    }

    /// Encode as a complete wire frame.
    pub fn encode_frame(&self) -> Vec<u8> {
        Frame::new(self.tag(), self.canonical_bytes()).encode()
    }

    /// Decode a datagram expected to carry a BFT message.
    pub fn decode_frame(bytes: &[u8], max_payload: usize) -> Result<Self, CodecError> {
        let frame = Frame::decode(bytes, max_payload)?;
        let message = Self::decode_canonical(&frame.payload)?;
        if frame.tag != message.tag() {
            return Err(CodecError::TagMismatch {
                tag: frame.tag,
                payload_tag: message.tag(),
            });
        }
        Ok(message)
    }

    /// Decode canonical octets, dispatching on the leading tag.
    pub fn decode_canonical(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut r = MessageReader::new(bytes);
        let tag = r.u8()?;
        let message = match tag {
            tags::BFT_PROPOSAL => BftMessage::Proposal(Proposal {
                round: r.u64_be()?,
                proposer_id: r.u16_be()?,
                value: r.len_prefixed()?.to_vec(),
                signature: r.signature()?,
                public_key: r.public_key()?,
            }),
            tags::BFT_SHARE => BftMessage::Share(Share {
                round: r.u64_be()?,
                value_hash: r.digest()?,
                node_id: r.u16_be()?,
                share: r.len_prefixed()?.to_vec(),
                public_key: r.public_key()?,
            }),
            tags::BFT_COMMIT => {
                let round = r.u64_be()?;
                let aggregator_id = r.u16_be()?;
                let value = r.len_prefixed()?.to_vec();
                let signature = r.len_prefixed()?.to_vec();
                let node_count = r.u16_be()? as usize;
                let mut contributing_nodes = Vec::with_capacity(node_count);
                for _ in 0..node_count {
                    contributing_nodes.push(r.u16_be()?);
                }
                let threshold = r.u16_be()? as usize;
                BftMessage::Commit(Commit {
                    round,
                    value,
                    proof: ThresholdSignature {
                        signature,
                        contributing_nodes,
                        threshold,
                    },
                    aggregator_id,
                })
            }
            other => return Err(DecodeError::UnknownTag(other)),
        };
        r.finish()?;
        Ok(message)
    }
}

/// Minimal strict reader over canonical BFT octets.
struct MessageReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> MessageReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.bytes.len() {
            return Err(DecodeError::UnexpectedEnd(self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16_be(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u64_be(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    fn len_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let b = self.take(4)?;
        let len = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize;
        self.take(len)
    }

    fn digest(&mut self) -> Result<[u8; 32], DecodeError> {
        let b = self.take(32)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(b);
        Ok(out)
    }

    fn signature(&mut self) -> Result<Signature, DecodeError> {
        let b = self.take(64)?;
        Signature::from_bytes(b).map_err(|e| DecodeError::InvalidMaterial(e.to_string()))
    }

    fn public_key(&mut self) -> Result<PublicKey, DecodeError> {
        let b = self.take(32)?;
        PublicKey::from_bytes(b).map_err(|e| DecodeError::InvalidMaterial(e.to_string()))
    }

    fn finish(&self) -> Result<(), DecodeError> {
        let remaining = self.bytes.len() - self.pos;
        if remaining != 0 {
            return Err(DecodeError::TrailingBytes(remaining));
        }
        Ok(())
    }
}
