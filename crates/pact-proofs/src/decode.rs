/// Canonical Decoding
///
/// The exact inverse of `canonical_bytes()` for every artifact variant.
/// Decoding is strict: every declared length must be satisfied, nested
/// artifacts must consume their length-prefixed slice completely, and no
/// trailing octets are tolerated. Together with the encoder this gives
/// `decode(encode(a)) = a` and rejects every ill-formed input without
/// partial effects.
///
/// Decoding checks shape only. Signatures and structural invariants are the
/// verifier's job; a decoded artifact is untrusted until verified.

use thiserror::Error;

use pact_crypto::{PublicKey, Signature};

use crate::artifact::{tags, Artifact, Commitment, DoubleProof, Party, QuadProof, TripleProof};
use crate::confirm::{QuadConfirmation, QuadConfirmationFinal};

/// Errors raised while decoding canonical octets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEnd(usize),

    #[error("unknown artifact tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("expected tag 0x{expected:02x}, found 0x{got:02x}")]
    WrongTag { expected: u8, got: u8 },

    #[error("invalid party octet 0x{0:02x}")]
    InvalidParty(u8),

    #[error("invalid boolean octet 0x{0:02x}")]
    InvalidBool(u8),

    #[error("{0} trailing octets after a complete artifact")]
    TrailingBytes(usize),

    #[error("invalid embedded key or signature: {0}")]
    InvalidMaterial(String),
}

// ==================== READER ====================

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
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

    fn u32_be(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn len_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u32_be()? as usize;
        self.take(len)
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn expect_tag(&mut self, expected: u8) -> Result<(), DecodeError> {
        let got = self.u8()?;
        if got != expected {
            return Err(DecodeError::WrongTag { expected, got });
        }
        Ok(())
    }

    fn party(&mut self) -> Result<Party, DecodeError> {
        let byte = self.u8()?;
        Party::from_byte(byte).ok_or(DecodeError::InvalidParty(byte))
    }

    fn signature(&mut self) -> Result<Signature, DecodeError> {
        let bytes = self.take(64)?;
        Signature::from_bytes(bytes).map_err(|e| DecodeError::InvalidMaterial(e.to_string()))
    }

    fn public_key(&mut self) -> Result<PublicKey, DecodeError> {
        let bytes = self.take(32)?;
        PublicKey::from_bytes(bytes).map_err(|e| DecodeError::InvalidMaterial(e.to_string()))
    }

    fn digest(&mut self) -> Result<[u8; 32], DecodeError> {
        let bytes = self.take(32)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn bool(&mut self) -> Result<bool, DecodeError> {
        match self.u8()? {
            0x00 => Ok(false),
            0x01 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }
}

fn strict<T>(
    bytes: &[u8],
    read: impl FnOnce(&mut Reader<'_>) -> Result<T, DecodeError>,
) -> Result<T, DecodeError> {
    let mut reader = Reader::new(bytes);
    let value = read(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(DecodeError::TrailingBytes(reader.remaining()));
    }
    Ok(value)
}

// ==================== PER-VARIANT DECODERS ====================

pub fn decode_commitment(bytes: &[u8]) -> Result<Commitment, DecodeError> {
    strict(bytes, read_commitment)
}

pub fn decode_double(bytes: &[u8]) -> Result<DoubleProof, DecodeError> {
    strict(bytes, read_double)
}

pub fn decode_triple(bytes: &[u8]) -> Result<TripleProof, DecodeError> {
    strict(bytes, read_triple)
}

pub fn decode_quad(bytes: &[u8]) -> Result<QuadProof, DecodeError> {
    strict(bytes, read_quad)
}

pub fn decode_quad_confirmation(bytes: &[u8]) -> Result<QuadConfirmation, DecodeError> {
    strict(bytes, read_quad_confirmation)
}

pub fn decode_quad_confirmation_final(
    bytes: &[u8],
) -> Result<QuadConfirmationFinal, DecodeError> {
    strict(bytes, read_quad_confirmation_final)
}

/// Decode any ladder artifact, dispatching on the leading variant tag.
pub fn decode_artifact(bytes: &[u8]) -> Result<Artifact, DecodeError> {
    let tag = *bytes.first().ok_or(DecodeError::UnexpectedEnd(0))?;
    match tag {
        tags::COMMITMENT => Ok(Artifact::Commitment(decode_commitment(bytes)?)),
        tags::DOUBLE => Ok(Artifact::Double(decode_double(bytes)?)),
        tags::TRIPLE => Ok(Artifact::Triple(decode_triple(bytes)?)),
        tags::QUAD => Ok(Artifact::Quad(decode_quad(bytes)?)),
        tags::QUAD_CONFIRMATION => Ok(Artifact::QuadConfirmation(decode_quad_confirmation(
            bytes,
        )?)),
        tags::QUAD_CONFIRMATION_FINAL => Ok(Artifact::QuadConfirmationFinal(
            decode_quad_confirmation_final(bytes)?,
        )),
        other => Err(DecodeError::UnknownTag(other)),
    }
}

fn read_commitment(r: &mut Reader<'_>) -> Result<Commitment, DecodeError> {
    r.expect_tag(tags::COMMITMENT)?;
    let party = r.party()?;
    let message = r.len_prefixed()?.to_vec();
    let signature = r.signature()?;
    let public_key = r.public_key()?;
    Ok(Commitment {
        party,
        message,
        signature,
        public_key,
    })
}

fn read_double(r: &mut Reader<'_>) -> Result<DoubleProof, DecodeError> {
    r.expect_tag(tags::DOUBLE)?;
    let party = r.party()?;
    let own_commitment = decode_commitment(r.len_prefixed()?)?;
    let other_commitment = decode_commitment(r.len_prefixed()?)?;
    let signature = r.signature()?;
    let public_key = r.public_key()?;
    Ok(DoubleProof {
        party,
        own_commitment,
        other_commitment,
        signature,
        public_key,
    })
}

fn read_triple(r: &mut Reader<'_>) -> Result<TripleProof, DecodeError> {
    r.expect_tag(tags::TRIPLE)?;
    let party = r.party()?;
    let own_double = decode_double(r.len_prefixed()?)?;
    let other_double = decode_double(r.len_prefixed()?)?;
    let signature = r.signature()?;
    let public_key = r.public_key()?;
    Ok(TripleProof {
        party,
        own_double,
        other_double,
        signature,
        public_key,
    })
}

fn read_quad(r: &mut Reader<'_>) -> Result<QuadProof, DecodeError> {
    r.expect_tag(tags::QUAD)?;
    let party = r.party()?;
    let own_triple = decode_triple(r.len_prefixed()?)?;
    let other_triple = decode_triple(r.len_prefixed()?)?;
    let signature = r.signature()?;
    let public_key = r.public_key()?;
    Ok(QuadProof {
        party,
        own_triple,
        other_triple,
        signature,
        public_key,
    })
}

fn read_quad_confirmation(r: &mut Reader<'_>) -> Result<QuadConfirmation, DecodeError> {
    r.expect_tag(tags::QUAD_CONFIRMATION)?;
    let party = r.party()?;
    let quad = decode_quad(r.len_prefixed()?)?;
    let confirmation_hash = r.digest()?;
    let signature = r.signature()?;
    let public_key = r.public_key()?;
    Ok(QuadConfirmation {
        party,
        quad,
        confirmation_hash,
        signature,
        public_key,
    })
}

fn read_quad_confirmation_final(
    r: &mut Reader<'_>,
) -> Result<QuadConfirmationFinal, DecodeError> {
    r.expect_tag(tags::QUAD_CONFIRMATION_FINAL)?;
    let party = r.party()?;
    let own_confirmation = decode_quad_confirmation(r.len_prefixed()?)?;
    let other_confirmation = decode_quad_confirmation(r.len_prefixed()?)?;
    let ready = r.bool()?;
    let signature = r.signature()?;
    let public_key = r.public_key()?;
    Ok(QuadConfirmationFinal {
        party,
        own_confirmation,
        other_confirmation,
        ready,
        signature,
        public_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ladder;
    use proptest::prelude::*;

    #[test]
    fn test_roundtrip_every_variant() {
        let l = ladder();
        let artifacts = vec![
            Artifact::Commitment(l.c_a.clone()),
            Artifact::Double(l.d_b.clone()),
            Artifact::Triple(l.t_a.clone()),
            Artifact::Quad(l.q_b.clone()),
            Artifact::QuadConfirmation(l.qc_a.clone()),
            Artifact::QuadConfirmationFinal(l.qcf_b.clone()),
        ];
        for artifact in artifacts {
            let encoded = artifact.canonical_bytes();
            let decoded = decode_artifact(&encoded).unwrap();
            assert_eq!(decoded, artifact);
        }
    }

    #[test]
    fn test_truncated_input_rejected() {
        let l = ladder();
        let encoded = l.q_a.canonical_bytes();
        for cut in [0, 1, 2, encoded.len() / 2, encoded.len() - 1] {
            assert!(decode_artifact(&encoded[..cut]).is_err());
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let l = ladder();
        let mut encoded = l.t_b.canonical_bytes();
        encoded.push(0x00);
        assert_eq!(
            decode_artifact(&encoded),
            Err(DecodeError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_unknown_tag_rejected() {
        assert_eq!(decode_artifact(&[0x7f]), Err(DecodeError::UnknownTag(0x7f)));
    }

    #[test]
    fn test_bad_party_octet_rejected() {
        let l = ladder();
        let mut encoded = l.c_a.canonical_bytes();
        encoded[1] = 0x09;
        assert_eq!(
            decode_artifact(&encoded),
            Err(DecodeError::InvalidParty(0x09))
        );
    }

    #[test]
    fn test_variant_tag_mismatch_rejected() {
        let l = ladder();
        let encoded = l.c_a.canonical_bytes();
        assert!(matches!(
            decode_double(&encoded),
            Err(DecodeError::WrongTag { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = decode_artifact(&bytes);
        }

        #[test]
        fn prop_commitment_roundtrip(message in proptest::collection::vec(any::<u8>(), 0..128)) {
            let signer = pact_crypto::Keypair::from_seed(&[9u8; 32]);
            let c = Commitment::create(crate::artifact::Party::Alice, message, &signer);
            prop_assert_eq!(decode_commitment(&c.canonical_bytes()).unwrap(), c);
        }
    }
}
