/// Recursive Artifact Verification
///
/// Checks every embedded signature and every structural invariant of an
/// artifact, depth first. An artifact is accepted or rejected as a unit:
/// if any embedded element fails, nothing is extracted from it.
///
/// The error taxonomy, in order of increasing severity:
/// 1. `WrongParty` - a party tag sits in the wrong position
/// 2. `InconsistentEmbedding` - two embedded copies of the same logical
///    artifact disagree
/// 3. `BadSignature` - a signature fails verification or was made by an
///    unregistered key
///
/// Checks run cheapest-first in the same order. On success the caller gets a
/// `VerifiedQuad` handle; downstream code may rely on it without
/// re-verifying.

use thiserror::Error;

use pact_crypto::PublicKey;

use crate::artifact::{
    Commitment, DoubleProof, Party, QuadProof, TripleProof,
};
use crate::confirm::{QuadConfirmation, QuadConfirmationFinal};

/// Verification failure, ordered by increasing severity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("wrong party tag in {context}: expected {expected}, got {got}")]
    WrongParty {
        context: &'static str,
        expected: Party,
        got: Party,
    },

    #[error("inconsistent embedding: {0}")]
    InconsistentEmbedding(&'static str),

    #[error("bad signature: {0}")]
    BadSignature(&'static str),
}

// ==================== KEY RESOLUTION ====================

/// Maps a party tag to the public key it is expected to sign with.
pub trait KeyResolver {
    fn resolve(&self, party: Party) -> Option<&PublicKey>;
}

/// The common two-party resolver.
#[derive(Debug, Clone)]
pub struct PartyKeys {
    pub alice: PublicKey,
    pub bob: PublicKey,
}

impl KeyResolver for PartyKeys {
    fn resolve(&self, party: Party) -> Option<&PublicKey> {
        match party {
            Party::Alice => Some(&self.alice),
            Party::Bob => Some(&self.bob),
        }
    }
}

/// Look up the registered key and require the artifact to embed the same one.
fn signing_key<'a>(
    resolver: &'a dyn KeyResolver,
    party: Party,
    embedded: &PublicKey,
    context: &'static str,
) -> Result<&'a PublicKey, VerifyError> {
    let key = resolver
        .resolve(party)
        .ok_or(VerifyError::BadSignature(context))?;
    if key != embedded {
        return Err(VerifyError::BadSignature(context));
    }
    Ok(key)
}

// ==================== LADDER VERIFIERS ====================

pub fn verify_commitment(
    c: &Commitment,
    resolver: &dyn KeyResolver,
) -> Result<(), VerifyError> {
    let key = signing_key(resolver, c.party, &c.public_key, "commitment signer")?;
    if !key.verify(&c.message, &c.signature) {
        return Err(VerifyError::BadSignature("commitment"));
    }
    Ok(())
}

pub fn verify_double(d: &DoubleProof, resolver: &dyn KeyResolver) -> Result<(), VerifyError> {
    if d.own_commitment.party != d.party {
        return Err(VerifyError::WrongParty {
            context: "double proof own commitment",
            expected: d.party,
            got: d.own_commitment.party,
        });
    }
    if d.other_commitment.party != d.party.other() {
        return Err(VerifyError::WrongParty {
            context: "double proof counterparty commitment",
            expected: d.party.other(),
            got: d.other_commitment.party,
        });
    }

    verify_commitment(&d.own_commitment, resolver)?;
    verify_commitment(&d.other_commitment, resolver)?;

    let key = signing_key(resolver, d.party, &d.public_key, "double proof signer")?;
    let payload = DoubleProof::signing_payload(&d.own_commitment, &d.other_commitment);
    if !key.verify(&payload, &d.signature) {
        return Err(VerifyError::BadSignature("double proof"));
    }
    Ok(())
}

pub fn verify_triple(t: &TripleProof, resolver: &dyn KeyResolver) -> Result<(), VerifyError> {
    if t.own_double.party != t.party {
        return Err(VerifyError::WrongParty {
            context: "triple proof own double",
            expected: t.party,
            got: t.own_double.party,
        });
    }
    if t.other_double.party != t.party.other() {
        return Err(VerifyError::WrongParty {
            context: "triple proof counterparty double",
            expected: t.party.other(),
            got: t.other_double.party,
        });
    }

    // Both embedded doubles carry copies of both commitments; the copies
    // must agree pairwise.
    if t.own_double.own_commitment != t.other_double.other_commitment
        || t.own_double.other_commitment != t.other_double.own_commitment
    {
        return Err(VerifyError::InconsistentEmbedding(
            "the two embedded double proofs disagree on the commitments",
        ));
    }

    verify_double(&t.own_double, resolver)?;
    verify_double(&t.other_double, resolver)?;

    let key = signing_key(resolver, t.party, &t.public_key, "triple proof signer")?;
    let payload = TripleProof::signing_payload(&t.own_double, &t.other_double);
    if !key.verify(&payload, &t.signature) {
        return Err(VerifyError::BadSignature("triple proof"));
    }
    Ok(())
}

/// Verify a quad proof completely and return a proof-of-validity handle.
pub fn verify_quad<'a>(
    q: &'a QuadProof,
    resolver: &dyn KeyResolver,
) -> Result<VerifiedQuad<'a>, VerifyError> {
    if q.own_triple.party != q.party {
        return Err(VerifyError::WrongParty {
            context: "quad proof own triple",
            expected: q.party,
            got: q.own_triple.party,
        });
    }
    if q.other_triple.party != q.party.other() {
        return Err(VerifyError::WrongParty {
            context: "quad proof counterparty triple",
            expected: q.party.other(),
            got: q.other_triple.party,
        });
    }

    if q.own_triple.own_double != q.other_triple.other_double
        || q.own_triple.other_double != q.other_triple.own_double
    {
        return Err(VerifyError::InconsistentEmbedding(
            "the two embedded triple proofs disagree on the double proofs",
        ));
    }

    verify_triple(&q.own_triple, resolver)?;
    verify_triple(&q.other_triple, resolver)?;

    let key = signing_key(resolver, q.party, &q.public_key, "quad proof signer")?;
    let payload = QuadProof::signing_payload(&q.own_triple, &q.other_triple);
    if !key.verify(&payload, &q.signature) {
        return Err(VerifyError::BadSignature("quad proof"));
    }

    Ok(VerifiedQuad { quad: q })
}

// ==================== CONFIRMATION VERIFIERS ====================

pub fn verify_quad_confirmation(
    qc: &QuadConfirmation,
    resolver: &dyn KeyResolver,
) -> Result<(), VerifyError> {
    if qc.quad.party != qc.party {
        return Err(VerifyError::WrongParty {
            context: "quad confirmation embedded quad",
            expected: qc.party,
            got: qc.quad.party,
        });
    }

    let expected_hash = QuadConfirmation::confirmation_hash(&qc.quad, qc.party);
    if expected_hash != qc.confirmation_hash {
        return Err(VerifyError::InconsistentEmbedding(
            "confirmation hash does not match the embedded quad",
        ));
    }

    verify_quad(&qc.quad, resolver)?;

    let key = signing_key(resolver, qc.party, &qc.public_key, "quad confirmation signer")?;
    let payload = QuadConfirmation::signing_payload(&qc.quad, &qc.confirmation_hash);
    if !key.verify(&payload, &qc.signature) {
        return Err(VerifyError::BadSignature("quad confirmation"));
    }
    Ok(())
}

pub fn verify_quad_confirmation_final(
    qcf: &QuadConfirmationFinal,
    resolver: &dyn KeyResolver,
) -> Result<(), VerifyError> {
    if qcf.own_confirmation.party != qcf.party {
        return Err(VerifyError::WrongParty {
            context: "final confirmation own half",
            expected: qcf.party,
            got: qcf.own_confirmation.party,
        });
    }
    if qcf.other_confirmation.party != qcf.party.other() {
        return Err(VerifyError::WrongParty {
            context: "final confirmation counterparty half",
            expected: qcf.party.other(),
            got: qcf.other_confirmation.party,
        });
    }

    // The two confirmed quads must embed each other's triples consistently.
    let own_quad = &qcf.own_confirmation.quad;
    let other_quad = &qcf.other_confirmation.quad;
    if own_quad.own_triple != other_quad.other_triple
        || own_quad.other_triple != other_quad.own_triple
    {
        return Err(VerifyError::InconsistentEmbedding(
            "the two confirmed quads disagree on the triple proofs",
        ));
    }

    verify_quad_confirmation(&qcf.own_confirmation, resolver)?;
    verify_quad_confirmation(&qcf.other_confirmation, resolver)?;

    let key = signing_key(resolver, qcf.party, &qcf.public_key, "final confirmation signer")?;
    let payload =
        QuadConfirmationFinal::signing_payload(&qcf.own_confirmation, &qcf.other_confirmation);
    if !key.verify(&payload, &qcf.signature) {
        return Err(VerifyError::BadSignature("final confirmation"));
    }
    Ok(())
}

// ==================== PROOF OF VALIDITY ====================

/// Handle proving a quad passed full verification. Borrowing the quad keeps
/// the handle from outliving the artifact it vouches for.
#[derive(Debug, Clone, Copy)]
pub struct VerifiedQuad<'a> {
    quad: &'a QuadProof,
}

/// The six-artifact chain extracted from a verified quad.
#[derive(Debug, Clone, Copy)]
pub struct ProofChain<'a> {
    pub own_commitment: &'a Commitment,
    pub other_commitment: &'a Commitment,
    pub own_double: &'a DoubleProof,
    pub other_double: &'a DoubleProof,
    pub own_triple: &'a TripleProof,
    pub other_triple: &'a TripleProof,
}

impl<'a> VerifiedQuad<'a> {
    pub fn quad(&self) -> &'a QuadProof {
        self.quad
    }

    /// Extract the full chain. Verification already established that every
    /// embedded copy agrees, so one canonical path through the tree is
    /// authoritative.
    pub fn chain(&self) -> ProofChain<'a> {
        let own_triple = &self.quad.own_triple;
        let other_triple = &self.quad.other_triple;
        let own_double = &own_triple.own_double;
        let other_double = &own_triple.other_double;
        ProofChain {
            own_commitment: &own_double.own_commitment,
            other_commitment: &own_double.other_commitment,
            own_double,
            other_double,
            own_triple,
            other_triple,
        }
    }

    /// The counterparty's quad is attested constructible by this one.
    pub fn attests_counterparty(&self) -> bool {
        self.quad.attests_counterparty_constructible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::TripleProof;
    use crate::testutil::{ladder, ladder_with_message};
    use pact_crypto::Signer;

    fn keys() -> PartyKeys {
        let l = ladder();
        PartyKeys {
            alice: l.alice.public_key(),
            bob: l.bob.public_key(),
        }
    }

    #[test]
    fn test_full_ladder_verifies() {
        let l = ladder();
        let keys = keys();
        verify_commitment(&l.c_a, &keys).unwrap();
        verify_double(&l.d_b, &keys).unwrap();
        verify_triple(&l.t_a, &keys).unwrap();
        verify_quad(&l.q_b, &keys).unwrap();
        verify_quad_confirmation(&l.qc_a, &keys).unwrap();
        verify_quad_confirmation_final(&l.qcf_b, &keys).unwrap();
    }

    #[test]
    fn test_extracted_chain_elements_verify_independently() {
        let l = ladder();
        let keys = keys();
        let verified = verify_quad(&l.q_a, &keys).unwrap();
        let chain = verified.chain();
        verify_commitment(chain.own_commitment, &keys).unwrap();
        verify_commitment(chain.other_commitment, &keys).unwrap();
        verify_double(chain.own_double, &keys).unwrap();
        verify_double(chain.other_double, &keys).unwrap();
        verify_triple(chain.own_triple, &keys).unwrap();
        verify_triple(chain.other_triple, &keys).unwrap();
        assert!(verified.attests_counterparty());
    }

    #[test]
    fn test_tampered_message_fails_as_bad_signature() {
        let l = ladder();
        let keys = keys();
        let mut c = l.c_a.clone();
        c.message = b"attack at noon".to_vec();
        assert_eq!(
            verify_commitment(&c, &keys),
            Err(VerifyError::BadSignature("commitment"))
        );
    }

    #[test]
    fn test_wrong_party_detected_before_signatures() {
        let l = ladder();
        let keys = keys();
        let mut d = l.d_a.clone();
        d.other_commitment = l.c_a.clone();
        assert!(matches!(
            verify_double(&d, &keys),
            Err(VerifyError::WrongParty { .. })
        ));
    }

    #[test]
    fn test_grafted_double_detected_as_inconsistent_embedding() {
        let l = ladder();
        let foreign = ladder_with_message(b"attack at noon");
        let keys = keys();

        // Re-sign a triple whose counterparty double comes from a different
        // run. Party tags are fine and the signature is genuine, so only the
        // embedding consistency check can catch it.
        let grafted =
            TripleProof::create(l.d_a.clone(), foreign.d_b.clone(), &l.alice).unwrap();
        assert_eq!(
            verify_triple(&grafted, &keys),
            Err(VerifyError::InconsistentEmbedding(
                "the two embedded double proofs disagree on the commitments"
            ))
        );
    }

    #[test]
    fn test_unregistered_key_rejected() {
        let l = ladder();
        let stranger = pact_crypto::Keypair::from_seed(&[99u8; 32]);
        let keys = PartyKeys {
            alice: stranger.public_key(),
            bob: l.bob.public_key(),
        };
        assert!(matches!(
            verify_commitment(&l.c_a, &keys),
            Err(VerifyError::BadSignature(_))
        ));
    }

    #[test]
    fn test_forged_quad_signature_rejected() {
        let l = ladder();
        let keys = keys();
        let mut q = l.q_a.clone();
        q.signature = l.q_b.signature.clone();
        assert_eq!(
            verify_quad(&q, &keys).err(),
            Some(VerifyError::BadSignature("quad proof"))
        );
    }

    #[test]
    fn test_confirmation_hash_mismatch_rejected() {
        let l = ladder();
        let keys = keys();
        let mut qc = l.qc_a.clone();
        qc.confirmation_hash = [0u8; 32];
        assert_eq!(
            verify_quad_confirmation(&qc, &keys),
            Err(VerifyError::InconsistentEmbedding(
                "confirmation hash does not match the embedded quad"
            ))
        );
    }
}
