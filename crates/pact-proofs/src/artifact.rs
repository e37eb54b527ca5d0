/// The Epistemic Proof Ladder
///
/// Signed, immutable artifacts at four levels. Each level-N artifact embeds
/// both level-(N-1) artifacts, so possession of any artifact implies
/// possession of the entire chain below it.
///
/// SAFETY INVARIANTS:
/// 1. Artifacts are created at most once per participant per run and never
///    mutated afterwards
/// 2. Canonical encoding is total, byte-deterministic, and injective per
///    variant; it is the only octet sequence that is signed or hashed
/// 3. Constructors validate party tags; a double proof whose two commitments
///    come from the same party cannot be built
/// 4. Ownership is a strict tree (a quad owns two triples, a triple owns two
///    doubles, a double owns two commitments); there are no cycles

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use pact_crypto::{sha256, PublicKey, Signature, Signer};

use crate::confirm::{QuadConfirmation, QuadConfirmationFinal};

// ==================== WIRE TAGS ====================

/// Single-octet variant tags. These lead every canonical encoding and double
/// as the frame tags on the wire.
pub mod tags {
    pub const COMMITMENT: u8 = 0x01;
    pub const DOUBLE: u8 = 0x02;
    pub const TRIPLE: u8 = 0x03;
    pub const QUAD: u8 = 0x04;
    pub const QUAD_CONFIRMATION: u8 = 0x05;
    pub const QUAD_CONFIRMATION_FINAL: u8 = 0x06;
    pub const DH_CONTRIBUTION: u8 = 0x10;
    pub const BFT_PROPOSAL: u8 = 0x11;
    pub const BFT_SHARE: u8 = 0x12;
    pub const BFT_COMMIT: u8 = 0x13;
    pub const ENCRYPTED: u8 = 0x20;
}

// ==================== SIGNING DOMAINS ====================

pub(crate) const BOTH_COMMITTED: &[u8] = b"BOTH_COMMITTED";
pub(crate) const BOTH_HAVE_DOUBLE: &[u8] = b"BOTH_HAVE_DOUBLE";
pub(crate) const FIXPOINT_ACHIEVED: &[u8] = b"FIXPOINT_ACHIEVED";

// ==================== ERROR TYPES ====================

/// Errors raised by artifact constructors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProofError {
    /// Both child artifacts carry the same party tag
    #[error("child artifacts must come from opposite parties, both are {0}")]
    PartyCollision(Party),

    /// A child artifact's party tag does not match its position
    #[error("child artifact at the {position} position carries party {got}, expected {expected}")]
    MisplacedChild {
        position: &'static str,
        expected: Party,
        got: Party,
    },

    /// Two artifacts that must embed the same chain do not
    #[error("inconsistent artifact pair: {0}")]
    InconsistentPair(&'static str),
}

pub type ProofResult<T> = Result<T, ProofError>;

// ==================== PARTY ====================

/// One of the two coordinating parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    Alice,
    Bob,
}

impl Party {
    /// The counterparty.
    pub fn other(self) -> Party {
        match self {
            Party::Alice => Party::Bob,
            Party::Bob => Party::Alice,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Party::Alice => 0x00,
            Party::Bob => 0x01,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Party> {
        match byte {
            0x00 => Some(Party::Alice),
            0x01 => Some(Party::Bob),
            _ => None,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Alice => write!(f, "ALICE"),
            Party::Bob => write!(f, "BOB"),
        }
    }
}

// ==================== ENCODING HELPERS ====================

/// Append a u32 big-endian length prefix followed by the bytes.
pub(crate) fn put_len_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

// ==================== LEVEL 1: COMMITMENT ====================

/// Level 1: a signed statement of intent.
///
/// `C_X = Sign_X(message)`. The message octets are application-supplied
/// ("I will attack at dawn if you agree" in the classical telling).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub party: Party,
    pub message: Vec<u8>,
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl Commitment {
    /// Create and sign a commitment.
    pub fn create(party: Party, message: Vec<u8>, signer: &dyn Signer) -> Self {
        let signature = signer.sign(&message);
        Self {
            party,
            message,
            signature,
            public_key: signer.public_key(),
        }
    }

    /// Canonical octets: `0x01 | party | msg_len(4 BE) | msg | sig(64) | pk(32)`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + 4 + self.message.len() + 64 + 32);
        buf.push(tags::COMMITMENT);
        buf.push(self.party.to_byte());
        put_len_prefixed(&mut buf, &self.message);
        buf.extend_from_slice(self.signature.as_bytes());
        buf.extend_from_slice(self.public_key.as_bytes());
        buf
    }

    /// SHA-256 of the canonical encoding.
    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.canonical_bytes())
    }
}

// ==================== LEVEL 2: DOUBLE PROOF ====================

/// Level 2: embeds both commitments.
///
/// `D_X = Sign_X(canonical(C_X) || canonical(C_Y) || "BOTH_COMMITTED")`,
/// proving "I know you committed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleProof {
    pub party: Party,
    pub own_commitment: Commitment,
    pub other_commitment: Commitment,
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl DoubleProof {
    /// Create and sign a double proof from the two commitments.
    pub fn create(
        own_commitment: Commitment,
        other_commitment: Commitment,
        signer: &dyn Signer,
    ) -> ProofResult<Self> {
        let party = own_commitment.party;
        if other_commitment.party == party {
            return Err(ProofError::PartyCollision(party));
        }
        let payload = Self::signing_payload(&own_commitment, &other_commitment);
        let signature = signer.sign(&payload);
        Ok(Self {
            party,
            own_commitment,
            other_commitment,
            signature,
            public_key: signer.public_key(),
        })
    }

    /// The exact octets covered by this proof's signature.
    pub fn signing_payload(own: &Commitment, other: &Commitment) -> Vec<u8> {
        let mut payload = own.canonical_bytes();
        payload.extend_from_slice(&other.canonical_bytes());
        payload.extend_from_slice(BOTH_COMMITTED);
        payload
    }

    /// Canonical octets: `0x02 | party | lp(C_own) | lp(C_other) | sig | pk`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let own = self.own_commitment.canonical_bytes();
        let other = self.other_commitment.canonical_bytes();
        let mut buf = Vec::with_capacity(2 + 8 + own.len() + other.len() + 96);
        buf.push(tags::DOUBLE);
        buf.push(self.party.to_byte());
        put_len_prefixed(&mut buf, &own);
        put_len_prefixed(&mut buf, &other);
        buf.extend_from_slice(self.signature.as_bytes());
        buf.extend_from_slice(self.public_key.as_bytes());
        buf
    }

    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.canonical_bytes())
    }
}

// ==================== LEVEL 3: TRIPLE PROOF ====================

/// Level 3: embeds both double proofs (and through them all four
/// commitments), proving "I know that you know I committed".
///
/// Receiving `T_Y` hands over `D_Y` for free; that embedded copy is what
/// makes the bilateral construction property work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleProof {
    pub party: Party,
    pub own_double: DoubleProof,
    pub other_double: DoubleProof,
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl TripleProof {
    pub fn create(
        own_double: DoubleProof,
        other_double: DoubleProof,
        signer: &dyn Signer,
    ) -> ProofResult<Self> {
        let party = own_double.party;
        if other_double.party == party {
            return Err(ProofError::PartyCollision(party));
        }
        let payload = Self::signing_payload(&own_double, &other_double);
        let signature = signer.sign(&payload);
        Ok(Self {
            party,
            own_double,
            other_double,
            signature,
            public_key: signer.public_key(),
        })
    }

    pub fn signing_payload(own: &DoubleProof, other: &DoubleProof) -> Vec<u8> {
        let mut payload = own.canonical_bytes();
        payload.extend_from_slice(&other.canonical_bytes());
        payload.extend_from_slice(BOTH_HAVE_DOUBLE);
        payload
    }

    /// Canonical octets: `0x03 | party | lp(D_own) | lp(D_other) | sig | pk`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let own = self.own_double.canonical_bytes();
        let other = self.other_double.canonical_bytes();
        let mut buf = Vec::with_capacity(2 + 8 + own.len() + other.len() + 96);
        buf.push(tags::TRIPLE);
        buf.push(self.party.to_byte());
        put_len_prefixed(&mut buf, &own);
        put_len_prefixed(&mut buf, &other);
        buf.extend_from_slice(self.signature.as_bytes());
        buf.extend_from_slice(self.public_key.as_bytes());
        buf
    }

    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.canonical_bytes())
    }
}

// ==================== LEVEL 4: QUAD PROOF ====================

/// Level 4: the epistemic fixpoint.
///
/// `Q_X = Sign_X(canonical(T_X) || canonical(T_Y) || "FIXPOINT_ACHIEVED")`.
///
/// Q is not a single artifact but half of a bilateral receipt pair: `Q_X`
/// contains `T_Y`, `T_Y` contains `D_X`, so the counterparty demonstrably
/// held everything needed to construct `Q_Y` the moment it signed `T_Y`.
/// A verified `Q_X` therefore attests that `Q_Y` exists or is constructible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadProof {
    pub party: Party,
    pub own_triple: TripleProof,
    pub other_triple: TripleProof,
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl QuadProof {
    pub fn create(
        own_triple: TripleProof,
        other_triple: TripleProof,
        signer: &dyn Signer,
    ) -> ProofResult<Self> {
        let party = own_triple.party;
        if other_triple.party == party {
            return Err(ProofError::PartyCollision(party));
        }
        let payload = Self::signing_payload(&own_triple, &other_triple);
        let signature = signer.sign(&payload);
        Ok(Self {
            party,
            own_triple,
            other_triple,
            signature,
            public_key: signer.public_key(),
        })
    }

    pub fn signing_payload(own: &TripleProof, other: &TripleProof) -> Vec<u8> {
        let mut payload = own.canonical_bytes();
        payload.extend_from_slice(&other.canonical_bytes());
        payload.extend_from_slice(FIXPOINT_ACHIEVED);
        payload
    }

    /// Canonical octets: `0x04 | party | lp(T_own) | lp(T_other) | sig | pk`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let own = self.own_triple.canonical_bytes();
        let other = self.other_triple.canonical_bytes();
        let mut buf = Vec::with_capacity(2 + 8 + own.len() + other.len() + 96);
        buf.push(tags::QUAD);
        buf.push(self.party.to_byte());
        put_len_prefixed(&mut buf, &own);
        put_len_prefixed(&mut buf, &other);
        buf.extend_from_slice(self.signature.as_bytes());
        buf.extend_from_slice(self.public_key.as_bytes());
        buf
    }

    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.canonical_bytes())
    }

    /// Check the structural half of the bilateral construction property:
    /// the embedded counterparty triple must carry our double proof, which
    /// is exactly what proves the counterparty could finish without us.
    pub fn attests_counterparty_constructible(&self) -> bool {
        self.other_triple.other_double.party == self.party
    }
}

// ==================== TAGGED VARIANT ====================

/// Any artifact of the ladder, tagged. The state machine and the wire codec
/// dispatch on this; the capability set (canonical bytes, hash, party,
/// level) is total across variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Artifact {
    Commitment(Commitment),
    Double(DoubleProof),
    Triple(TripleProof),
    Quad(QuadProof),
    QuadConfirmation(QuadConfirmation),
    QuadConfirmationFinal(QuadConfirmationFinal),
}

impl Artifact {
    /// Ladder level, 1 through 6. Higher levels embed all lower ones.
    pub fn level(&self) -> u8 {
        match self {
            Artifact::Commitment(_) => 1,
            Artifact::Double(_) => 2,
            Artifact::Triple(_) => 3,
            Artifact::Quad(_) => 4,
            Artifact::QuadConfirmation(_) => 5,
            Artifact::QuadConfirmationFinal(_) => 6,
        }
    }

    pub fn party(&self) -> Party {
        match self {
            Artifact::Commitment(c) => c.party,
            Artifact::Double(d) => d.party,
            Artifact::Triple(t) => t.party,
            Artifact::Quad(q) => q.party,
            Artifact::QuadConfirmation(qc) => qc.party,
            Artifact::QuadConfirmationFinal(qcf) => qcf.party,
        }
    }

    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Artifact::Commitment(c) => c.canonical_bytes(),
            Artifact::Double(d) => d.canonical_bytes(),
            Artifact::Triple(t) => t.canonical_bytes(),
            Artifact::Quad(q) => q.canonical_bytes(),
            Artifact::QuadConfirmation(qc) => qc.canonical_bytes(),
            Artifact::QuadConfirmationFinal(qcf) => qcf.canonical_bytes(),
        }
    }

    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.canonical_bytes())
    }

    /// The single-octet wire tag for this variant.
    pub fn tag(&self) -> u8 {
        match self {
            Artifact::Commitment(_) => tags::COMMITMENT,
            Artifact::Double(_) => tags::DOUBLE,
            Artifact::Triple(_) => tags::TRIPLE,
            Artifact::Quad(_) => tags::QUAD,
            Artifact::QuadConfirmation(_) => tags::QUAD_CONFIRMATION,
            Artifact::QuadConfirmationFinal(_) => tags::QUAD_CONFIRMATION_FINAL,
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Artifact::Commitment(_) => "C",
            Artifact::Double(_) => "D",
            Artifact::Triple(_) => "T",
            Artifact::Quad(_) => "Q",
            Artifact::QuadConfirmation(_) => "QC",
            Artifact::QuadConfirmationFinal(_) => "QCF",
        };
        write!(f, "{}_{}", name, self.party())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pact_crypto::Keypair;

    fn alice_signer() -> Keypair {
        Keypair::from_seed(&[1u8; 32])
    }

    fn bob_signer() -> Keypair {
        Keypair::from_seed(&[2u8; 32])
    }

    fn commitments() -> (Commitment, Commitment) {
        (
            Commitment::create(Party::Alice, b"attack at dawn".to_vec(), &alice_signer()),
            Commitment::create(Party::Bob, b"attack at dawn".to_vec(), &bob_signer()),
        )
    }

    /// Full ladder as both parties would construct it in a clean run.
    fn full_ladder() -> (QuadProof, QuadProof) {
        let alice = alice_signer();
        let bob = bob_signer();
        let (c_a, c_b) = commitments();

        let d_a = DoubleProof::create(c_a.clone(), c_b.clone(), &alice).unwrap();
        let d_b = DoubleProof::create(c_b, c_a, &bob).unwrap();

        let t_a = TripleProof::create(d_a.clone(), d_b.clone(), &alice).unwrap();
        let t_b = TripleProof::create(d_b, d_a, &bob).unwrap();

        let q_a = QuadProof::create(t_a.clone(), t_b.clone(), &alice).unwrap();
        let q_b = QuadProof::create(t_b, t_a, &bob).unwrap();
        (q_a, q_b)
    }

    #[test]
    fn test_party_other_is_involutive() {
        assert_eq!(Party::Alice.other(), Party::Bob);
        assert_eq!(Party::Bob.other().other(), Party::Bob);
    }

    #[test]
    fn test_commitment_signature_verifies() {
        let (c_a, _) = commitments();
        assert!(c_a.public_key.verify(&c_a.message, &c_a.signature));
    }

    #[test]
    fn test_double_proof_rejects_same_party_children() {
        let alice = alice_signer();
        let c1 = Commitment::create(Party::Alice, b"x".to_vec(), &alice);
        let c2 = Commitment::create(Party::Alice, b"y".to_vec(), &alice);
        assert_eq!(
            DoubleProof::create(c1, c2, &alice),
            Err(ProofError::PartyCollision(Party::Alice))
        );
    }

    #[test]
    fn test_canonical_bytes_deterministic() {
        let (q_a, _) = full_ladder();
        assert_eq!(q_a.canonical_bytes(), q_a.canonical_bytes());
        assert_eq!(q_a.hash(), q_a.hash());
    }

    #[test]
    fn test_canonical_bytes_distinct_across_levels() {
        let (q_a, _) = full_ladder();
        let t_a = q_a.own_triple.clone();
        let d_a = t_a.own_double.clone();
        let c_a = d_a.own_commitment.clone();
        let encodings = [
            c_a.canonical_bytes(),
            d_a.canonical_bytes(),
            t_a.canonical_bytes(),
            q_a.canonical_bytes(),
        ];
        for (i, a) in encodings.iter().enumerate() {
            for b in encodings.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_quad_embeds_full_chain() {
        let (q_a, q_b) = full_ladder();
        // Q_A's counterparty triple carries Alice's own double proof.
        assert_eq!(q_a.other_triple.other_double.party, Party::Alice);
        assert!(q_a.attests_counterparty_constructible());
        assert!(q_b.attests_counterparty_constructible());
        // The embedded chain is mutually consistent across the pair:
        // Q_A.T_B.D_A equals Q_B.T_A.D_A.
        assert_eq!(
            q_a.other_triple.other_double,
            q_b.own_triple.other_double.clone()
        );
    }

    #[test]
    fn test_artifact_levels_ordered() {
        let (q_a, _) = full_ladder();
        let t = Artifact::Triple(q_a.own_triple.clone());
        let q = Artifact::Quad(q_a);
        assert!(t.level() < q.level());
        assert_eq!(q.tag(), tags::QUAD);
    }

    #[test]
    fn test_hash_depends_only_on_encoding() {
        let (q_a, _) = full_ladder();
        let artifact = Artifact::Quad(q_a.clone());
        assert_eq!(artifact.hash(), sha256(&q_a.canonical_bytes()));
    }
}
