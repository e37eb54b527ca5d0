/// Confirmation Layer Artifacts
///
/// Two observation phases on top of the fixpoint, for deployments that want
/// mutual acknowledgement before acting: a `QuadConfirmation` states "I
/// observed the fixpoint", a `QuadConfirmationFinal` states "I observed that
/// we both observed it". The terminal `FinalReceipt` is a pure function of
/// the six artifacts and hashes identically on both sides, so its hash can
/// serve as a session-unique identifier downstream.

use serde::{Deserialize, Serialize};

use pact_crypto::{sha256, PublicKey, Signature, Signer};

use crate::artifact::{put_len_prefixed, tags, Party, ProofError, ProofResult, QuadProof};

// ==================== SIGNING DOMAINS ====================

const SEPARATOR: &[u8] = b"||";
const Q_CONF_DOMAIN: &[u8] = b"||Q_CONF||";
const Q_CONFIRMATION: &[u8] = b"||Q_CONFIRMATION";
const MUTUALLY_LOCKED_IN: &[u8] = b"||MUTUALLY_LOCKED_IN";
const FINAL_RECEIPT: &[u8] = b"FINAL_RECEIPT";

// ==================== LEVEL 5: QUAD CONFIRMATION ====================

/// Level 5: a signed observation of one's own fixpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadConfirmation {
    pub party: Party,
    pub quad: QuadProof,
    pub confirmation_hash: [u8; 32],
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl QuadConfirmation {
    /// Create and sign a confirmation over an already-constructed quad.
    pub fn create(quad: QuadProof, signer: &dyn Signer) -> Self {
        let party = quad.party;
        let confirmation_hash = Self::confirmation_hash(&quad, party);
        let payload = Self::signing_payload(&quad, &confirmation_hash);
        let signature = signer.sign(&payload);
        Self {
            party,
            quad,
            confirmation_hash,
            signature,
            public_key: signer.public_key(),
        }
    }

    /// `SHA-256(canonical(Q) || "||Q_CONF||" || party)`.
    pub fn confirmation_hash(quad: &QuadProof, party: Party) -> [u8; 32] {
        let mut material = quad.canonical_bytes();
        material.extend_from_slice(Q_CONF_DOMAIN);
        material.push(party.to_byte());
        sha256(&material)
    }

    pub fn signing_payload(quad: &QuadProof, confirmation_hash: &[u8; 32]) -> Vec<u8> {
        let mut payload = quad.canonical_bytes();
        payload.extend_from_slice(SEPARATOR);
        payload.extend_from_slice(confirmation_hash);
        payload.extend_from_slice(Q_CONFIRMATION);
        payload
    }

    /// Canonical octets: `0x05 | party | lp(Q) | conf_hash(32) | sig | pk`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let quad = self.quad.canonical_bytes();
        let mut buf = Vec::with_capacity(2 + 4 + quad.len() + 32 + 96);
        buf.push(tags::QUAD_CONFIRMATION);
        buf.push(self.party.to_byte());
        put_len_prefixed(&mut buf, &quad);
        buf.extend_from_slice(&self.confirmation_hash);
        buf.extend_from_slice(self.signature.as_bytes());
        buf.extend_from_slice(self.public_key.as_bytes());
        buf
    }

    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.canonical_bytes())
    }
}

// ==================== LEVEL 6: QUAD CONFIRMATION FINAL ====================

/// Level 6: a signed observation of mutual observation. Holding both
/// confirmations, the signer declares itself locked in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadConfirmationFinal {
    pub party: Party,
    pub own_confirmation: QuadConfirmation,
    pub other_confirmation: QuadConfirmation,
    pub ready: bool,
    pub signature: Signature,
    pub public_key: PublicKey,
}

impl QuadConfirmationFinal {
    pub fn create(
        own_confirmation: QuadConfirmation,
        other_confirmation: QuadConfirmation,
        signer: &dyn Signer,
    ) -> ProofResult<Self> {
        let party = own_confirmation.party;
        if other_confirmation.party == party {
            return Err(ProofError::PartyCollision(party));
        }
        let payload = Self::signing_payload(&own_confirmation, &other_confirmation);
        let signature = signer.sign(&payload);
        Ok(Self {
            party,
            own_confirmation,
            other_confirmation,
            ready: true,
            signature,
            public_key: signer.public_key(),
        })
    }

    pub fn signing_payload(own: &QuadConfirmation, other: &QuadConfirmation) -> Vec<u8> {
        let mut payload = own.canonical_bytes();
        payload.extend_from_slice(SEPARATOR);
        payload.extend_from_slice(&other.canonical_bytes());
        payload.extend_from_slice(MUTUALLY_LOCKED_IN);
        payload
    }

    /// Canonical octets:
    /// `0x06 | party | lp(QC_own) | lp(QC_other) | ready | sig | pk`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let own = self.own_confirmation.canonical_bytes();
        let other = self.other_confirmation.canonical_bytes();
        let mut buf = Vec::with_capacity(3 + 8 + own.len() + other.len() + 96);
        buf.push(tags::QUAD_CONFIRMATION_FINAL);
        buf.push(self.party.to_byte());
        put_len_prefixed(&mut buf, &own);
        put_len_prefixed(&mut buf, &other);
        buf.push(self.ready as u8);
        buf.extend_from_slice(self.signature.as_bytes());
        buf.extend_from_slice(self.public_key.as_bytes());
        buf
    }

    pub fn hash(&self) -> [u8; 32] {
        sha256(&self.canonical_bytes())
    }
}

// ==================== RECEIPTS ====================

/// The terminal output of the base protocol: both halves of the fixpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilateralReceipt {
    pub alice_quad: QuadProof,
    pub bob_quad: QuadProof,
}

impl BilateralReceipt {
    /// Assemble from the two quads in either order.
    pub fn new(first: QuadProof, second: QuadProof) -> ProofResult<Self> {
        if first.party == second.party {
            return Err(ProofError::PartyCollision(first.party));
        }
        let (alice_quad, bob_quad) = match first.party {
            Party::Alice => (first, second),
            Party::Bob => (second, first),
        };
        Ok(Self {
            alice_quad,
            bob_quad,
        })
    }

    /// Both quads must reference each other's triples.
    pub fn is_valid_fixpoint(&self) -> bool {
        self.alice_quad.other_triple.party == Party::Bob
            && self.bob_quad.other_triple.party == Party::Alice
    }
}

/// Deterministic receipt hash over the two final confirmations.
///
/// Hashes are sorted lexicographically before concatenation, so the result
/// is independent of argument order and both participants compute the same
/// 32 octets.
pub fn receipt_hash(a: &QuadConfirmationFinal, b: &QuadConfirmationFinal) -> [u8; 32] {
    let ha = a.hash();
    let hb = b.hash();
    let (lo, hi) = if ha <= hb { (ha, hb) } else { (hb, ha) };
    let mut material = Vec::with_capacity(64 + FINAL_RECEIPT.len());
    material.extend_from_slice(&lo);
    material.extend_from_slice(&hi);
    material.extend_from_slice(FINAL_RECEIPT);
    sha256(&material)
}

/// The terminal output of the full-solve protocol: the six-artifact bundle
/// plus the session-unique receipt hash. Built locally by each participant
/// from the two final confirmations; both builds are identical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReceipt {
    pub alice_quad: QuadProof,
    pub bob_quad: QuadProof,
    pub alice_confirmation: QuadConfirmation,
    pub bob_confirmation: QuadConfirmation,
    pub alice_final: QuadConfirmationFinal,
    pub bob_final: QuadConfirmationFinal,
    pub receipt_hash: [u8; 32],
}

impl FinalReceipt {
    /// Build the receipt from both final confirmations, in either order.
    ///
    /// The lower artifacts are extracted from the finals themselves; the two
    /// finals must embed the same confirmation chain.
    pub fn build(
        first: &QuadConfirmationFinal,
        second: &QuadConfirmationFinal,
    ) -> ProofResult<Self> {
        if first.party == second.party {
            return Err(ProofError::PartyCollision(first.party));
        }
        let (alice_final, bob_final) = match first.party {
            Party::Alice => (first.clone(), second.clone()),
            Party::Bob => (second.clone(), first.clone()),
        };

        if alice_final.other_confirmation != bob_final.own_confirmation
            || bob_final.other_confirmation != alice_final.own_confirmation
        {
            return Err(ProofError::InconsistentPair(
                "final confirmations embed different confirmation chains",
            ));
        }

        let alice_confirmation = alice_final.own_confirmation.clone();
        let bob_confirmation = bob_final.own_confirmation.clone();
        let alice_quad = alice_confirmation.quad.clone();
        let bob_quad = bob_confirmation.quad.clone();
        let receipt_hash = receipt_hash(&alice_final, &bob_final);

        Ok(Self {
            alice_quad,
            bob_quad,
            alice_confirmation,
            bob_confirmation,
            alice_final,
            bob_final,
            receipt_hash,
        })
    }
}
