// TWO-PARTY LADDER STATE MACHINE
// Drives one participant from commitment to fixpoint by creating and
// receiving proof artifacts.
//
// SAFETY INVARIANTS:
// 1. The state variable is monotone along
//    INIT < COMMITMENT < DOUBLE < TRIPLE < QUAD < COMPLETE;
//    COMPLETE and ABORTED are absorbing
// 2. receive() is idempotent: duplicates, self-authored artifacts, and
//    anything that fails verification are dropped without effect
// 3. An artifact that fails any check is rejected as a unit together with
//    everything it embeds; no partial extraction
// 4. Each own-artifact is constructed at most once per run

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use pact_crypto::{PublicKey, Signer};
use pact_proofs::{
    verify_commitment, verify_double, verify_quad, verify_triple, Artifact, BilateralReceipt,
    Commitment, DoubleProof, Party, PartyKeys, QuadProof, TripleProof,
};

/// Ladder machine states.
///
/// Transitions follow proof escalation: each rung is reached by constructing
/// the own-artifact at that level, which in turn requires the counterparty's
/// artifact one level below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolState {
    /// Before the commitment exists (never observable from outside)
    Init,

    /// Flooding C_own, awaiting anything from the counterparty
    Commitment,

    /// Flooding D_own
    Double,

    /// Flooding T_own
    Triple,

    /// Q_own constructed (passed through instantly on the way to COMPLETE)
    Quad,

    /// Fixpoint achieved; decision is ATTACK
    Complete,

    /// Deadline passed or transport failed without fixpoint; decision is ABORT
    Aborted,
}

impl ProtocolState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProtocolState::Complete | ProtocolState::Aborted)
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolState::Init => write!(f, "INIT"),
            ProtocolState::Commitment => write!(f, "COMMITMENT"),
            ProtocolState::Double => write!(f, "DOUBLE"),
            ProtocolState::Triple => write!(f, "TRIPLE"),
            ProtocolState::Quad => write!(f, "QUAD"),
            ProtocolState::Complete => write!(f, "COMPLETE"),
            ProtocolState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Final protocol decision. The only two user-visible outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Attack,
    Abort,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Attack => write!(f, "ATTACK"),
            Decision::Abort => write!(f, "ABORT"),
        }
    }
}

/// Result of delivering one artifact to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The machine advanced to the contained state
    Advanced(ProtocolState),

    /// Valid and new, but the state did not move
    Unchanged,

    /// Silently dropped: self-authored, duplicate, aborted machine, or
    /// failed verification
    Ignored,
}

/// An outbound artifact wrapped with flooding metadata. The sequence number
/// only distinguishes re-emissions; receivers ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloodMessage {
    pub sender: Party,
    pub artifact: Artifact,
    pub sequence: u64,
}

/// One participant's ladder state machine.
///
/// Holds at most one own-artifact and one counterparty-artifact per level,
/// each assigned exactly once per run. The machine performs no I/O; the
/// flooding driver moves its messages.
pub struct LadderMachine {
    party: Party,
    signer: Arc<dyn Signer>,
    keys: PartyKeys,
    state: ProtocolState,

    own_commitment: Option<Commitment>,
    other_commitment: Option<Commitment>,
    own_double: Option<DoubleProof>,
    other_double: Option<DoubleProof>,
    own_triple: Option<TripleProof>,
    other_triple: Option<TripleProof>,
    own_quad: Option<QuadProof>,
    other_quad: Option<QuadProof>,

    sequence: u64,
}

impl LadderMachine {
    /// Create a machine and eagerly construct the commitment.
    pub fn new(
        party: Party,
        signer: Arc<dyn Signer>,
        counterparty_key: PublicKey,
        commitment_message: Vec<u8>,
    ) -> Self {
        let own_key = signer.public_key();
        let keys = match party {
            Party::Alice => PartyKeys {
                alice: own_key,
                bob: counterparty_key,
            },
            Party::Bob => PartyKeys {
                alice: counterparty_key,
                bob: own_key,
            },
        };

        let commitment = Commitment::create(party, commitment_message, signer.as_ref());
        info!("{}: commitment created, flooding begins", party);

        Self {
            party,
            signer,
            keys,
            state: ProtocolState::Commitment,
            own_commitment: Some(commitment),
            other_commitment: None,
            own_double: None,
            other_double: None,
            own_triple: None,
            other_triple: None,
            own_quad: None,
            other_quad: None,
            sequence: 0,
        }
    }

    pub fn party(&self) -> Party {
        self.party
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == ProtocolState::Complete
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn own_quad(&self) -> Option<&QuadProof> {
        self.own_quad.as_ref()
    }

    pub fn other_quad(&self) -> Option<&QuadProof> {
        self.other_quad.as_ref()
    }

    pub(crate) fn signer(&self) -> &Arc<dyn Signer> {
        &self.signer
    }

    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub(crate) fn keys(&self) -> &PartyKeys {
        &self.keys
    }

    /// The single highest-level own artifact, wrapped for flooding. Every
    /// lower artifact is embedded in it, so nothing else needs the wire.
    /// Returns `None` once aborted.
    pub fn outbound(&mut self) -> Option<FloodMessage> {
        if self.state == ProtocolState::Aborted {
            return None;
        }
        let artifact = if let Some(q) = &self.own_quad {
            Artifact::Quad(q.clone())
        } else if let Some(t) = &self.own_triple {
            Artifact::Triple(t.clone())
        } else if let Some(d) = &self.own_double {
            Artifact::Double(d.clone())
        } else if let Some(c) = &self.own_commitment {
            Artifact::Commitment(c.clone())
        } else {
            return None;
        };
        let sequence = self.next_sequence();
        Some(FloodMessage {
            sender: self.party,
            artifact,
            sequence,
        })
    }

    /// Deliver a received artifact.
    ///
    /// Records the artifact and every extractable lower-level artifact, then
    /// constructs every own-artifact that became derivable, in level order.
    pub fn receive(&mut self, artifact: &Artifact) -> Transition {
        // Aborted machines accept nothing. Complete machines still record
        // counterparty artifacts (the state can no longer move) so the
        // driver can observe that the counterparty finished too.
        if self.state == ProtocolState::Aborted {
            return Transition::Ignored;
        }
        if artifact.party() == self.party {
            debug!("{}: dropped self-authored {}", self.party, artifact);
            return Transition::Ignored;
        }

        let before = self.state;
        let accepted = match artifact {
            Artifact::Commitment(c) => self.receive_commitment(c),
            Artifact::Double(d) => self.receive_double(d),
            Artifact::Triple(t) => self.receive_triple(t),
            Artifact::Quad(q) => self.receive_quad(q),
            // Confirmation artifacts belong to the full-solve layer.
            Artifact::QuadConfirmation(_) | Artifact::QuadConfirmationFinal(_) => false,
        };

        if !accepted {
            return Transition::Ignored;
        }
        self.cascade();
        if self.state != before {
            Transition::Advanced(self.state)
        } else {
            Transition::Unchanged
        }
    }

    /// ATTACK as soon as the own quad exists. Sound because Q_own embeds
    /// T_other, which embeds D_own: the counterparty demonstrably held
    /// everything needed to finish, and the driver keeps flooding T_own.
    pub fn decision(&self) -> Decision {
        if self.own_quad.is_some() && self.state == ProtocolState::Complete {
            Decision::Attack
        } else {
            Decision::Abort
        }
    }

    /// Abort unless already complete. Idempotent.
    pub fn abort(&mut self) {
        if self.state != ProtocolState::Complete && self.state != ProtocolState::Aborted {
            info!("{}: aborted in state {}", self.party, self.state);
            self.state = ProtocolState::Aborted;
        }
    }

    /// The terminal output of a fully mutual run: both halves of the
    /// fixpoint. Present only when the counterparty's quad was received.
    pub fn bilateral_receipt(&self) -> Option<BilateralReceipt> {
        let own = self.own_quad.clone()?;
        let other = self.other_quad.clone()?;
        BilateralReceipt::new(own, other).ok()
    }

    // ==================== RECEIVE HANDLERS ====================
    //
    // Each handler verifies the artifact in full, checks every embedded copy
    // against already-held state, and only then records anything. Returning
    // false drops the artifact without effect.

    fn receive_commitment(&mut self, c: &Commitment) -> bool {
        if self.other_commitment.is_some() {
            return false;
        }
        if let Err(e) = verify_commitment(c, &self.keys) {
            debug!("{}: dropped commitment: {}", self.party, e);
            return false;
        }
        self.other_commitment = Some(c.clone());
        true
    }

    fn receive_double(&mut self, d: &DoubleProof) -> bool {
        if self.other_double.is_some() {
            return false;
        }
        if let Err(e) = verify_double(d, &self.keys) {
            debug!("{}: dropped double proof: {}", self.party, e);
            return false;
        }
        // D_other embeds our commitment and theirs; both copies must match
        // anything we already hold.
        if !self.matches_own_commitment(&d.other_commitment)
            || !self.matches_other_commitment(&d.own_commitment)
        {
            warn!("{}: double proof embeds a conflicting chain, dropped", self.party);
            return false;
        }
        if self.other_commitment.is_none() {
            self.other_commitment = Some(d.own_commitment.clone());
        }
        self.other_double = Some(d.clone());
        true
    }

    fn receive_triple(&mut self, t: &TripleProof) -> bool {
        if self.other_triple.is_some() {
            return false;
        }
        if let Err(e) = verify_triple(t, &self.keys) {
            debug!("{}: dropped triple proof: {}", self.party, e);
            return false;
        }
        if !self.matches_own_double(&t.other_double)
            || !self.matches_other_double(&t.own_double)
            || !self.matches_own_commitment(&t.own_double.other_commitment)
            || !self.matches_other_commitment(&t.own_double.own_commitment)
        {
            warn!("{}: triple proof embeds a conflicting chain, dropped", self.party);
            return false;
        }
        if self.other_commitment.is_none() {
            self.other_commitment = Some(t.own_double.own_commitment.clone());
        }
        if self.other_double.is_none() {
            self.other_double = Some(t.own_double.clone());
        }
        self.other_triple = Some(t.clone());
        true
    }

    fn receive_quad(&mut self, q: &QuadProof) -> bool {
        if self.other_quad.is_some() {
            return false;
        }
        if verify_quad(q, &self.keys).is_err() {
            debug!("{}: dropped quad proof (verification failed)", self.party);
            return false;
        }
        if !self.matches_own_triple(&q.other_triple)
            || !self.matches_other_triple(&q.own_triple)
            || !self.matches_own_double(&q.own_triple.other_double)
            || !self.matches_other_double(&q.own_triple.own_double)
            || !self.matches_own_commitment(&q.own_triple.own_double.other_commitment)
            || !self.matches_other_commitment(&q.own_triple.own_double.own_commitment)
        {
            warn!("{}: quad proof embeds a conflicting chain, dropped", self.party);
            return false;
        }
        if self.other_commitment.is_none() {
            self.other_commitment = Some(q.own_triple.own_double.own_commitment.clone());
        }
        if self.other_double.is_none() {
            self.other_double = Some(q.own_triple.own_double.clone());
        }
        if self.other_triple.is_none() {
            self.other_triple = Some(q.own_triple.clone());
        }
        self.other_quad = Some(q.clone());
        true
    }

    // Embedded-copy checks. A copy conflicts only if we hold a different
    // artifact at that position; absence is fine (the cascade fills it in).

    fn matches_own_commitment(&self, c: &Commitment) -> bool {
        self.own_commitment.as_ref().map_or(true, |own| own == c)
    }

    fn matches_other_commitment(&self, c: &Commitment) -> bool {
        self.other_commitment.as_ref().map_or(true, |held| held == c)
    }

    fn matches_own_double(&self, d: &DoubleProof) -> bool {
        self.own_double.as_ref().map_or(true, |own| own == d)
    }

    fn matches_other_double(&self, d: &DoubleProof) -> bool {
        self.other_double.as_ref().map_or(true, |held| held == d)
    }

    fn matches_own_triple(&self, t: &TripleProof) -> bool {
        self.own_triple.as_ref().map_or(true, |own| own == t)
    }

    fn matches_other_triple(&self, t: &TripleProof) -> bool {
        self.other_triple.as_ref().map_or(true, |held| held == t)
    }

    // ==================== CASCADE ====================

    /// Construct every own-artifact that became derivable, lowest level
    /// first, and advance the state alongside. Receiving a high-level
    /// artifact first (Q before C) drives the whole ladder in one call.
    fn cascade(&mut self) {
        self.try_build_double();
        self.try_build_triple();
        self.try_build_quad();
        if self.own_quad.is_some() && self.state == ProtocolState::Quad {
            self.advance(ProtocolState::Complete);
        }
    }

    fn try_build_double(&mut self) {
        if self.own_double.is_some() {
            return;
        }
        let (Some(own_c), Some(other_c)) = (&self.own_commitment, &self.other_commitment)
        else {
            return;
        };
        match DoubleProof::create(own_c.clone(), other_c.clone(), self.signer.as_ref()) {
            Ok(d) => {
                self.own_double = Some(d);
                self.advance(ProtocolState::Double);
            }
            Err(e) => warn!("{}: double proof construction failed: {}", self.party, e),
        }
    }

    fn try_build_triple(&mut self) {
        if self.own_triple.is_some() {
            return;
        }
        let (Some(own_d), Some(other_d)) = (&self.own_double, &self.other_double) else {
            return;
        };
        match TripleProof::create(own_d.clone(), other_d.clone(), self.signer.as_ref()) {
            Ok(t) => {
                self.own_triple = Some(t);
                self.advance(ProtocolState::Triple);
            }
            Err(e) => warn!("{}: triple proof construction failed: {}", self.party, e),
        }
    }

    fn try_build_quad(&mut self) {
        if self.own_quad.is_some() {
            return;
        }
        let (Some(own_t), Some(other_t)) = (&self.own_triple, &self.other_triple) else {
            return;
        };
        match QuadProof::create(own_t.clone(), other_t.clone(), self.signer.as_ref()) {
            Ok(q) => {
                self.own_quad = Some(q);
                self.advance(ProtocolState::Quad);
            }
            Err(e) => warn!("{}: quad proof construction failed: {}", self.party, e),
        }
    }

    fn advance(&mut self, to: ProtocolState) {
        if to > self.state && !self.state.is_terminal() {
            info!("{}: {} -> {}", self.party, self.state, to);
            self.state = to;
        }
    }
}

impl fmt::Debug for LadderMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LadderMachine(party={}, state={})", self.party, self.state)
    }
}
