// FULL-SOLVE CONFIRMATION LAYER
// Two observation phases on top of the ladder: confirm the fixpoint, then
// confirm the mutual confirmation, then derive the deterministic receipt.
//
// SAFETY INVARIANTS:
// 1. The confirmation for the own quad is constructed the instant the quad
//    exists; there is no window in which the fixpoint is held unconfirmed
// 2. The decision is ATTACK only when the local receipt exists AND the
//    counterparty's final confirmation has been received
// 3. Both participants derive bit-identical receipts

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use pact_crypto::{PublicKey, Signer};
use pact_proofs::{
    verify_quad_confirmation, verify_quad_confirmation_final, Artifact, FinalReceipt, Party,
    QuadConfirmation, QuadConfirmationFinal,
};

use crate::machine::{Decision, FloodMessage, LadderMachine, ProtocolState};

/// Full-solve machine states. The first five mirror the ladder; the two
/// confirmation phases sit between fixpoint and completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FullSolveState {
    Commitment,
    Double,
    Triple,
    Quad,
    QuadConfirm,
    QuadConfirmFinal,
    Complete,
    Aborted,
}

impl FullSolveState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FullSolveState::Complete | FullSolveState::Aborted)
    }
}

impl fmt::Display for FullSolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullSolveState::Commitment => write!(f, "COMMITMENT"),
            FullSolveState::Double => write!(f, "DOUBLE"),
            FullSolveState::Triple => write!(f, "TRIPLE"),
            FullSolveState::Quad => write!(f, "QUAD"),
            FullSolveState::QuadConfirm => write!(f, "Q_CONF"),
            FullSolveState::QuadConfirmFinal => write!(f, "Q_CONF_FINAL"),
            FullSolveState::Complete => write!(f, "COMPLETE"),
            FullSolveState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Result of delivering one artifact to the full-solve machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullTransition {
    Advanced(FullSolveState),
    Unchanged,
    Ignored,
}

/// One participant of the full-solve protocol: the ladder machine plus the
/// two confirmation phases and the receipt.
pub struct FullSolveMachine {
    ladder: LadderMachine,
    own_confirmation: Option<QuadConfirmation>,
    other_confirmation: Option<QuadConfirmation>,
    own_final: Option<QuadConfirmationFinal>,
    other_final: Option<QuadConfirmationFinal>,
    receipt: Option<FinalReceipt>,
    aborted: bool,
}

impl FullSolveMachine {
    pub fn new(
        party: Party,
        signer: Arc<dyn Signer>,
        counterparty_key: PublicKey,
        commitment_message: Vec<u8>,
    ) -> Self {
        let ladder = LadderMachine::new(party, signer, counterparty_key, commitment_message);
        Self {
            ladder,
            own_confirmation: None,
            other_confirmation: None,
            own_final: None,
            other_final: None,
            receipt: None,
            aborted: false,
        }
    }

    pub fn party(&self) -> Party {
        self.ladder.party()
    }

    pub fn state(&self) -> FullSolveState {
        if self.aborted {
            return FullSolveState::Aborted;
        }
        if self.receipt.is_some() {
            return FullSolveState::Complete;
        }
        if self.own_final.is_some() {
            return FullSolveState::QuadConfirmFinal;
        }
        if self.own_confirmation.is_some() {
            return FullSolveState::QuadConfirm;
        }
        match self.ladder.state() {
            ProtocolState::Init | ProtocolState::Commitment => FullSolveState::Commitment,
            ProtocolState::Double => FullSolveState::Double,
            ProtocolState::Triple => FullSolveState::Triple,
            // Quad or ladder-complete without a confirmation yet.
            _ => FullSolveState::Quad,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// The receipt, once both final confirmations are held.
    pub fn final_receipt(&self) -> Option<&FinalReceipt> {
        self.receipt.as_ref()
    }

    /// The 32-octet session-unique receipt hash, identical on both sides.
    pub fn receipt_hash(&self) -> Option<[u8; 32]> {
        self.receipt.as_ref().map(|r| r.receipt_hash)
    }

    /// ATTACK only with a local receipt and the counterparty's final
    /// confirmation in hand: both observation phases closed.
    pub fn decision(&self) -> Decision {
        if !self.aborted && self.receipt.is_some() && self.other_final.is_some() {
            Decision::Attack
        } else {
            Decision::Abort
        }
    }

    /// Abort unless the receipt already exists. Idempotent.
    pub fn abort(&mut self) {
        if self.receipt.is_none() && !self.aborted {
            info!("{}: full-solve aborted in state {}", self.party(), self.state());
            self.aborted = true;
            self.ladder.abort();
        }
    }

    /// The single highest-level own artifact to flood.
    pub fn outbound(&mut self) -> Option<FloodMessage> {
        if self.aborted {
            return None;
        }
        let artifact = if let Some(f) = &self.own_final {
            Artifact::QuadConfirmationFinal(f.clone())
        } else if let Some(qc) = &self.own_confirmation {
            Artifact::QuadConfirmation(qc.clone())
        } else {
            return self.ladder.outbound();
        };
        Some(self.wrap(artifact))
    }

    fn wrap(&mut self, artifact: Artifact) -> FloodMessage {
        // Confirmation-phase emissions ride the ladder's sequence counter so
        // re-emissions stay distinguishable end to end.
        let sequence = self.ladder.next_sequence();
        FloodMessage {
            sender: self.party(),
            artifact,
            sequence,
        }
    }

    /// Deliver a received artifact: ladder artifacts cascade through the
    /// inner machine, confirmation artifacts drive the observation phases.
    /// Either way every embedded lower-level artifact is put to use.
    pub fn receive(&mut self, artifact: &Artifact) -> FullTransition {
        if self.aborted {
            return FullTransition::Ignored;
        }
        if artifact.party() == self.party() {
            return FullTransition::Ignored;
        }

        let before = self.state();
        let accepted = match artifact {
            Artifact::QuadConfirmation(qc) => self.receive_confirmation(qc),
            Artifact::QuadConfirmationFinal(qcf) => self.receive_final(qcf),
            ladder_artifact => {
                let transition = self.ladder.receive(ladder_artifact);
                !matches!(transition, crate::machine::Transition::Ignored)
            }
        };

        if !accepted {
            return FullTransition::Ignored;
        }
        self.after_advance();
        let after = self.state();
        if after != before {
            FullTransition::Advanced(after)
        } else {
            FullTransition::Unchanged
        }
    }

    fn receive_confirmation(&mut self, qc: &QuadConfirmation) -> bool {
        if self.other_confirmation.is_some() {
            return false;
        }
        if let Err(e) = verify_quad_confirmation(qc, self.ladder.keys()) {
            debug!("{}: dropped quad confirmation: {}", self.party(), e);
            return false;
        }
        // The embedded quad drives the ladder to its own fixpoint if it is
        // not there already.
        self.ladder.receive(&Artifact::Quad(qc.quad.clone()));
        if self.ladder.other_quad() != Some(&qc.quad) {
            warn!(
                "{}: quad confirmation embeds a conflicting quad, dropped",
                self.party()
            );
            return false;
        }
        self.other_confirmation = Some(qc.clone());
        true
    }

    fn receive_final(&mut self, qcf: &QuadConfirmationFinal) -> bool {
        if self.other_final.is_some() {
            return false;
        }
        if let Err(e) = verify_quad_confirmation_final(qcf, self.ladder.keys()) {
            debug!("{}: dropped final confirmation: {}", self.party(), e);
            return false;
        }
        // QCF_other embeds QC_other (its own half) and a copy of our QC.
        self.ladder
            .receive(&Artifact::Quad(qcf.own_confirmation.quad.clone()));
        if self.ladder.other_quad() != Some(&qcf.own_confirmation.quad) {
            warn!(
                "{}: final confirmation embeds a conflicting quad, dropped",
                self.party()
            );
            return false;
        }
        if let Some(held) = &self.other_confirmation {
            if held != &qcf.own_confirmation {
                warn!(
                    "{}: final confirmation embeds a conflicting confirmation, dropped",
                    self.party()
                );
                return false;
            }
        } else {
            self.other_confirmation = Some(qcf.own_confirmation.clone());
        }
        self.other_final = Some(qcf.clone());
        true
    }

    /// Construct whatever the newly held artifacts make derivable:
    /// QC after the own quad, QCF after both confirmations, the receipt
    /// after both finals.
    fn after_advance(&mut self) {
        if self.aborted {
            return;
        }

        if self.own_confirmation.is_none() {
            if let Some(quad) = self.ladder.own_quad() {
                let qc = QuadConfirmation::create(quad.clone(), self.ladder.signer().as_ref());
                info!("{}: fixpoint observed, confirmation created", self.party());
                self.own_confirmation = Some(qc);
            }
        }

        if self.own_final.is_none() {
            if let (Some(own), Some(other)) = (&self.own_confirmation, &self.other_confirmation)
            {
                match QuadConfirmationFinal::create(
                    own.clone(),
                    other.clone(),
                    self.ladder.signer().as_ref(),
                ) {
                    Ok(f) => {
                        info!("{}: mutual observation confirmed", self.party());
                        self.own_final = Some(f);
                    }
                    Err(e) => warn!(
                        "{}: final confirmation construction failed: {}",
                        self.party(),
                        e
                    ),
                }
            }
        }

        if self.receipt.is_none() {
            if let (Some(own), Some(other)) = (&self.own_final, &self.other_final) {
                match FinalReceipt::build(own, other) {
                    Ok(receipt) => {
                        info!(
                            "{}: locked in, receipt {}",
                            self.party(),
                            hex::encode(receipt.receipt_hash)
                        );
                        self.receipt = Some(receipt);
                    }
                    Err(e) => warn!("{}: receipt construction failed: {}", self.party(), e),
                }
            }
        }
    }
}

impl fmt::Debug for FullSolveMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FullSolveMachine(party={}, state={})",
            self.party(),
            self.state()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::full_solve_pair;

    fn hand_over(from: &mut FullSolveMachine, to: &mut FullSolveMachine) -> FullTransition {
        let msg = from.outbound().expect("sender has an outbound artifact");
        to.receive(&msg.artifact)
    }

    /// Clean run: C_A, D_B, T_A, Q_B(+QC cascade), QC_A ... through receipts.
    fn run_to_completion(alice: &mut FullSolveMachine, bob: &mut FullSolveMachine) {
        for _ in 0..16 {
            hand_over(alice, bob);
            hand_over(bob, alice);
            if alice.is_terminal() && bob.is_terminal() {
                break;
            }
        }
    }

    #[test]
    fn test_clean_run_completes_with_identical_receipts() {
        let (mut alice, mut bob) = full_solve_pair(b"attack at dawn");
        run_to_completion(&mut alice, &mut bob);

        assert_eq!(alice.state(), FullSolveState::Complete);
        assert_eq!(bob.state(), FullSolveState::Complete);
        assert_eq!(alice.decision(), Decision::Attack);
        assert_eq!(bob.decision(), Decision::Attack);
        assert_eq!(alice.receipt_hash(), bob.receipt_hash());
        assert_eq!(
            alice.final_receipt().unwrap(),
            bob.final_receipt().unwrap()
        );
    }

    #[test]
    fn test_confirmation_created_immediately_with_quad() {
        let (mut alice, mut bob) = full_solve_pair(b"attack at dawn");
        hand_over(&mut alice, &mut bob); // C_A -> Bob at DOUBLE
        hand_over(&mut bob, &mut alice); // D_B -> Alice at TRIPLE
        let transition = hand_over(&mut alice, &mut bob); // T_A -> Bob completes ladder

        // Bob's quad and confirmation appear in the same delivery; the state
        // lands directly on Q_CONF.
        assert_eq!(transition, FullTransition::Advanced(FullSolveState::QuadConfirm));
    }

    #[test]
    fn test_final_confirmation_alone_completes_counterparty() {
        let (mut alice, mut bob) = full_solve_pair(b"attack at dawn");
        run_to_completion(&mut alice, &mut bob);
        assert!(bob.is_terminal());

        // A fresh Alice fed nothing but Bob's final confirmation climbs the
        // entire ladder, confirms, and finishes in one delivery.
        let (mut fresh_alice, _) = full_solve_pair(b"attack at dawn");
        let qcf_b = bob.outbound().unwrap().artifact;
        assert_eq!(
            fresh_alice.receive(&qcf_b),
            FullTransition::Advanced(FullSolveState::Complete)
        );
        assert_eq!(fresh_alice.decision(), Decision::Attack);
        assert_eq!(fresh_alice.receipt_hash(), bob.receipt_hash());
    }

    #[test]
    fn test_decision_requires_counterparty_final() {
        let (mut alice, mut bob) = full_solve_pair(b"attack at dawn");
        // Stop the exchange right after Alice constructs her own final
        // confirmation but before Bob's final reaches her.
        hand_over(&mut alice, &mut bob); // C_A
        hand_over(&mut bob, &mut alice); // D_B
        hand_over(&mut alice, &mut bob); // T_A; Bob at Q_CONF
        hand_over(&mut bob, &mut alice); // QC_B; Alice at Q_CONF_FINAL

        assert_eq!(alice.state(), FullSolveState::QuadConfirmFinal);
        assert_eq!(alice.decision(), Decision::Abort);
    }

    #[test]
    fn test_duplicate_confirmations_ignored() {
        let (mut alice, mut bob) = full_solve_pair(b"attack at dawn");
        hand_over(&mut alice, &mut bob);
        hand_over(&mut bob, &mut alice);
        hand_over(&mut alice, &mut bob);
        let qc_b = bob.outbound().unwrap().artifact;

        assert!(matches!(
            alice.receive(&qc_b),
            FullTransition::Advanced(_)
        ));
        assert_eq!(alice.receive(&qc_b), FullTransition::Ignored);
    }

    #[test]
    fn test_abort_before_receipt_wins_abort_after_receipt_loses() {
        let (mut alice, mut bob) = full_solve_pair(b"attack at dawn");
        alice.abort();
        assert_eq!(alice.state(), FullSolveState::Aborted);
        assert_eq!(alice.decision(), Decision::Abort);
        assert!(alice.outbound().is_none());

        let (mut a2, mut b2) = full_solve_pair(b"attack at dawn");
        run_to_completion(&mut a2, &mut b2);
        b2.abort();
        assert_eq!(b2.state(), FullSolveState::Complete);
        assert_eq!(b2.decision(), Decision::Attack);
    }
}
