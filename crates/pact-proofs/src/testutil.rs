//! Shared fixtures for the unit tests: a complete, honestly-constructed
//! ladder for both parties, through the confirmation layer.

use pact_crypto::Keypair;

use crate::artifact::{Commitment, DoubleProof, Party, QuadProof, TripleProof};
use crate::confirm::{QuadConfirmation, QuadConfirmationFinal};

pub struct Ladder {
    pub alice: Keypair,
    pub bob: Keypair,
    pub c_a: Commitment,
    pub c_b: Commitment,
    pub d_a: DoubleProof,
    pub d_b: DoubleProof,
    pub t_a: TripleProof,
    pub t_b: TripleProof,
    pub q_a: QuadProof,
    pub q_b: QuadProof,
    pub qc_a: QuadConfirmation,
    pub qc_b: QuadConfirmation,
    pub qcf_a: QuadConfirmationFinal,
    pub qcf_b: QuadConfirmationFinal,
}

pub fn ladder() -> Ladder {
    ladder_with_message(b"attack at dawn")
}

pub fn ladder_with_message(message: &[u8]) -> Ladder {
    let alice = Keypair::from_seed(&[1u8; 32]);
    let bob = Keypair::from_seed(&[2u8; 32]);

    let c_a = Commitment::create(Party::Alice, message.to_vec(), &alice);
    let c_b = Commitment::create(Party::Bob, message.to_vec(), &bob);

    let d_a = DoubleProof::create(c_a.clone(), c_b.clone(), &alice).unwrap();
    let d_b = DoubleProof::create(c_b.clone(), c_a.clone(), &bob).unwrap();

    let t_a = TripleProof::create(d_a.clone(), d_b.clone(), &alice).unwrap();
    let t_b = TripleProof::create(d_b.clone(), d_a.clone(), &bob).unwrap();

    let q_a = QuadProof::create(t_a.clone(), t_b.clone(), &alice).unwrap();
    let q_b = QuadProof::create(t_b.clone(), t_a.clone(), &bob).unwrap();

    let qc_a = QuadConfirmation::create(q_a.clone(), &alice);
    let qc_b = QuadConfirmation::create(q_b.clone(), &bob);

    let qcf_a = QuadConfirmationFinal::create(qc_a.clone(), qc_b.clone(), &alice).unwrap();
    let qcf_b = QuadConfirmationFinal::create(qc_b.clone(), qc_a.clone(), &bob).unwrap();

    Ladder {
        alice,
        bob,
        c_a,
        c_b,
        d_a,
        d_b,
        t_a,
        t_b,
        q_a,
        q_b,
        qc_a,
        qc_b,
        qcf_a,
        qcf_b,
    }
}
