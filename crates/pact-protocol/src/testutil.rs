//! Shared fixtures: deterministic machine pairs for the unit tests.

use std::sync::Arc;

use pact_crypto::{Keypair, Signer};
use pact_proofs::Party;

use crate::full_solve::FullSolveMachine;
use crate::machine::LadderMachine;

pub fn machine_pair(message: &[u8]) -> (LadderMachine, LadderMachine) {
    let alice: Arc<dyn Signer> = Arc::new(Keypair::from_seed(&[1u8; 32]));
    let bob: Arc<dyn Signer> = Arc::new(Keypair::from_seed(&[2u8; 32]));
    let a = LadderMachine::new(
        Party::Alice,
        alice.clone(),
        bob.public_key(),
        message.to_vec(),
    );
    let b = LadderMachine::new(Party::Bob, bob, alice.public_key(), message.to_vec());
    (a, b)
}

pub fn full_solve_pair(message: &[u8]) -> (FullSolveMachine, FullSolveMachine) {
    let alice: Arc<dyn Signer> = Arc::new(Keypair::from_seed(&[1u8; 32]));
    let bob: Arc<dyn Signer> = Arc::new(Keypair::from_seed(&[2u8; 32]));
    let a = FullSolveMachine::new(
        Party::Alice,
        alice.clone(),
        bob.public_key(),
        message.to_vec(),
    );
    let b = FullSolveMachine::new(Party::Bob, bob, alice.public_key(), message.to_vec());
    (a, b)
}
