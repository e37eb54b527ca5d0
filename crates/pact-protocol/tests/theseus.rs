//! Remove every plank and the ship still sails: no individual frame matters.
//!
//! Symmetry is guaranteed by the cryptographic structure of the artifacts,
//! not by the fate of any particular message. These tests script exact loss
//! patterns through the deterministic lockstep harness and check that
//! dropping any strict subset of frames never produces an asymmetric
//! outcome, and that dropping any single frame does not change the result
//! at all.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use pact_crypto::{Keypair, Signer};
use pact_proofs::Party;
use pact_protocol::{
    run_lockstep, run_lockstep_perfect, Decision, FullSolveMachine, LadderMachine,
};

fn ladder_pair() -> (LadderMachine, LadderMachine) {
    let _ = env_logger::builder().is_test(true).try_init();
    let alice: Arc<dyn Signer> = Arc::new(Keypair::from_seed(&[1u8; 32]));
    let bob: Arc<dyn Signer> = Arc::new(Keypair::from_seed(&[2u8; 32]));
    let a = LadderMachine::new(
        Party::Alice,
        alice.clone(),
        bob.public_key(),
        b"attack at dawn".to_vec(),
    );
    let b = LadderMachine::new(
        Party::Bob,
        bob,
        alice.public_key(),
        b"attack at dawn".to_vec(),
    );
    (a, b)
}

fn full_solve_pair() -> (FullSolveMachine, FullSolveMachine) {
    let alice: Arc<dyn Signer> = Arc::new(Keypair::from_seed(&[1u8; 32]));
    let bob: Arc<dyn Signer> = Arc::new(Keypair::from_seed(&[2u8; 32]));
    let a = FullSolveMachine::new(
        Party::Alice,
        alice.clone(),
        bob.public_key(),
        b"attack at dawn".to_vec(),
    );
    let b = FullSolveMachine::new(
        Party::Bob,
        bob,
        alice.public_key(),
        b"attack at dawn".to_vec(),
    );
    (a, b)
}

#[test]
fn perfect_lockstep_attacks_quickly() {
    let (mut alice, mut bob) = ladder_pair();
    let outcome = run_lockstep_perfect(&mut alice, &mut bob, 100);
    assert_eq!(outcome.alice, Decision::Attack);
    assert_eq!(outcome.bob, Decision::Attack);
    assert!(outcome.rounds <= 4, "took {} rounds", outcome.rounds);
}

#[test]
fn dropping_any_single_frame_changes_nothing() {
    // A clean ladder run exchanges only a handful of frames; flooding makes
    // each one expendable. Drop the k-th frame for every k and demand the
    // identical mutual-attack outcome.
    for dropped in 0..12usize {
        let (mut alice, mut bob) = ladder_pair();
        let mut index = 0usize;
        let outcome = run_lockstep(&mut alice, &mut bob, 100, |_msg| {
            let deliver = index != dropped;
            index += 1;
            deliver
        });
        assert_eq!(outcome.alice, Decision::Attack, "frame {} was special", dropped);
        assert_eq!(outcome.bob, Decision::Attack, "frame {} was special", dropped);
    }
}

#[test]
fn random_strict_subsets_never_break_symmetry() {
    // The round budget is generous relative to the worst loss rate, so the
    // flooding margin after the first completion dwarfs any realistic
    // string of bad luck.
    for seed in 0..300u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let loss_rate: f64 = rng.gen_range(0.0..0.90);

        let (mut alice, mut bob) = ladder_pair();
        let outcome = run_lockstep(&mut alice, &mut bob, 2000, |_msg| {
            rng.gen::<f64>() >= loss_rate
        });

        assert!(
            outcome.is_symmetric(),
            "asymmetric outcome at seed {} (loss {:.2}): {:?}/{:?}",
            seed,
            loss_rate,
            outcome.alice,
            outcome.bob
        );
    }
}

#[test]
fn extreme_loss_eventually_attacks() {
    // 95% loss with a generous round budget: flooding still gets the four
    // decisive frames through.
    let mut rng = StdRng::seed_from_u64(42);
    let (mut alice, mut bob) = ladder_pair();
    let outcome = run_lockstep(&mut alice, &mut bob, 2000, |_msg| rng.gen::<f64>() >= 0.95);
    assert_eq!(outcome.alice, Decision::Attack);
    assert_eq!(outcome.bob, Decision::Attack);
}

#[test]
fn adversarial_alternating_pattern_stays_symmetric() {
    // Deliver only every third frame, then only Bob's frames, then only
    // Alice's. Whatever the adversary does to individual frames, outcomes
    // agree.
    let (mut alice, mut bob) = ladder_pair();
    let mut index = 0usize;
    let outcome = run_lockstep(&mut alice, &mut bob, 300, |_msg| {
        index += 1;
        index % 3 == 0
    });
    assert!(outcome.is_symmetric());

    let (mut alice, mut bob) = ladder_pair();
    let outcome = run_lockstep(&mut alice, &mut bob, 300, |msg| msg.sender == Party::Bob);
    // One-way silence can never produce an attack on either side.
    assert_eq!(outcome.alice, Decision::Abort);
    assert_eq!(outcome.bob, Decision::Abort);
}

#[test]
fn full_solve_lockstep_reaches_identical_receipts() {
    let (mut alice, mut bob) = full_solve_pair();
    let outcome = run_lockstep_perfect(&mut alice, &mut bob, 100);
    assert_eq!(outcome.alice, Decision::Attack);
    assert_eq!(outcome.bob, Decision::Attack);
    assert_eq!(alice.receipt_hash(), bob.receipt_hash());
    assert!(alice.receipt_hash().is_some());
}

#[test]
fn full_solve_symmetry_under_random_loss() {
    for seed in 0..150u64 {
        let mut rng = StdRng::seed_from_u64(seed.wrapping_mul(7919));
        let loss_rate: f64 = rng.gen_range(0.0..0.85);

        let (mut alice, mut bob) = full_solve_pair();
        let outcome = run_lockstep(&mut alice, &mut bob, 1000, |_msg| {
            rng.gen::<f64>() >= loss_rate
        });

        assert!(
            outcome.is_symmetric(),
            "asymmetric full-solve outcome at seed {} (loss {:.2})",
            seed,
            loss_rate
        );
        if outcome.alice == Decision::Attack {
            assert_eq!(alice.receipt_hash(), bob.receipt_hash());
        }
    }
}
