//! Deterministic lockstep simulation.
//!
//! Drives two machines round by round without a runtime: each round both
//! parties flood once and deliveries happen subject to a caller-supplied
//! filter. Useful for adversarial loss-pattern tests where the exact fate of
//! every frame must be scripted.

use crate::driver::ProtocolMachine;
use crate::machine::{Decision, FloodMessage};

/// Outcome of a lockstep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockstepOutcome {
    pub alice: Decision,
    pub bob: Decision,
    pub rounds: usize,
}

impl LockstepOutcome {
    /// The protocol's core promise: never one of each.
    pub fn is_symmetric(&self) -> bool {
        self.alice == self.bob
    }
}

/// Exchange messages between two machines until both finish or the round
/// budget runs out, then return both decisions.
///
/// The filter decides the fate of each frame: `true` delivers, `false`
/// drops. Filters see the sender and the flood sequence number, which is
/// enough to script any loss pattern.
pub fn run_lockstep<A, B, F>(
    alice: &mut A,
    bob: &mut B,
    max_rounds: usize,
    mut filter: F,
) -> LockstepOutcome
where
    A: ProtocolMachine,
    B: ProtocolMachine,
    F: FnMut(&FloodMessage) -> bool,
{
    let mut rounds = 0;
    for round in 0..max_rounds {
        rounds = round + 1;

        if let Some(msg) = alice.outbound() {
            if filter(&msg) {
                bob.deliver(&msg.artifact);
            }
        }
        if let Some(msg) = bob.outbound() {
            if filter(&msg) {
                alice.deliver(&msg.artifact);
            }
        }

        if settled(alice) && settled(bob) {
            break;
        }
    }

    LockstepOutcome {
        alice: alice.decision(),
        bob: bob.decision(),
        rounds,
    }
}

/// A machine is settled once nothing further can change its run: aborted,
/// or completed with the counterparty's completion observed.
fn settled<M: ProtocolMachine>(machine: &M) -> bool {
    machine.is_terminal()
        && (machine.decision() == Decision::Abort || machine.counterparty_done())
}

/// Lockstep with every frame delivered.
pub fn run_lockstep_perfect<A, B>(alice: &mut A, bob: &mut B, max_rounds: usize) -> LockstepOutcome
where
    A: ProtocolMachine,
    B: ProtocolMachine,
{
    run_lockstep(alice, bob, max_rounds, |_| true)
}
