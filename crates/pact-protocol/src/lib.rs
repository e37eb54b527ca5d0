//! Two-party coordination protocol: state machines and flooding driver.
//!
//! One participant is one [`LadderMachine`] (or [`FullSolveMachine`] for the
//! confirmation-layer variant) driven by [`run_participant`] over any
//! [`pact_transport::Transport`]. The machine climbs the proof ladder as
//! counterparty artifacts arrive; the driver floods the current highest
//! artifact until the state advances, and the only outcomes are `ATTACK`
//! (fixpoint achieved) and `ABORT` (anything else) - never one of each
//! across a fair-lossy channel.

pub mod driver;
pub mod full_solve;
pub mod machine;
pub mod sim;

#[cfg(test)]
pub(crate) mod testutil;

pub use driver::{run_participant, FloodingConfig, ProtocolMachine};
pub use full_solve::{FullSolveMachine, FullSolveState, FullTransition};
pub use machine::{Decision, FloodMessage, LadderMachine, ProtocolState, Transition};
pub use sim::{run_lockstep, run_lockstep_perfect, LockstepOutcome};
