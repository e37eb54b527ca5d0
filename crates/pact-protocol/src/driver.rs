// CONTINUOUS-FLOODING DRIVER
// Turns a state machine plus a transport into a running participant.
//
// Operational rule: re-emit the current highest-level own artifact until the
// state advances. No message is special; any single frame that arrives
// intact suffices, because every artifact embeds the full chain below it.
//
// The driver is event-driven. One task multiplexes three wakeups: the flood
// interval, an inbound frame, and the deadline. A state-advancing receive
// re-emits immediately instead of waiting out the current interval tick.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

use pact_proofs::Artifact;
use pact_transport::{
    decode_artifact_frame, encode_artifact_frame, Transport, TransportError,
    DEFAULT_MAX_FRAME_BYTES,
};

use crate::full_solve::{FullSolveMachine, FullTransition};
use crate::machine::{Decision, FloodMessage, LadderMachine, Transition};

/// Driver configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FloodingConfig {
    /// Minimum duration between successive emissions of the current
    /// highest artifact
    pub flood_interval: Duration,

    /// Total budget after which the machine is aborted
    pub deadline: Duration,

    /// Ceiling for decoded payload length
    pub max_frame_bytes: usize,
}

impl Default for FloodingConfig {
    fn default() -> Self {
        Self {
            flood_interval: Duration::from_millis(100),
            deadline: Duration::from_secs(5),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// The machine surface the driver needs. Both the base ladder and the
/// full-solve machine implement it.
pub trait ProtocolMachine: Send {
    /// The single highest-level own artifact, or nothing once aborted.
    fn outbound(&mut self) -> Option<FloodMessage>;

    /// Deliver an inbound artifact. Returns true when the state advanced.
    fn deliver(&mut self, artifact: &Artifact) -> bool;

    fn decision(&self) -> Decision;

    fn abort(&mut self);

    fn is_terminal(&self) -> bool;

    /// Whether the counterparty's terminal artifact has been observed. A
    /// completed participant keeps flooding until this holds (or the
    /// deadline passes), so its own completion cannot starve the peer.
    fn counterparty_done(&self) -> bool;
}

impl ProtocolMachine for LadderMachine {
    fn outbound(&mut self) -> Option<FloodMessage> {
        LadderMachine::outbound(self)
    }

    fn deliver(&mut self, artifact: &Artifact) -> bool {
        matches!(self.receive(artifact), Transition::Advanced(_))
    }

    fn decision(&self) -> Decision {
        LadderMachine::decision(self)
    }

    fn abort(&mut self) {
        LadderMachine::abort(self)
    }

    fn is_terminal(&self) -> bool {
        LadderMachine::is_terminal(self)
    }

    fn counterparty_done(&self) -> bool {
        self.other_quad().is_some()
    }
}

impl ProtocolMachine for FullSolveMachine {
    fn outbound(&mut self) -> Option<FloodMessage> {
        FullSolveMachine::outbound(self)
    }

    fn deliver(&mut self, artifact: &Artifact) -> bool {
        matches!(self.receive(artifact), FullTransition::Advanced(_))
    }

    fn decision(&self) -> Decision {
        FullSolveMachine::decision(self)
    }

    fn abort(&mut self) {
        FullSolveMachine::abort(self)
    }

    fn is_terminal(&self) -> bool {
        FullSolveMachine::is_terminal(self)
    }

    fn counterparty_done(&self) -> bool {
        // Completion already requires the counterparty's final confirmation.
        self.final_receipt().is_some()
    }
}

/// Run one participant to its decision.
///
/// Terminates when the machine is terminal and the counterparty's terminal
/// artifact has been seen, when the deadline elapses (the machine is then
/// aborted; a completed machine stays completed), or when the transport
/// closes (treated exactly like deadline expiry). The machine is borrowed,
/// so the caller keeps access to the bilateral receipt afterwards.
pub async fn run_participant<M, T>(
    machine: &mut M,
    mut transport: T,
    config: FloodingConfig,
) -> Decision
where
    M: ProtocolMachine,
    T: Transport,
{
    let deadline = Instant::now() + config.deadline;
    let mut flood = interval(config.flood_interval);
    flood.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while !finished(machine) {
        // Resolve the next wakeup first, then act; the receive future holds
        // the transport until the select resolves.
        let wakeup = tokio::select! {
            _ = flood.tick() => Wakeup::Tick,
            inbound = transport.recv() => Wakeup::Inbound(inbound),
            _ = sleep_until(deadline) => Wakeup::Deadline,
        };

        match wakeup {
            Wakeup::Tick => {
                if emit(machine, &transport).await.is_err() {
                    info!("transport closed while emitting, aborting");
                    machine.abort();
                    break;
                }
            }
            Wakeup::Inbound(Ok(bytes)) => {
                let artifact = match decode_artifact_frame(&bytes, config.max_frame_bytes) {
                    Ok(artifact) => artifact,
                    Err(e) => {
                        debug!("dropped malformed frame: {}", e);
                        continue;
                    }
                };
                if machine.deliver(&artifact) {
                    // State advanced: flood the new artifact now rather
                    // than waiting out the current tick.
                    if emit(machine, &transport).await.is_err() {
                        machine.abort();
                        break;
                    }
                    flood.reset();
                }
            }
            Wakeup::Inbound(Err(TransportError::Closed(reason))) => {
                info!("transport closed ({}), aborting", reason);
                machine.abort();
                break;
            }
            Wakeup::Deadline => {
                debug!("deadline elapsed");
                machine.abort();
                break;
            }
        }
    }

    machine.decision()
}

enum Wakeup {
    Tick,
    Inbound(Result<Vec<u8>, TransportError>),
    Deadline,
}

fn finished<M: ProtocolMachine>(machine: &M) -> bool {
    machine.is_terminal()
        && (machine.decision() == Decision::Abort || machine.counterparty_done())
}

async fn emit<M: ProtocolMachine, T: Transport>(
    machine: &mut M,
    transport: &T,
) -> Result<(), TransportError> {
    if let Some(message) = machine.outbound() {
        transport.send(encode_artifact_frame(&message.artifact)).await?;
    }
    Ok(())
}
