// CLUSTER ROUND ORCHESTRATION
// Owns the n arbitrators for the duration of a round and no longer.
// Aggregation is leaderless: every node that reaches threshold emits a
// commit, and all commits for a round necessarily agree.
//
// Message movement here is flooding-style broadcast: every emitted share and
// commit is offered to every reachable node. Silent nodes model crashed or
// partitioned arbitrators; they neither receive nor emit.

use log::debug;
use rand::{CryptoRng, RngCore};
use std::sync::Arc;

use pact_crypto::{Keypair, PublicKey, Signer, ThresholdScheme};

use crate::arbitrator::{Arbitrator, ArbitratorPhase, BftError};
use crate::config::BftConfig;
use crate::messages::{Commit, Proposal};

/// Result of one orchestrated round.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    /// Nodes that reached COMMITTED, ascending
    pub committed_nodes: Vec<u16>,

    /// Every commit emitted during the round (one per aggregator that
    /// reached threshold on its own)
    pub commits: Vec<Commit>,
}

impl RoundOutcome {
    /// All emitted commits carry the same value. With honest nodes this can
    /// never be false; the check exists for the test harness.
    pub fn all_agree(&self) -> bool {
        match self.commits.first() {
            Some(first) => self.commits.iter().all(|c| c.value == first.value),
            None => true,
        }
    }
}

/// A full cluster of arbitrators sharing one threshold scheme and one
/// identity registry.
pub struct BftCluster {
    config: BftConfig,
    scheme: Arc<ThresholdScheme>,
    registry: Arc<Vec<PublicKey>>,
    signers: Vec<Arc<Keypair>>,
    arbitrators: Vec<Arbitrator>,
    next_round: u64,
}

impl BftCluster {
    /// Provision a cluster: one threshold scheme dealt across n nodes, one
    /// identity keypair per node.
    pub fn new<R: RngCore + CryptoRng>(config: BftConfig, rng: &mut R) -> Result<Self, BftError> {
        let scheme = Arc::new(
            ThresholdScheme::generate(config.n(), config.threshold(), rng)
                .map_err(|e| BftError::Crypto(e.to_string()))?,
        );
        let signers: Vec<Arc<Keypair>> =
            (0..config.n()).map(|_| Arc::new(Keypair::generate(rng))).collect();
        let registry: Arc<Vec<PublicKey>> =
            Arc::new(signers.iter().map(|kp| kp.public_key()).collect());

        let arbitrators = (0..config.n() as u16)
            .map(|id| {
                Arbitrator::new(
                    id,
                    config,
                    scheme.clone(),
                    registry.clone(),
                    registry[id as usize].clone(),
                )
            })
            .collect();

        Ok(Self {
            config,
            scheme,
            registry,
            signers,
            arbitrators,
            next_round: 1,
        })
    }

    pub fn config(&self) -> BftConfig {
        self.config
    }

    pub fn scheme(&self) -> &Arc<ThresholdScheme> {
        &self.scheme
    }

    pub fn registry(&self) -> &Arc<Vec<PublicKey>> {
        &self.registry
    }

    pub fn arbitrator(&self, node_id: u16) -> Option<&Arbitrator> {
        self.arbitrators.get(node_id as usize)
    }

    pub fn arbitrator_mut(&mut self, node_id: u16) -> Option<&mut Arbitrator> {
        self.arbitrators.get_mut(node_id as usize)
    }

    /// Create a signed proposal for the next round from the given node.
    pub fn propose(&mut self, proposer_id: u16, value: &[u8]) -> Result<Proposal, BftError> {
        let signer = self
            .signers
            .get(proposer_id as usize)
            .ok_or_else(|| BftError::ProposalRejected {
                reason: format!("unknown proposer {}", proposer_id),
            })?
            .clone();
        let round = self.next_round;
        self.next_round += 1;
        Ok(Proposal::create(
            round,
            value.to_vec(),
            proposer_id,
            signer.as_ref(),
        ))
    }

    /// Drive one round to quiescence with the given nodes unreachable.
    ///
    /// Broadcast order is deterministic (ascending node id), so outcomes are
    /// reproducible; the protocol itself does not depend on any ordering.
    pub fn run_round(&mut self, proposal: &Proposal, silent: &[u16]) -> RoundOutcome {
        let active: Vec<u16> = (0..self.config.n() as u16)
            .filter(|id| !silent.contains(id))
            .collect();

        // Step 1: the proposal reaches every active node; each emits a share.
        let mut shares = Vec::new();
        for &id in &active {
            match self.arbitrators[id as usize].receive_proposal(proposal) {
                Ok(share) => shares.push(share),
                Err(e) => debug!("node {} rejected proposal: {}", id, e),
            }
        }

        // Step 2: every share reaches every active node; aggregators emit
        // commits the moment they reach threshold.
        let mut commits: Vec<Commit> = Vec::new();
        for share in &shares {
            for &id in &active {
                if id == share.node_id {
                    continue;
                }
                let arbitrator = &mut self.arbitrators[id as usize];
                if arbitrator.phase() == ArbitratorPhase::Committed {
                    continue;
                }
                match arbitrator.receive_share(share) {
                    Ok(Some(commit)) => commits.push(commit),
                    Ok(None) => {}
                    Err(e) => debug!("node {} dropped share: {}", id, e),
                }
            }
        }

        // Step 3: every commit reaches every active node.
        for commit in &commits {
            for &id in &active {
                let arbitrator = &mut self.arbitrators[id as usize];
                if arbitrator.phase() != ArbitratorPhase::Committed {
                    if let Err(e) = arbitrator.receive_commit(commit) {
                        debug!("node {} rejected commit: {}", id, e);
                    }
                }
            }
        }

        let committed_nodes: Vec<u16> = active
            .iter()
            .copied()
            .filter(|&id| self.arbitrators[id as usize].phase() == ArbitratorPhase::Committed)
            .collect();

        RoundOutcome {
            committed_nodes,
            commits,
        }
    }
}
