// PER-NODE ARBITRATOR STATE MACHINE
// One arbitrator per node per cluster. A round is two flooding steps:
// every node shares a partial signature over the proposed value, and any
// node holding threshold shares aggregates and floods the commit.
//
// SAFETY INVARIANTS:
// 1. An arbitrator signs at most one value per round
// 2. COMMITTED requires a verifying threshold signature; two conflicting
//    commits in one round would need 2t = 4f + 2 signing events from
//    n = 3f + 1 nodes, forcing f + 1 honest equivocations
// 3. COMMITTED and ABORTED are absorbing

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use pact_crypto::{PublicKey, ThresholdScheme};

use crate::config::BftConfig;
use crate::messages::{hash_round_value, Commit, Proposal, Share};

/// Errors raised by arbitrator operations. Share mismatches and unmet
/// thresholds are local events the caller simply drops or retries on; they
/// never escalate past the receiving node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BftError {
    #[error("invalid configuration: n={n} must equal 3f+1={expected} for f={f}")]
    InvalidConfig { n: usize, f: usize, expected: usize },

    #[error("{operation} is invalid in phase {phase}")]
    WrongPhase {
        operation: &'static str,
        phase: ArbitratorPhase,
    },

    #[error("proposal rejected: {reason}")]
    ProposalRejected { reason: String },

    #[error("share references a different value hash in round {round}")]
    ShareMismatch { round: u64 },

    #[error("share rejected: {reason}")]
    ShareRejected { reason: String },

    #[error("commit rejected: {reason}")]
    CommitRejected { reason: String },

    #[error("key material error: {0}")]
    Crypto(String),
}

/// Arbitrator phases. IDLE -> SIGNING -> AGGREGATING -> COMMITTED, with
/// ABORTED absorbing from any non-committed phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArbitratorPhase {
    Idle,
    Signing,
    Aggregating,
    Committed,
    Aborted,
}

impl fmt::Display for ArbitratorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArbitratorPhase::Idle => write!(f, "IDLE"),
            ArbitratorPhase::Signing => write!(f, "SIGNING"),
            ArbitratorPhase::Aggregating => write!(f, "AGGREGATING"),
            ArbitratorPhase::Committed => write!(f, "COMMITTED"),
            ArbitratorPhase::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// One node's view of the consensus round.
pub struct Arbitrator {
    node_id: u16,
    config: BftConfig,
    scheme: Arc<ThresholdScheme>,
    /// Identity keys of all nodes, indexed by node id; used to verify
    /// proposer signatures.
    registry: Arc<Vec<PublicKey>>,
    identity: PublicKey,

    phase: ArbitratorPhase,
    current_round: u64,
    value: Option<Vec<u8>>,
    value_hash: Option<[u8; 32]>,
    shares: BTreeMap<u16, Vec<u8>>,
    commit: Option<Commit>,
}

impl Arbitrator {
    pub fn new(
        node_id: u16,
        config: BftConfig,
        scheme: Arc<ThresholdScheme>,
        registry: Arc<Vec<PublicKey>>,
        identity: PublicKey,
    ) -> Self {
        Self {
            node_id,
            config,
            scheme,
            registry,
            identity,
            phase: ArbitratorPhase::Idle,
            current_round: 0,
            value: None,
            value_hash: None,
            shares: BTreeMap::new(),
            commit: None,
        }
    }

    pub fn node_id(&self) -> u16 {
        self.node_id
    }

    pub fn phase(&self) -> ArbitratorPhase {
        self.phase
    }

    pub fn current_round(&self) -> u64 {
        self.current_round
    }

    pub fn committed_value(&self) -> Option<&[u8]> {
        match self.phase {
            ArbitratorPhase::Committed => self.value.as_deref(),
            _ => None,
        }
    }

    pub fn commit(&self) -> Option<&Commit> {
        self.commit.as_ref()
    }

    /// Accept a proposal for the next round and emit this node's share.
    ///
    /// Valid only when IDLE, for exactly the next round, with a verifying
    /// proposer signature.
    pub fn receive_proposal(&mut self, proposal: &Proposal) -> Result<Share, BftError> {
        if self.phase != ArbitratorPhase::Idle {
            return Err(BftError::WrongPhase {
                operation: "receive_proposal",
                phase: self.phase,
            });
        }
        if proposal.round != self.current_round + 1 {
            return Err(BftError::ProposalRejected {
                reason: format!(
                    "round {} is not the successor of {}",
                    proposal.round, self.current_round
                ),
            });
        }
        let proposer_key = self
            .registry
            .get(proposal.proposer_id as usize)
            .ok_or_else(|| BftError::ProposalRejected {
                reason: format!("unknown proposer {}", proposal.proposer_id),
            })?;
        if !proposal.verify(proposer_key) {
            return Err(BftError::ProposalRejected {
                reason: "proposer signature does not verify".into(),
            });
        }

        let value_hash = hash_round_value(proposal.round, &proposal.value);
        let share_bytes = self
            .scheme
            .create_share(self.node_id, &value_hash)
            .map_err(|e| BftError::Crypto(e.to_string()))?;

        self.current_round = proposal.round;
        self.value = Some(proposal.value.clone());
        self.value_hash = Some(value_hash);
        self.shares.insert(self.node_id, share_bytes.clone());
        self.phase = ArbitratorPhase::Signing;
        info!(
            "arbitrator {}: SIGNING round {} ({} bytes)",
            self.node_id,
            proposal.round,
            proposal.value.len()
        );

        Ok(Share {
            round: proposal.round,
            value_hash,
            node_id: self.node_id,
            share: share_bytes,
            public_key: self.identity.clone(),
        })
    }

    /// Accept a share. On reaching the threshold, aggregate and emit a
    /// commit. Below threshold the call succeeds with `None` and further
    /// shares are awaited.
    pub fn receive_share(&mut self, share: &Share) -> Result<Option<Commit>, BftError> {
        if !matches!(
            self.phase,
            ArbitratorPhase::Signing | ArbitratorPhase::Aggregating
        ) {
            return Err(BftError::WrongPhase {
                operation: "receive_share",
                phase: self.phase,
            });
        }
        if share.round != self.current_round {
            return Err(BftError::ShareRejected {
                reason: format!(
                    "round {} does not match current round {}",
                    share.round, self.current_round
                ),
            });
        }
        let value_hash = self.value_hash.ok_or(BftError::WrongPhase {
            operation: "receive_share",
            phase: self.phase,
        })?;
        if share.value_hash != value_hash {
            return Err(BftError::ShareMismatch {
                round: self.current_round,
            });
        }
        if !self
            .scheme
            .verify_share(share.node_id, &value_hash, &share.share)
        {
            return Err(BftError::ShareRejected {
                reason: format!("share from node {} does not verify", share.node_id),
            });
        }

        if self.shares.contains_key(&share.node_id) {
            debug!(
                "arbitrator {}: duplicate share from node {}",
                self.node_id, share.node_id
            );
            return Ok(None);
        }
        self.shares.insert(share.node_id, share.share.clone());
        if self.phase == ArbitratorPhase::Signing {
            self.phase = ArbitratorPhase::Aggregating;
        }

        if self.shares.len() < self.config.threshold() {
            return Ok(None);
        }

        let collected: Vec<(u16, Vec<u8>)> = self
            .shares
            .iter()
            .map(|(id, bytes)| (*id, bytes.clone()))
            .collect();
        let Some(proof) = self.scheme.aggregate(&value_hash, &collected) else {
            // Not enough distinct valid shares after deduplication; keep
            // collecting.
            return Ok(None);
        };

        let value = self.value.clone().unwrap_or_default();
        let commit = Commit {
            round: self.current_round,
            value,
            proof,
            aggregator_id: self.node_id,
        };
        self.commit = Some(commit.clone());
        self.phase = ArbitratorPhase::Committed;
        info!(
            "arbitrator {}: COMMITTED round {} as aggregator",
            self.node_id, self.current_round
        );
        Ok(Some(commit))
    }

    /// Accept a commit from any aggregator. Valid in every non-committed
    /// phase provided the threshold signature verifies for the commit's
    /// round and value.
    pub fn receive_commit(&mut self, commit: &Commit) -> Result<(), BftError> {
        if self.phase == ArbitratorPhase::Committed {
            // Absorbing; a second commit must agree with the first.
            if self.value.as_deref() == Some(commit.value.as_slice()) {
                return Ok(());
            }
            return Err(BftError::CommitRejected {
                reason: "conflicting commit for an already committed round".into(),
            });
        }
        if commit.round < self.current_round {
            return Err(BftError::CommitRejected {
                reason: format!(
                    "round {} is behind current round {}",
                    commit.round, self.current_round
                ),
            });
        }

        let value_hash = hash_round_value(commit.round, &commit.value);
        if !self.scheme.verify_threshold(&value_hash, &commit.proof) {
            return Err(BftError::CommitRejected {
                reason: "threshold signature does not verify".into(),
            });
        }

        self.current_round = commit.round;
        self.value = Some(commit.value.clone());
        self.value_hash = Some(value_hash);
        self.commit = Some(commit.clone());
        self.phase = ArbitratorPhase::Committed;
        info!(
            "arbitrator {}: COMMITTED round {} via commit from {}",
            self.node_id, commit.round, commit.aggregator_id
        );
        Ok(())
    }

    /// Abort the round. Absorbing; a committed arbitrator stays committed.
    pub fn abort(&mut self) {
        if self.phase != ArbitratorPhase::Committed {
            self.phase = ArbitratorPhase::Aborted;
        }
    }
}

impl fmt::Debug for Arbitrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Arbitrator(node={}, phase={}, round={})",
            self.node_id, self.phase, self.current_round
        )
    }
}
