//! Byzantine fault tolerant multiparty extension.
//!
//! Generalizes the two-party proof-stapling idea to `n = 3f + 1` nodes with
//! threshold signatures: a PROPOSE step, one SHARE flood, and a COMMIT
//! carrying a `2f + 1`-of-`n` aggregate. Safety needs no view changes and no
//! leader: two conflicting commits in a round would require `4f + 2` signing
//! events from `3f + 1` nodes, which forces at least `f + 1` honest nodes to
//! equivocate - and honest nodes sign one value per round.

pub mod arbitrator;
pub mod cluster;
pub mod config;
pub mod messages;

pub use arbitrator::{Arbitrator, ArbitratorPhase, BftError};
pub use cluster::{BftCluster, RoundOutcome};
pub use config::BftConfig;
pub use messages::{hash_round_value, BftMessage, Commit, Proposal, Share};
