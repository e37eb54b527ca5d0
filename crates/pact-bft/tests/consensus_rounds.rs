//! Cluster-level consensus scenarios: honest rounds, silent minorities, and
//! the safety argument that conflicting commits cannot form.

use rand::rngs::StdRng;
use rand::SeedableRng;

use pact_bft::{
    hash_round_value, ArbitratorPhase, BftCluster, BftConfig, BftError, Commit,
};

fn cluster(f: usize, seed: u64) -> BftCluster {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(seed);
    BftCluster::new(BftConfig::with_faults(f), &mut rng).unwrap()
}

#[test]
fn four_nodes_all_honest_commit_with_ascending_proof() {
    let mut cluster = cluster(1, 1);
    let proposal = cluster.propose(0, b"advance-at-dawn").unwrap();
    let outcome = cluster.run_round(&proposal, &[]);

    // All four transition to COMMITTED on the proposed value.
    assert_eq!(outcome.committed_nodes, vec![0, 1, 2, 3]);
    for id in 0..4u16 {
        let arb = cluster.arbitrator(id).unwrap();
        assert_eq!(arb.phase(), ArbitratorPhase::Committed);
        assert_eq!(arb.committed_value(), Some(&b"advance-at-dawn"[..]));
    }

    // Every emitted proof carries exactly t = 3 node indices, ascending.
    assert!(!outcome.commits.is_empty());
    for commit in &outcome.commits {
        assert_eq!(commit.proof.contributing_nodes.len(), 3);
        assert!(commit
            .proof
            .contributing_nodes
            .windows(2)
            .all(|w| w[0] < w[1]));
    }
    assert!(outcome.all_agree());
}

#[test]
fn seven_nodes_two_silent_remaining_five_commit() {
    let mut cluster = cluster(2, 2);
    let proposal = cluster.propose(0, b"hold-the-line").unwrap();
    let outcome = cluster.run_round(&proposal, &[5, 6]);

    assert_eq!(outcome.committed_nodes, vec![0, 1, 2, 3, 4]);
    for commit in &outcome.commits {
        assert_eq!(commit.proof.contributing_nodes.len(), 5);
        assert!(commit
            .proof
            .contributing_nodes
            .windows(2)
            .all(|w| w[0] < w[1]));
    }

    // The silent pair never left IDLE.
    assert_eq!(cluster.arbitrator(5).unwrap().phase(), ArbitratorPhase::Idle);
    assert_eq!(cluster.arbitrator(6).unwrap().phase(), ArbitratorPhase::Idle);
}

#[test]
fn multiple_aggregators_agree_and_conflicts_cannot_form() {
    let mut cluster = cluster(1, 3);
    let proposal = cluster.propose(2, b"one-true-value").unwrap();
    let outcome = cluster.run_round(&proposal, &[]);

    // Leaderless aggregation: more than one node may reach threshold and
    // emit; every commit carries the same value.
    assert!(outcome.commits.len() >= 2);
    assert!(outcome.all_agree());

    // A Byzantine minority cannot assemble a proof for any other value:
    // with f = 1 it holds one share key, and 1 < t = 3.
    let scheme = cluster.scheme().clone();
    let forged_hash = hash_round_value(proposal.round, b"a-different-value");
    let rogue_share = scheme.create_share(3, &forged_hash).unwrap();
    assert!(scheme
        .aggregate(&forged_hash, &[(3, rogue_share)])
        .is_none());
}

#[test]
fn committed_node_rejects_conflicting_commit() {
    let mut cluster = cluster(1, 4);
    let proposal = cluster.propose(0, b"value-v").unwrap();
    let outcome = cluster.run_round(&proposal, &[]);
    let good_commit = outcome.commits[0].clone();

    // Tamper with the committed value; the threshold proof no longer
    // verifies for the forged round hash, and a committed node treats a
    // disagreeing commit as an error rather than silently absorbing it.
    let forged = Commit {
        value: b"value-w".to_vec(),
        ..good_commit.clone()
    };

    let node = cluster.arbitrator_mut(1).unwrap();
    assert_eq!(node.phase(), ArbitratorPhase::Committed);
    assert_eq!(node.committed_value(), Some(&b"value-v"[..]));
    assert!(matches!(
        node.receive_commit(&forged),
        Err(BftError::CommitRejected { .. })
    ));
    // A matching duplicate is absorbed silently.
    assert!(node.receive_commit(&good_commit).is_ok());

    // A fresh, uncommitted node also rejects the forgery outright: the
    // threshold signature does not verify for the forged value hash.
    let mut rng = StdRng::seed_from_u64(99);
    let mut other_round_cluster = BftCluster::new(BftConfig::with_faults(1), &mut rng).unwrap();
    let idle = other_round_cluster.arbitrator_mut(0).unwrap();
    assert!(idle.receive_commit(&forged).is_err());
}

#[test]
fn proposal_round_and_signature_are_enforced() {
    let mut cluster = cluster(1, 5);
    let good = cluster.propose(0, b"v").unwrap();

    // Round must be exactly the successor.
    let mut stale = good.clone();
    stale.round = 7;
    let outcome = cluster.run_round(&stale, &[]);
    assert!(outcome.committed_nodes.is_empty());

    // A correctly-rounded proposal with a forged signature is also dead.
    let mut forged = good.clone();
    forged.value = b"swapped".to_vec();
    let outcome = cluster.run_round(&forged, &[]);
    assert!(outcome.committed_nodes.is_empty());
}

#[test]
fn liveness_holds_at_exact_threshold() {
    // n = 7, t = 5: silence f = 2 nodes; the remaining 2f + 1 honest nodes
    // are exactly enough.
    let mut cluster = cluster(2, 6);
    let proposal = cluster.propose(1, b"exact-quorum").unwrap();
    let outcome = cluster.run_round(&proposal, &[0, 4]);

    assert_eq!(outcome.committed_nodes, vec![1, 2, 3, 5, 6]);
    assert!(outcome.all_agree());
}

#[test]
fn silencing_more_than_f_plus_minority_blocks_commit() {
    // n = 4, t = 3: with two nodes silent only two shares exist; nobody can
    // aggregate and nobody commits.
    let mut cluster = cluster(1, 7);
    let proposal = cluster.propose(0, b"not-enough").unwrap();
    let outcome = cluster.run_round(&proposal, &[2, 3]);

    assert!(outcome.committed_nodes.is_empty());
    assert!(outcome.commits.is_empty());
    // The reachable nodes are stuck mid-round, not committed to anything.
    assert_eq!(
        cluster.arbitrator(0).unwrap().phase(),
        ArbitratorPhase::Aggregating
    );
}
