/// Threshold Signature Scheme
///
/// Per-node signature shares with deterministic t-of-n aggregation, used by
/// the multiparty arbitration layer. The scheme object is provisioned by a
/// trusted dealer with all n share keys and a public aggregation key.
///
/// Shares are derived with HMAC-SHA256 over the message and aggregated by
/// XOR-accumulate-then-hash. This binds shares to holders of the share keys
/// rather than providing public verifiability: a pairing-based (BLS-style)
/// scheme exposing the same four operations - create_share, verify_share,
/// aggregate, verify_threshold - can replace it without touching callers.
///
/// Determinism contract:
/// - aggregate() deduplicates by node id, requires at least `threshold`
///   distinct valid shares, and always selects the first `threshold` in
///   ascending node-id order
/// - the aggregate signature is reproducible from `contributing_nodes` alone

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;

use crate::ed25519::{sha256, CryptoError, CryptoResult};

type HmacSha256 = Hmac<Sha256>;

/// Length of a signature share in octets (HMAC-SHA256 output).
pub const SHARE_SIZE: usize = 32;

const AGGREGATION_DOMAIN: &[u8] = b"||THRESHOLD_AGG";
const COMMITMENT_DOMAIN: &[u8] = b"PACT-SHARE-COMMIT";

/// A t-of-n threshold signature assembled from node shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSignature {
    /// Aggregate signature bytes (32 octets)
    pub signature: Vec<u8>,

    /// Exactly `threshold` distinct node indices, ascending
    pub contributing_nodes: Vec<u16>,

    /// The scheme threshold t that this signature claims to meet
    pub threshold: usize,
}

/// Dealer-provisioned threshold scheme holding all n share keys.
#[derive(Debug, Clone)]
pub struct ThresholdScheme {
    share_keys: Vec<[u8; 32]>,
    threshold: usize,
    aggregation_key: [u8; 32],
}

impl ThresholdScheme {
    /// Generate a fresh scheme for n nodes with the given threshold.
    pub fn generate<R: rand::RngCore>(
        n: usize,
        threshold: usize,
        rng: &mut R,
    ) -> CryptoResult<Self> {
        if n == 0 || threshold == 0 || threshold > n {
            return Err(CryptoError::KeyDerivationFailed(format!(
                "invalid threshold parameters: t={} of n={}",
                threshold, n
            )));
        }

        let mut share_keys = Vec::with_capacity(n);
        for _ in 0..n {
            let mut key = [0u8; 32];
            rng.fill_bytes(&mut key);
            share_keys.push(key);
        }

        let aggregation_key = Self::derive_aggregation_key(&share_keys);
        Ok(Self {
            share_keys,
            threshold,
            aggregation_key,
        })
    }

    /// Public identifier of this scheme instance, committed to every share
    /// key without revealing any of them.
    pub fn aggregation_key(&self) -> [u8; 32] {
        self.aggregation_key
    }

    pub fn node_count(&self) -> usize {
        self.share_keys.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    fn derive_aggregation_key(share_keys: &[[u8; 32]]) -> [u8; 32] {
        let mut material = Vec::with_capacity(share_keys.len() * 32 + COMMITMENT_DOMAIN.len());
        material.extend_from_slice(COMMITMENT_DOMAIN);
        for (i, key) in share_keys.iter().enumerate() {
            let mut node_material = Vec::with_capacity(34);
            node_material.extend_from_slice(&(i as u16).to_be_bytes());
            node_material.extend_from_slice(key);
            material.extend_from_slice(&sha256(&node_material));
        }
        sha256(&material)
    }

    fn derive_share(&self, node_id: u16, message: &[u8]) -> CryptoResult<[u8; 32]> {
        let key = self
            .share_keys
            .get(node_id as usize)
            .ok_or_else(|| CryptoError::KeyDerivationFailed(format!(
                "node id {} out of range (n={})",
                node_id,
                self.share_keys.len()
            )))?;

        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        mac.update(message);
        let out = mac.finalize().into_bytes();
        let mut share = [0u8; 32];
        share.copy_from_slice(&out);
        Ok(share)
    }

    /// Create the signature share for one node over a message.
    pub fn create_share(&self, node_id: u16, message: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(self.derive_share(node_id, message)?.to_vec())
    }

    /// Verify a single node's share over a message.
    pub fn verify_share(&self, node_id: u16, message: &[u8], share: &[u8]) -> bool {
        match self.derive_share(node_id, message) {
            Ok(expected) => expected.as_slice() == share,
            Err(_) => false,
        }
    }

    /// Aggregate shares into a threshold signature.
    ///
    /// Deduplicates by node id, drops invalid shares, and requires at least
    /// `threshold` distinct valid contributors. Selection is deterministic:
    /// the first `threshold` contributors in ascending node-id order. Returns
    /// `None` when the threshold is not met; callers retry on further shares.
    pub fn aggregate(
        &self,
        message: &[u8],
        shares: &[(u16, Vec<u8>)],
    ) -> Option<ThresholdSignature> {
        let mut valid: BTreeMap<u16, [u8; 32]> = BTreeMap::new();
        for (node_id, share) in shares {
            if valid.contains_key(node_id) {
                continue;
            }
            if !self.verify_share(*node_id, message, share) {
                continue;
            }
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(share);
            valid.insert(*node_id, bytes);
        }

        if valid.len() < self.threshold {
            return None;
        }

        let contributing: Vec<(u16, [u8; 32])> =
            valid.into_iter().take(self.threshold).collect();
        let signature = Self::combine(
            message,
            contributing.iter().map(|(_, share)| share),
        );

        Some(ThresholdSignature {
            signature: signature.to_vec(),
            contributing_nodes: contributing.iter().map(|(id, _)| *id).collect(),
            threshold: self.threshold,
        })
    }

    /// Verify a threshold signature by recomputing the aggregation from the
    /// claimed contributors.
    pub fn verify_threshold(&self, message: &[u8], sig: &ThresholdSignature) -> bool {
        if sig.threshold != self.threshold {
            return false;
        }
        if sig.contributing_nodes.len() != self.threshold {
            return false;
        }
        // Ascending and distinct, every index in range.
        if !sig
            .contributing_nodes
            .windows(2)
            .all(|pair| pair[0] < pair[1])
        {
            return false;
        }
        if sig
            .contributing_nodes
            .iter()
            .any(|&id| id as usize >= self.share_keys.len())
        {
            return false;
        }

        let mut shares = Vec::with_capacity(self.threshold);
        for &node_id in &sig.contributing_nodes {
            match self.derive_share(node_id, message) {
                Ok(share) => shares.push(share),
                Err(_) => return false,
            }
        }

        let expected = Self::combine(message, shares.iter());
        expected.as_slice() == sig.signature.as_slice()
    }

    fn combine<'a, I: Iterator<Item = &'a [u8; 32]>>(message: &[u8], shares: I) -> [u8; 32] {
        let mut accumulator = [0u8; 32];
        for share in shares {
            for (acc, byte) in accumulator.iter_mut().zip(share.iter()) {
                *acc ^= byte;
            }
        }
        let mut material =
            Vec::with_capacity(accumulator.len() + message.len() + AGGREGATION_DOMAIN.len());
        material.extend_from_slice(&accumulator);
        material.extend_from_slice(message);
        material.extend_from_slice(AGGREGATION_DOMAIN);
        sha256(&material)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scheme(n: usize, t: usize, seed: u64) -> ThresholdScheme {
        let mut rng = StdRng::seed_from_u64(seed);
        ThresholdScheme::generate(n, t, &mut rng).unwrap()
    }

    fn all_shares(s: &ThresholdScheme, message: &[u8]) -> Vec<(u16, Vec<u8>)> {
        (0..s.node_count() as u16)
            .map(|id| (id, s.create_share(id, message).unwrap()))
            .collect()
    }

    #[test]
    fn test_share_verifies_for_owner_only() {
        let s = scheme(4, 3, 1);
        let share = s.create_share(0, b"round-1").unwrap();
        assert!(s.verify_share(0, b"round-1", &share));
        assert!(!s.verify_share(1, b"round-1", &share));
        assert!(!s.verify_share(0, b"round-2", &share));
    }

    #[test]
    fn test_aggregate_below_threshold_returns_none() {
        let s = scheme(4, 3, 2);
        let shares = all_shares(&s, b"value");
        assert!(s.aggregate(b"value", &shares[..2]).is_none());
    }

    #[test]
    fn test_aggregate_selects_first_t_ascending() {
        let s = scheme(7, 5, 3);
        // Offer shares out of order; selection must still be 0..5 ascending.
        let mut shares = all_shares(&s, b"value");
        shares.reverse();
        let sig = s.aggregate(b"value", &shares).unwrap();
        assert_eq!(sig.contributing_nodes, vec![0, 1, 2, 3, 4]);
        assert_eq!(sig.threshold, 5);
    }

    #[test]
    fn test_aggregate_deduplicates_by_node() {
        let s = scheme(4, 3, 4);
        let shares = all_shares(&s, b"value");
        // Two distinct contributors, one of them repeated: below threshold.
        let duplicated = vec![
            shares[0].clone(),
            shares[0].clone(),
            shares[1].clone(),
        ];
        assert!(s.aggregate(b"value", &duplicated).is_none());
    }

    #[test]
    fn test_aggregate_ignores_invalid_shares() {
        let s = scheme(4, 3, 5);
        let mut shares = all_shares(&s, b"value");
        shares[0].1 = vec![0u8; SHARE_SIZE];
        assert!(s.aggregate(b"value", &shares[..3]).is_none());
        assert!(s.aggregate(b"value", &shares).is_some());
    }

    #[test]
    fn test_verify_threshold_roundtrip() {
        let s = scheme(4, 3, 6);
        let shares = all_shares(&s, b"value");
        let sig = s.aggregate(b"value", &shares).unwrap();
        assert!(s.verify_threshold(b"value", &sig));
        assert!(!s.verify_threshold(b"other value", &sig));
    }

    #[test]
    fn test_verify_threshold_rejects_tampered_contributors() {
        let s = scheme(7, 5, 7);
        let shares = all_shares(&s, b"value");
        let mut sig = s.aggregate(b"value", &shares).unwrap();
        sig.contributing_nodes = vec![0, 1, 2, 3, 5];
        assert!(!s.verify_threshold(b"value", &sig));
    }

    #[test]
    fn test_verify_threshold_rejects_unsorted_contributors() {
        let s = scheme(4, 3, 8);
        let shares = all_shares(&s, b"value");
        let mut sig = s.aggregate(b"value", &shares).unwrap();
        sig.contributing_nodes.swap(0, 1);
        assert!(!s.verify_threshold(b"value", &sig));
    }

    #[test]
    fn test_aggregation_key_stable_per_scheme() {
        let a = scheme(4, 3, 9);
        let b = scheme(4, 3, 9);
        let c = scheme(4, 3, 10);
        assert_eq!(a.aggregation_key(), b.aggregation_key());
        assert_ne!(a.aggregation_key(), c.aggregation_key());
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let mut rng = StdRng::seed_from_u64(11);
        assert!(ThresholdScheme::generate(0, 1, &mut rng).is_err());
        assert!(ThresholdScheme::generate(4, 0, &mut rng).is_err());
        assert!(ThresholdScheme::generate(4, 5, &mut rng).is_err());
    }
}
