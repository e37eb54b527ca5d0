//! BFT system parameters.
//!
//! Classical sizing: `n = 3f + 1` nodes tolerate `f` Byzantine faults with a
//! commit threshold of `t = 2f + 1`. Any two threshold quorums intersect in
//! at least `f + 1` nodes, so at least one honest node sits in both; honest
//! nodes never sign two values in one round, which is the whole safety
//! argument.

use serde::{Deserialize, Serialize};

use crate::arbitrator::BftError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BftConfig {
    n: usize,
    f: usize,
}

impl BftConfig {
    /// Build from an explicit pair; `n` must equal `3f + 1`.
    pub fn new(n: usize, f: usize) -> Result<Self, BftError> {
        let expected = 3 * f + 1;
        if n != expected {
            return Err(BftError::InvalidConfig { n, f, expected });
        }
        Ok(Self { n, f })
    }

    /// The minimal cluster tolerating `f` Byzantine nodes.
    pub fn with_faults(f: usize) -> Self {
        Self { n: 3 * f + 1, f }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn f(&self) -> usize {
        self.f
    }

    /// Commit threshold `t = 2f + 1`.
    pub fn threshold(&self) -> usize {
        2 * self.f + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_math() {
        let cfg = BftConfig::with_faults(1);
        assert_eq!(cfg.n(), 4);
        assert_eq!(cfg.threshold(), 3);

        let cfg = BftConfig::with_faults(2);
        assert_eq!(cfg.n(), 7);
        assert_eq!(cfg.threshold(), 5);
    }

    #[test]
    fn test_mismatched_n_rejected() {
        assert!(BftConfig::new(5, 1).is_err());
        assert!(BftConfig::new(4, 1).is_ok());
    }

    #[test]
    fn test_quorum_intersection() {
        // Any two subsets of size t drawn from n nodes share at least f + 1
        // members. Exhaustive for the two smallest clusters.
        for f in [1usize, 2] {
            let cfg = BftConfig::with_faults(f);
            let n = cfg.n();
            let t = cfg.threshold();
            let subsets = t_subsets(n, t);
            for a in &subsets {
                for b in &subsets {
                    let overlap = a.iter().filter(|x| b.contains(x)).count();
                    assert!(
                        overlap >= f + 1,
                        "quorums {:?} and {:?} overlap in only {}",
                        a,
                        b,
                        overlap
                    );
                }
            }
        }
    }

    fn t_subsets(n: usize, t: usize) -> Vec<Vec<usize>> {
        let mut out = Vec::new();
        for mask in 0u32..(1 << n) {
            if mask.count_ones() as usize == t {
                out.push((0..n).filter(|i| mask & (1 << i) != 0).collect());
            }
        }
        out
    }
}
