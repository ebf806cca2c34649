//! Weighted random load balancing strategy.

use rand::Rng;
use std::sync::Arc;

use crate::load_balancer::{LoadBalancer, WeightedNode};

/// Picks a candidate with probability proportional to its weight.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for WeightedRandom {
    fn next_server(&self, candidates: &[Arc<WeightedNode>]) -> Option<Arc<WeightedNode>> {
        let total: u64 = candidates.iter().map(|c| c.weight() as u64).sum();
        if total == 0 {
            return None;
        }

        let mut point = rand::thread_rng().gen_range(0..total);
        for candidate in candidates {
            let weight = candidate.weight() as u64;
            if point < weight {
                return Some(candidate.clone());
            }
            point -= weight;
        }
        candidates.last().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::balancer::tests::weighted;

    #[test]
    fn test_empty() {
        assert!(WeightedRandom::new().next_server(&[]).is_none());
    }

    #[test]
    fn test_distribution_follows_weight() {
        let lb = WeightedRandom::new();
        let candidates = vec![weighted("127.0.0.1:8080", 9), weighted("127.0.0.1:8081", 1)];

        let mut heavy_hits = 0;
        for _ in 0..2000 {
            if lb.next_server(&candidates).unwrap().address() == "127.0.0.1:8080" {
                heavy_hits += 1;
            }
        }
        // Expected 1800; wide margin keeps this stable.
        assert!(heavy_hits > 1500, "heavy node got {} of 2000", heavy_hits);
        assert!(heavy_hits < 2000, "light node never picked");
    }
}
