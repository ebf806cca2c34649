//! Power-of-two-choices load balancing strategy.

use rand::Rng;
use std::sync::Arc;

use crate::load_balancer::{LoadBalancer, WeightedNode};

/// Picks two distinct candidates at random and keeps the less loaded one.
/// Load is in-flight attempts divided by weight.
#[derive(Debug, Default)]
pub struct PowerOfTwoChoices;

impl PowerOfTwoChoices {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for PowerOfTwoChoices {
    fn next_server(&self, candidates: &[Arc<WeightedNode>]) -> Option<Arc<WeightedNode>> {
        match candidates.len() {
            0 => None,
            1 => Some(candidates[0].clone()),
            len => {
                let mut rng = rand::thread_rng();
                let a = rng.gen_range(0..len);
                // Second index drawn from the remaining len-1 slots.
                let mut b = rng.gen_range(0..len - 1);
                if b >= a {
                    b += 1;
                }
                let (a, b) = (&candidates[a], &candidates[b]);
                // In case of tie, the first draw is kept
                if b.load() < a.load() {
                    Some(b.clone())
                } else {
                    Some(a.clone())
                }
            }
        }
    }
}
