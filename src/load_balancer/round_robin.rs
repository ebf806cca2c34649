//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{LoadBalancer, WeightedNode};

/// Round-robin selector.
/// Stores an internal counter to rotate through candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(&self, candidates: &[Arc<WeightedNode>]) -> Option<Arc<WeightedNode>> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::balancer::tests::weighted;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let candidates = vec![weighted("127.0.0.1:8080", 1), weighted("127.0.0.1:8081", 1)];

        let s1 = lb.next_server(&candidates).unwrap();
        assert_eq!(s1.address(), "127.0.0.1:8080");

        let s2 = lb.next_server(&candidates).unwrap();
        assert_eq!(s2.address(), "127.0.0.1:8081");

        let s3 = lb.next_server(&candidates).unwrap();
        assert_eq!(s3.address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_empty() {
        assert!(RoundRobin::new().next_server(&[]).is_none());
    }
}
