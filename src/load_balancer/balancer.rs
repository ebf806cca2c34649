//! Node population and selection.
//!
//! # Responsibilities
//! - Hold the current population of one endpoint behind an atomic snapshot
//! - Apply request filters and delegate the pick to a strategy
//! - Track in-flight attempts per node through the done callback

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::BalancerKind;
use crate::error::ProxyError;
use crate::load_balancer::{
    p2c::PowerOfTwoChoices, round_robin::RoundRobin, weighted::WeightedRandom, Done, DoneInfo,
    LoadBalancer, Node, NodeFilter, Selected, Selector,
};

/// A node plus the statistics the strategies read.
#[derive(Debug)]
pub struct WeightedNode {
    pub node: Arc<dyn Node>,
    /// Number of attempts currently running against this node.
    pub inflight: AtomicUsize,
    /// Failed attempts since the node joined the population.
    pub failures: AtomicU64,
}

impl WeightedNode {
    pub fn new(node: Arc<dyn Node>) -> Self {
        Self {
            node,
            inflight: AtomicUsize::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn address(&self) -> &str {
        self.node.address()
    }

    pub fn weight(&self) -> u32 {
        self.node.weight().max(1)
    }

    /// In-flight attempts scaled down by weight. Lower is better.
    pub fn load(&self) -> u64 {
        let inflight = self.inflight.load(Ordering::Relaxed) as u64 + 1;
        inflight * 1000 / self.weight() as u64
    }

    fn begin(self: &Arc<Self>) -> InflightGuard {
        self.inflight.fetch_add(1, Ordering::Relaxed);
        InflightGuard { node: self.clone() }
    }
}

/// Decrements the in-flight count on drop.
struct InflightGuard {
    node: Arc<WeightedNode>,
}

impl InflightGuard {
    fn finish(self, info: DoneInfo<'_>) {
        if info.err.is_some() {
            self.node.failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.node.inflight.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Selector over an atomically replaceable node population.
#[derive(Debug)]
pub struct Balancer {
    nodes: ArcSwap<Vec<Arc<WeightedNode>>>,
    strategy: Box<dyn LoadBalancer>,
}

impl Balancer {
    pub fn new(strategy: Box<dyn LoadBalancer>) -> Self {
        Self {
            nodes: ArcSwap::from_pointee(Vec::new()),
            strategy,
        }
    }

    pub fn from_kind(kind: BalancerKind) -> Self {
        let strategy: Box<dyn LoadBalancer> = match kind {
            BalancerKind::P2c => Box::new(PowerOfTwoChoices::new()),
            BalancerKind::RoundRobin => Box::new(RoundRobin::new()),
            BalancerKind::WeightedRandom => Box::new(WeightedRandom::new()),
        };
        Self::new(strategy)
    }

    /// Snapshot of the current population.
    pub fn nodes(&self) -> Vec<Arc<WeightedNode>> {
        self.nodes.load().as_ref().clone()
    }

    /// Addresses of the current population.
    pub fn addresses(&self) -> Vec<String> {
        self.nodes
            .load()
            .iter()
            .map(|n| n.address().to_string())
            .collect()
    }
}

impl Selector for Balancer {
    fn select(&self, filters: &[NodeFilter]) -> Result<Selected, ProxyError> {
        let snapshot = self.nodes.load();
        let candidates: Vec<Arc<WeightedNode>> = snapshot
            .iter()
            .filter(|n| filters.iter().all(|f| f(n.node.as_ref())))
            .cloned()
            .collect();

        if candidates.is_empty() {
            tracing::debug!(population = snapshot.len(), "No candidate node left after filtering");
            return Err(ProxyError::NoAvailableNode);
        }

        let picked = self
            .strategy
            .next_server(&candidates)
            .ok_or(ProxyError::NoAvailableNode)?;
        let guard = picked.begin();

        Ok(Selected {
            node: picked.node.clone(),
            done: Done::new(move |info| guard.finish(info)),
        })
    }

    fn apply(&self, nodes: Vec<Arc<dyn Node>>) {
        let population: Vec<Arc<WeightedNode>> = nodes
            .into_iter()
            .map(|n| Arc::new(WeightedNode::new(n)))
            .collect();
        self.nodes.store(Arc::new(population));
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, Response};

    /// Node that never forwards; for selection tests.
    #[derive(Debug)]
    pub(crate) struct StubNode {
        pub address: String,
        pub weight: u32,
    }

    #[async_trait]
    impl Node for StubNode {
        fn address(&self) -> &str {
            &self.address
        }

        fn weight(&self) -> u32 {
            self.weight
        }

        async fn forward(&self, _req: Request<Body>) -> Result<Response<Body>, ProxyError> {
            Ok(Response::new(Body::empty()))
        }
    }

    pub(crate) fn stub(address: &str, weight: u32) -> Arc<dyn Node> {
        Arc::new(StubNode { address: address.to_string(), weight })
    }

    pub(crate) fn weighted(address: &str, weight: u32) -> Arc<WeightedNode> {
        Arc::new(WeightedNode::new(stub(address, weight)))
    }

    #[test]
    fn test_empty_population_fails() {
        let balancer = Balancer::from_kind(BalancerKind::RoundRobin);
        let err = balancer.select(&[]).unwrap_err();
        assert!(matches!(err, ProxyError::NoAvailableNode));
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let balancer = Balancer::from_kind(BalancerKind::RoundRobin);
        balancer.apply(vec![stub("10.0.0.1:80", 1), stub("10.0.0.2:80", 1), stub("10.0.0.3:80", 1)]);

        let not_first: NodeFilter = Arc::new(|n: &dyn Node| n.address() != "10.0.0.1:80");
        let not_second: NodeFilter = Arc::new(|n: &dyn Node| n.address() != "10.0.0.2:80");

        for _ in 0..5 {
            let selected = balancer.select(&[not_first.clone(), not_second.clone()]).unwrap();
            assert_eq!(selected.node.address(), "10.0.0.3:80");
        }

        let nothing: NodeFilter = Arc::new(|_: &dyn Node| false);
        assert!(matches!(balancer.select(&[nothing]), Err(ProxyError::NoAvailableNode)));
    }

    #[test]
    fn test_apply_replaces_population() {
        let balancer = Balancer::from_kind(BalancerKind::P2c);
        balancer.apply(vec![stub("old-1:80", 1), stub("old-2:80", 1)]);
        balancer.apply(vec![stub("new-1:80", 1), stub("new-2:80", 1), stub("new-3:80", 1)]);

        assert_eq!(balancer.addresses(), vec!["new-1:80", "new-2:80", "new-3:80"]);
        for _ in 0..50 {
            let selected = balancer.select(&[]).unwrap();
            assert!(selected.node.address().starts_with("new-"));
        }
    }

    #[test]
    fn test_done_tracks_inflight_and_failures() {
        let balancer = Balancer::from_kind(BalancerKind::RoundRobin);
        balancer.apply(vec![stub("10.0.0.1:80", 1)]);
        let node = balancer.nodes()[0].clone();

        let first = balancer.select(&[]).unwrap();
        let second = balancer.select(&[]).unwrap();
        assert_eq!(node.inflight.load(Ordering::Relaxed), 2);

        first.done.finish(DoneInfo { err: Some(&ProxyError::NoAvailableNode) });
        assert_eq!(node.inflight.load(Ordering::Relaxed), 1);
        assert_eq!(node.failures.load(Ordering::Relaxed), 1);

        // Dropping without finishing still releases the slot.
        drop(second);
        assert_eq!(node.inflight.load(Ordering::Relaxed), 0);
        assert_eq!(node.failures.load(Ordering::Relaxed), 1);
    }
}
