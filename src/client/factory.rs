//! Builds endpoint clients from configuration.

use std::sync::Arc;

use crate::client::EndpointClient;
use crate::config::EndpointConfig;
use crate::discovery::Discovery;
use crate::error::ProxyError;
use crate::load_balancer::{Balancer, NodeSetBuilder};
use crate::resilience::RetryPolicy;

/// Shared construction context for every endpoint client.
#[derive(Clone, Default)]
pub struct ClientFactory {
    registry: Option<Arc<dyn Discovery>>,
}

impl ClientFactory {
    pub fn new(registry: Option<Arc<dyn Discovery>>) -> Self {
        Self { registry }
    }

    /// Build the client for one endpoint.
    ///
    /// The retry policy is resolved first, so a malformed condition fails
    /// before any node or watch exists.
    pub async fn build(&self, endpoint: &EndpointConfig) -> Result<EndpointClient, ProxyError> {
        let policy = RetryPolicy::from_endpoint(endpoint)?;
        let balancer = Arc::new(Balancer::from_kind(endpoint.balancer));

        let watch = NodeSetBuilder::new(endpoint, self.registry.clone())
            .apply(balancer.clone())
            .await?;

        tracing::info!(
            endpoint = %endpoint.name,
            attempts = policy.attempts(),
            per_try_timeout = ?policy.per_try_timeout(),
            balancer = ?endpoint.balancer,
            watching = watch.is_some(),
            "Endpoint client built"
        );

        Ok(EndpointClient::with_selector(endpoint.name.clone(), balancer, policy).with_watch(watch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, RetryConditionConfig, RetryConfig};
    use crate::discovery::{MemoryRegistry, ServiceInstance};
    use std::time::Duration;

    fn endpoint(target: &str, retry: Option<RetryConfig>) -> EndpointConfig {
        EndpointConfig {
            name: "orders".into(),
            host: None,
            path_prefix: Some("/orders".into()),
            priority: 0,
            protocol: Default::default(),
            balancer: Default::default(),
            timeout_ms: 5000,
            backends: vec![BackendConfig { target: target.into(), weight: 1 }],
            retry,
        }
    }

    #[tokio::test]
    async fn test_build_direct_client() {
        let retry = RetryConfig {
            attempts: 3,
            per_try_timeout_ms: Some(2000),
            conditions: vec![RetryConditionConfig::ByStatusCode("502-504".into())],
            ..Default::default()
        };
        let client = ClientFactory::default()
            .build(&endpoint("direct:///127.0.0.1:9100", Some(retry)))
            .await
            .unwrap();

        assert_eq!(client.name(), "orders");
        assert_eq!(client.policy().attempts(), 3);
        assert_eq!(client.policy().per_try_timeout(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_malformed_condition_fails_build() {
        let retry = RetryConfig {
            attempts: 2,
            conditions: vec![RetryConditionConfig::ByStatusCode("5xx".into())],
            ..Default::default()
        };
        let err = ClientFactory::default()
            .build(&endpoint("127.0.0.1:9100", Some(retry)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
    }

    fn orders_at(port: u16) -> Vec<ServiceInstance> {
        vec![ServiceInstance::new("o-1", "orders", vec![format!("http://127.0.0.1:{}", port)])]
    }

    async fn wait_for(balancer: &Balancer, address: &str) {
        for _ in 0..100 {
            if balancer.addresses() == [address] {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("balancer never reached {}: {:?}", address, balancer.addresses());
    }

    /// A discovery-backed client sharing its balancer with the test.
    async fn watching_client(registry: Arc<MemoryRegistry>) -> (EndpointClient, Arc<Balancer>) {
        let endpoint = endpoint("discovery:///orders", None);
        let balancer = Arc::new(Balancer::from_kind(endpoint.balancer));
        let watch = NodeSetBuilder::new(&endpoint, Some(registry.clone()))
            .apply(balancer.clone())
            .await
            .unwrap();
        assert!(watch.is_some());

        let policy = RetryPolicy::from_endpoint(&endpoint).unwrap();
        let client = EndpointClient::with_selector("orders", balancer.clone(), policy).with_watch(watch);

        wait_for(&balancer, "127.0.0.1:9200").await;
        registry.set_instances("orders", orders_at(9201));
        wait_for(&balancer, "127.0.0.1:9201").await;
        (client, balancer)
    }

    #[tokio::test]
    async fn test_close_stops_membership_updates() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.set_instances("orders", orders_at(9200));
        let (client, balancer) = watching_client(registry.clone()).await;

        client.close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        registry.set_instances("orders", orders_at(9202));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(balancer.addresses(), ["127.0.0.1:9201"]);
    }

    #[tokio::test]
    async fn test_drop_stops_membership_updates() {
        let registry = Arc::new(MemoryRegistry::new());
        registry.set_instances("orders", orders_at(9200));
        let (client, balancer) = watching_client(registry.clone()).await;

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;

        registry.set_instances("orders", orders_at(9202));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(balancer.addresses(), ["127.0.0.1:9201"]);
    }
}
