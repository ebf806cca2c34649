//! In-process service registry.
//!
//! Each service name owns a `tokio::sync::watch` channel carrying its full
//! instance list. Watchers see every committed change, coalesced if they
//! fall behind.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::discovery::{Discovery, DiscoveryError, ServiceInstance, Watcher};

/// Registry backed by in-memory state.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    services: DashMap<String, watch::Sender<Vec<ServiceInstance>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, name: &str) -> watch::Sender<Vec<ServiceInstance>> {
        self.services
            .entry(name.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .clone()
    }

    /// Add or replace an instance (matched by id).
    pub fn register(&self, instance: ServiceInstance) {
        let name = instance.name.clone();
        self.sender(&name).send_modify(|list| {
            list.retain(|i| i.id != instance.id);
            list.push(instance);
        });
        tracing::debug!(service = %name, "Instance registered");
    }

    /// Remove an instance by id.
    pub fn deregister(&self, name: &str, id: &str) {
        self.sender(name).send_modify(|list| list.retain(|i| i.id != id));
        tracing::debug!(service = %name, id = %id, "Instance deregistered");
    }

    /// Replace the whole membership of a service.
    pub fn set_instances(&self, name: &str, instances: Vec<ServiceInstance>) {
        self.sender(name).send_replace(instances);
    }

    /// Names of every known service.
    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|e| e.key().clone()).collect()
    }
}

#[async_trait]
impl Discovery for MemoryRegistry {
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        Ok(self
            .services
            .get(name)
            .map(|tx| tx.borrow().clone())
            .unwrap_or_default())
    }

    async fn watch(&self, name: &str) -> Result<Box<dyn Watcher>, DiscoveryError> {
        let rx = self.sender(name).subscribe();
        Ok(Box::new(MemoryWatcher {
            rx,
            primed: false,
            stopped: false,
        }))
    }
}

/// Watcher over one service's channel.
#[derive(Debug)]
pub struct MemoryWatcher {
    rx: watch::Receiver<Vec<ServiceInstance>>,
    primed: bool,
    stopped: bool,
}

#[async_trait]
impl Watcher for MemoryWatcher {
    async fn next(&mut self) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        if self.stopped {
            return Err(DiscoveryError::Canceled);
        }
        if !self.primed {
            self.primed = true;
            return Ok(self.rx.borrow_and_update().clone());
        }
        // Sender dropped means the registry is gone.
        self.rx.changed().await.map_err(|_| DiscoveryError::Canceled)?;
        Ok(self.rx.borrow_and_update().clone())
    }

    async fn stop(&mut self) -> Result<(), DiscoveryError> {
        self.stopped = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn instance(id: &str, port: u16) -> ServiceInstance {
        ServiceInstance::new(id, "users", vec![format!("http://127.0.0.1:{}", port)])
    }

    #[tokio::test]
    async fn test_first_next_returns_current() {
        let registry = MemoryRegistry::new();
        registry.register(instance("a", 8001));

        let mut watcher = registry.watch("users").await.unwrap();
        let list = watcher.next().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "a");
    }

    #[tokio::test]
    async fn test_next_blocks_until_change() {
        let registry = MemoryRegistry::new();
        let mut watcher = registry.watch("users").await.unwrap();
        assert!(watcher.next().await.unwrap().is_empty());

        let pending = tokio::time::timeout(Duration::from_millis(50), watcher.next()).await;
        assert!(pending.is_err(), "next() must block without a change");

        registry.register(instance("a", 8001));
        registry.register(instance("b", 8002));
        let list = watcher.next().await.unwrap();
        assert_eq!(list.len(), 2);

        registry.deregister("users", "a");
        let list = watcher.next().await.unwrap();
        assert_eq!(list, vec![instance("b", 8002)]);
        assert_eq!(registry.get_service("users").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_replaces_same_id() {
        let registry = MemoryRegistry::new();
        registry.register(instance("a", 8001));
        registry.register(instance("a", 9001));

        let list = registry.get_service("users").await.unwrap();
        assert_eq!(list, vec![instance("a", 9001)]);
        assert!(registry.get_service("unknown").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_cancels() {
        let registry = MemoryRegistry::new();
        let mut watcher = registry.watch("users").await.unwrap();
        watcher.stop().await.unwrap();
        assert_eq!(watcher.next().await.unwrap_err(), DiscoveryError::Canceled);
    }

    #[tokio::test]
    async fn test_dropped_registry_cancels() {
        let registry = MemoryRegistry::new();
        let mut watcher = registry.watch("users").await.unwrap();
        watcher.next().await.unwrap();
        drop(registry);
        assert_eq!(watcher.next().await.unwrap_err(), DiscoveryError::Canceled);
    }
}
