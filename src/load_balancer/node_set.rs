//! Node population builder.
//!
//! # Responsibilities
//! - Build static nodes for `direct` backends and apply them once
//! - Watch the registry for a `discovery` backend and replace the population
//!   on every non-empty event
//! - Own the watch task so the client can stop it

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::target::{Target, TargetScheme};
use crate::config::{EndpointConfig, Protocol};
use crate::discovery::{parse_endpoint, Discovery, DiscoveryError, ServiceInstance, Watcher};
use crate::error::ProxyError;
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::load_balancer::{HttpNode, Node, Selector};
use crate::observability::metrics;
use crate::resilience::calc_timeout;

/// Shared shape of every node an endpoint creates.
#[derive(Debug, Clone, Copy)]
struct NodeTemplate {
    protocol: Protocol,
    weight: u32,
    timeout: Duration,
}

impl NodeTemplate {
    fn build(&self, address: &str) -> Arc<dyn Node> {
        Arc::new(HttpNode::new(address, self.protocol, self.weight, self.timeout))
    }

    /// One node per instance with a usable endpoint for this protocol.
    fn nodes_for(&self, endpoint: &str, instances: &[ServiceInstance]) -> Vec<Arc<dyn Node>> {
        let (scheme, secure) = self.protocol.endpoint_scheme();
        let mut nodes = Vec::with_capacity(instances.len());
        for instance in instances {
            match parse_endpoint(&instance.endpoints, scheme, secure) {
                Ok(Some(addr)) => nodes.push(self.build(&addr)),
                Ok(None) => tracing::warn!(
                    endpoint = %endpoint,
                    instance = %instance.id,
                    scheme = %scheme,
                    "Instance has no endpoint for protocol"
                ),
                Err(e) => tracing::error!(
                    endpoint = %endpoint,
                    instance = %instance.id,
                    error = %e,
                    "Failed to parse instance endpoint"
                ),
            }
        }
        nodes
    }
}

/// Handle on a running discovery watch.
///
/// Dropping the handle stops the watch as well.
#[derive(Debug)]
pub struct WatchHandle {
    service: String,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Ask the watch loop to exit.
    pub fn stop(&self) {
        self.shutdown.trigger();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the watch and wait for the loop to exit.
    pub async fn join(self) {
        let WatchHandle { shutdown, task, .. } = self;
        shutdown.trigger();
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Discovery watch task ended abnormally");
        }
    }
}

/// Populates the selector backing one endpoint.
pub struct NodeSetBuilder {
    endpoint: EndpointConfig,
    timeout: Duration,
    registry: Option<Arc<dyn Discovery>>,
}

impl NodeSetBuilder {
    pub fn new(endpoint: &EndpointConfig, registry: Option<Arc<dyn Discovery>>) -> Self {
        Self {
            endpoint: endpoint.clone(),
            timeout: calc_timeout(endpoint),
            registry,
        }
    }

    /// Fill `dst` and, for a discovery backend, start keeping it current.
    pub async fn apply(&self, dst: Arc<dyn Selector>) -> Result<Option<WatchHandle>, ProxyError> {
        let name = self.endpoint.name.as_str();
        let mut nodes: Vec<Arc<dyn Node>> = Vec::new();
        let mut watch = None;

        for backend in &self.endpoint.backends {
            tracing::debug!(endpoint = %name, target = %backend.target, "Resolving backend");
            let target = Target::parse(&backend.target)?;
            let template = NodeTemplate {
                protocol: self.endpoint.protocol,
                weight: backend.weight,
                timeout: self.timeout,
            };

            match target.scheme {
                TargetScheme::Direct => nodes.push(template.build(&target.endpoint)),
                TargetScheme::Discovery => {
                    // Only one logical service per endpoint.
                    if self.endpoint.backends.len() > 1 {
                        return Err(ProxyError::Config(format!(
                            "endpoint '{}': a discovery backend must be the only backend",
                            name
                        )));
                    }
                    let registry = self.registry.clone().ok_or_else(|| {
                        ProxyError::Config(format!(
                            "endpoint '{}': discovery backend configured without a registry",
                            name
                        ))
                    })?;
                    let watcher = registry.watch(&target.endpoint).await?;
                    watch = Some(spawn_watch(name, &target.endpoint, watcher, dst.clone(), template));
                }
            }
        }

        if !nodes.is_empty() {
            tracing::info!(endpoint = %name, nodes = nodes.len(), "Static nodes applied");
            metrics::set_endpoint_nodes(name, nodes.len());
            dst.apply(nodes);
        }
        Ok(watch)
    }
}

fn spawn_watch(
    endpoint: &str,
    service: &str,
    watcher: Box<dyn Watcher>,
    dst: Arc<dyn Selector>,
    template: NodeTemplate,
) -> WatchHandle {
    let shutdown = Shutdown::new();
    let task = tokio::spawn(watch_loop(
        endpoint.to_string(),
        service.to_string(),
        watcher,
        dst,
        template,
        shutdown.subscribe(),
    ));
    WatchHandle {
        service: service.to_string(),
        shutdown,
        task,
    }
}

async fn watch_loop(
    endpoint: String,
    service: String,
    mut watcher: Box<dyn Watcher>,
    dst: Arc<dyn Selector>,
    template: NodeTemplate,
    mut shutdown: ShutdownSignal,
) {
    tracing::info!(endpoint = %endpoint, service = %service, "Discovery watch started");

    loop {
        let next = tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(endpoint = %endpoint, service = %service, "Discovery watch stopping");
                break;
            }
            next = watcher.next() => next,
        };

        let instances = match next {
            Ok(instances) => instances,
            Err(DiscoveryError::Canceled) => {
                tracing::info!(endpoint = %endpoint, service = %service, "Discovery watch canceled");
                break;
            }
            Err(e) => {
                tracing::error!(endpoint = %endpoint, service = %service, error = %e, "Discovery watch error");
                continue;
            }
        };

        // An empty push means "no change", not "no nodes".
        if instances.is_empty() {
            tracing::debug!(endpoint = %endpoint, service = %service, "Ignoring empty watch event");
            continue;
        }

        let nodes = template.nodes_for(&endpoint, &instances);
        if nodes.is_empty() {
            tracing::warn!(
                endpoint = %endpoint,
                service = %service,
                instances = instances.len(),
                "No usable instance in watch event, keeping current nodes"
            );
            continue;
        }

        tracing::info!(endpoint = %endpoint, service = %service, nodes = nodes.len(), "Replacing node set");
        metrics::set_endpoint_nodes(&endpoint, nodes.len());
        dst.apply(nodes);
    }

    if let Err(e) = watcher.stop().await {
        tracing::warn!(endpoint = %endpoint, service = %service, error = %e, "Failed to stop watcher");
    }
}
