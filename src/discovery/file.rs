//! File-backed service registry with hot reload.
//!
//! The file lists every instance:
//!
//! ```toml
//! [[services]]
//! id = "users-1"
//! name = "users"
//! endpoints = ["http://10.0.0.1:8000"]
//! ```
//!
//! On every modification the file is reparsed and each service's membership
//! is replaced in an inner [`MemoryRegistry`]. A file that fails to parse
//! leaves the current membership untouched.

use async_trait::async_trait;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::discovery::{Discovery, DiscoveryError, MemoryRegistry, ServiceInstance, Watcher};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegistryFile {
    services: Vec<ServiceInstance>,
}

/// Registry that mirrors a TOML file.
pub struct FileRegistry {
    path: PathBuf,
    inner: Arc<MemoryRegistry>,
    _watcher: RecommendedWatcher,
}

impl FileRegistry {
    /// Load the file and start watching it for changes.
    pub fn open(path: &Path) -> Result<Self, DiscoveryError> {
        let inner = Arc::new(MemoryRegistry::new());
        reload(path, &inner)?;

        let registry = inner.clone();
        let watched = path.to_path_buf();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!(path = %watched.display(), "Registry file change detected, reloading");
                        if let Err(e) = reload(&watched, &registry) {
                            tracing::error!(error = %e, "Failed to reload registry file. Keeping current membership.");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Registry file watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )
        .map_err(|e| DiscoveryError::Registry(e.to_string()))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| DiscoveryError::Registry(e.to_string()))?;

        tracing::info!(path = %path.display(), "Registry file loaded");
        Ok(Self {
            path: path.to_path_buf(),
            inner,
            _watcher: watcher,
        })
    }
}

impl std::fmt::Debug for FileRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRegistry")
            .field("path", &self.path)
            .field("services", &self.inner.service_names())
            .finish()
    }
}

/// Parse the file and replace membership service by service.
fn reload(path: &Path, registry: &MemoryRegistry) -> Result<(), DiscoveryError> {
    let content = fs::read_to_string(path)
        .map_err(|e| DiscoveryError::Registry(format!("{}: {}", path.display(), e)))?;
    let file: RegistryFile = toml::from_str(&content)
        .map_err(|e| DiscoveryError::Registry(format!("{}: {}", path.display(), e)))?;

    let mut grouped: HashMap<String, Vec<ServiceInstance>> = HashMap::new();
    for instance in file.services {
        grouped.entry(instance.name.clone()).or_default().push(instance);
    }

    // Services dropped from the file become empty.
    for name in registry.service_names() {
        if !grouped.contains_key(&name) {
            registry.set_instances(&name, Vec::new());
        }
    }
    for (name, instances) in grouped {
        tracing::debug!(service = %name, instances = instances.len(), "Registry membership loaded");
        registry.set_instances(&name, instances);
    }
    Ok(())
}

#[async_trait]
impl Discovery for FileRegistry {
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceInstance>, DiscoveryError> {
        self.inner.get_service(name).await
    }

    async fn watch(&self, name: &str) -> Result<Box<dyn Watcher>, DiscoveryError> {
        self.inner.watch(name).await
    }
}
