//! Name cache — stack and service display names keyed by opaque id.
//!
//! Stacks are learned from the event stream (with a REST fallback on miss),
//! services from the snapshot pass. Entries are evicted when the classifier
//! sees the matching `removed` event.

use dashmap::DashMap;
use tracing::warn;

use crate::metrics::UNKNOWN_TAG;
use crate::rancher::client::RancherClient;

/// Resolved ancestry of a service, as needed for instance label tuples.
#[derive(Debug, Clone)]
pub struct ServiceNames {
    pub stack_name: String,
    pub service_name: String,
}

#[derive(Debug, Default)]
pub struct NameCache {
    stacks: DashMap<String, String>,
    services: DashMap<String, ServiceNames>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stack name observation. First observation wins, matching
    /// the upstream id semantics (ids are never reused for renamed stacks).
    pub fn record_stack(&self, id: &str, name: &str) {
        self.stacks
            .entry(id.to_string())
            .or_insert_with(|| name.to_string());
    }

    pub fn stack_name(&self, id: &str) -> Option<String> {
        self.stacks.get(id).map(|r| r.value().clone())
    }

    /// Resolve a stack name, falling back to a synchronous REST fetch on a
    /// cache miss. A failed fetch yields the reserved unknown tag so the
    /// caller's label tuple stays well-formed.
    pub async fn resolve_stack(
        &self,
        client: &RancherClient,
        project_id: &str,
        stack_id: &str,
    ) -> String {
        if stack_id.is_empty() {
            return UNKNOWN_TAG.to_string();
        }
        if let Some(name) = self.stack_name(stack_id) {
            return name;
        }
        match client.stack_name(project_id, stack_id).await {
            Ok(name) => {
                self.record_stack(stack_id, &name);
                name
            }
            Err(e) => {
                warn!(stack_id, error = %e, "failed to resolve stack name");
                UNKNOWN_TAG.to_string()
            }
        }
    }

    pub fn record_service(&self, id: &str, names: ServiceNames) {
        self.services.insert(id.to_string(), names);
    }

    pub fn service(&self, id: &str) -> Option<ServiceNames> {
        self.services.get(id).map(|r| r.value().clone())
    }

    pub fn evict_stack(&self, id: &str) {
        self.stacks.remove(id);
    }

    pub fn evict_service(&self, id: &str) {
        self.services.remove(id);
    }
}
