//! Worker registry
//!
//! Built once, then shared read-only (behind an `Arc`) by every run. Each id
//! maps to its descriptor and to a factory closure that produces the worker;
//! there is no lookup by derived type name.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::WorkerError;
use crate::worker::{Worker, WorkerDescriptor, WorkerHandle};

/// Produces a worker instance on demand
pub type WorkerFactory = Arc<dyn Fn() -> anyhow::Result<Arc<dyn Worker>> + Send + Sync>;

struct Entry {
    descriptor: Arc<WorkerDescriptor>,
    factory: WorkerFactory,
}

/// Maps worker ids to descriptors and factories
#[derive(Default)]
pub struct WorkerRegistry {
    /// Registration order, used for prompts and summaries
    order: Vec<String>,
    entries: HashMap<String, Entry>,
}

impl WorkerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker factory under the descriptor's id
    ///
    /// Registering an id twice replaces the earlier entry.
    pub fn register<F>(&mut self, descriptor: WorkerDescriptor, factory: F) -> &mut Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn Worker>> + Send + Sync + 'static,
    {
        let id = descriptor.id.clone();
        let entry = Entry {
            descriptor: Arc::new(descriptor),
            factory: Arc::new(factory),
        };

        if self.entries.insert(id.clone(), entry).is_some() {
            warn!(worker_id = %id, "Replacing previously registered worker");
        } else {
            self.order.push(id.clone());
        }

        debug!(worker_id = %id, "Registered worker");
        self
    }

    /// Register an already-built worker instance
    pub fn register_instance(
        &mut self,
        descriptor: WorkerDescriptor,
        worker: Arc<dyn Worker>,
    ) -> &mut Self {
        self.register(descriptor, move || Ok(Arc::clone(&worker)))
    }

    /// Instantiate the worker registered under `id`
    ///
    /// Unknown ids, inactive workers and factory failures are all
    /// [`WorkerError::Unavailable`].
    pub fn worker(&self, id: &str) -> Result<WorkerHandle, WorkerError> {
        let entry = self.entries.get(id).ok_or_else(|| WorkerError::Unavailable {
            id: id.to_string(),
            reason: format!("not registered; available: {}", self.active_ids().join(", ")),
        })?;

        if !entry.descriptor.is_active() {
            return Err(WorkerError::Unavailable {
                id: id.to_string(),
                reason: "worker is inactive".to_string(),
            });
        }

        let worker = (entry.factory)().map_err(|e| WorkerError::Unavailable {
            id: id.to_string(),
            reason: format!("instantiation failed: {e:#}"),
        })?;

        Ok(WorkerHandle::new(Arc::clone(&entry.descriptor), worker))
    }

    /// Get a descriptor by id
    pub fn descriptor(&self, id: &str) -> Option<&WorkerDescriptor> {
        self.entries.get(id).map(|e| e.descriptor.as_ref())
    }

    /// All descriptors in registration order
    pub fn descriptors(&self) -> Vec<&WorkerDescriptor> {
        self.order
            .iter()
            .filter_map(|id| self.descriptor(id))
            .collect()
    }

    /// Active descriptors in registration order
    pub fn list_active(&self) -> Vec<&WorkerDescriptor> {
        self.descriptors()
            .into_iter()
            .filter(|d| d.is_active())
            .collect()
    }

    pub fn active_ids(&self) -> Vec<&str> {
        self.list_active().into_iter().map(|d| d.id.as_str()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticWorker;

    #[test]
    fn test_registry_creation() {
        let registry = WorkerRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.list_active().is_empty());
    }

    #[test]
    fn test_list_active_preserves_order_and_skips_inactive() {
        let mut registry = WorkerRegistry::new();
        registry
            .register_instance(
                WorkerDescriptor::new("researcher", "Researcher", "Research"),
                Arc::new(StaticWorker::new("r")),
            )
            .register_instance(
                WorkerDescriptor::new("music-coach", "Music Coach", "Music").inactive(),
                Arc::new(StaticWorker::new("m")),
            )
            .register_instance(
                WorkerDescriptor::new("communications", "Communications", "Writing"),
                Arc::new(StaticWorker::new("c")),
            );

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.active_ids(), vec!["researcher", "communications"]);
    }

    #[test]
    fn test_unknown_id_is_unavailable() {
        let registry = WorkerRegistry::new();
        let err = registry.worker("ghost").unwrap_err();
        assert!(matches!(err, WorkerError::Unavailable { ref id, .. } if id == "ghost"));
    }

    #[test]
    fn test_inactive_and_factory_failure_are_unavailable() {
        let mut registry = WorkerRegistry::new();
        registry.register_instance(
            WorkerDescriptor::new("sleepy", "Sleepy", "Nothing").inactive(),
            Arc::new(StaticWorker::new("zzz")),
        );
        registry.register(WorkerDescriptor::new("broken", "Broken", "Nothing"), || {
            Err(anyhow::anyhow!("missing api key"))
        });

        let err = registry.worker("sleepy").unwrap_err();
        assert!(err.to_string().contains("inactive"));

        let err = registry.worker("broken").unwrap_err();
        assert!(err.to_string().contains("missing api key"));
    }

    #[test]
    fn test_reregister_replaces_entry() {
        let mut registry = WorkerRegistry::new();
        registry.register_instance(
            WorkerDescriptor::new("researcher", "Researcher", "old"),
            Arc::new(StaticWorker::new("r")),
        );
        registry.register_instance(
            WorkerDescriptor::new("researcher", "Researcher", "new"),
            Arc::new(StaticWorker::new("r")),
        );

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.descriptors().len(), 1);
        assert_eq!(
            registry.descriptor("researcher").unwrap().capability_summary,
            "new"
        );
    }
}
