use std::sync::Arc;

use super::{ExitRegistry, ManagerConfig, ProcessManager};
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`ProcessManager`].
pub struct ManagerBuilder {
    cfg: ManagerConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    registry: Option<Arc<ExitRegistry>>,
}

impl ManagerBuilder {
    pub fn new(cfg: ManagerConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            registry: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive lifecycle events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Uses `registry` instead of [`ExitRegistry::global`].
    pub fn with_registry(mut self, registry: Arc<ExitRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Builds the manager: bus, subscriber workers and listener.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Arc<ProcessManager> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let registry = self.registry.unwrap_or_else(ExitRegistry::global);

        Arc::new(ProcessManager::new_internal(self.cfg, bus, registry, subs))
    }
}
