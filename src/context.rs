//! Explicit dependency-injected wiring for the three managers. Constructed
//! once at process start and passed by reference; there is no ambient
//! global state.

use std::sync::Arc;

use crate::batch::{BatchManager, BatchProvider};
use crate::clock::{Clock, SystemClock};
use crate::collab::{CapabilityRegistry, CollaborationManager};
use crate::config::BoardConfig;
use crate::events::{EventSink, NoopEventSink};
use crate::planning::{PassthroughPlanner, Planner};
use crate::store::{BoardStore, MemoryStore};
use crate::tasks::TaskManager;

pub struct CoordinationContext {
    pub collab: Arc<CollaborationManager>,
    pub tasks: Arc<TaskManager>,
    pub batch: Arc<BatchManager>,
}

impl CoordinationContext {
    pub fn builder(config: BoardConfig) -> ContextBuilder {
        ContextBuilder::new(config)
    }
}

/// Collaborators default to in-crate stand-ins (memory store, no-op sink,
/// passthrough planner, system clock) so tests and single-process setups
/// wire up in one line; production callers supply the real ones.
pub struct ContextBuilder {
    config: BoardConfig,
    store: Option<Arc<dyn BoardStore>>,
    planner: Option<Arc<dyn Planner>>,
    provider: Option<Arc<dyn BatchProvider>>,
    sink: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ContextBuilder {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            config,
            store: None,
            planner: None,
            provider: None,
            sink: None,
            clock: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn BoardStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn batch_provider(mut self, provider: Arc<dyn BatchProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// The batch provider has no meaningful in-crate default, so a
    /// context built without one cannot batch; `build` requires it.
    pub fn build(self) -> crate::error::Result<CoordinationContext> {
        let provider = self.provider.ok_or_else(|| {
            crate::error::BoardError::Config("a batch provider is required".to_string())
        })?;
        self.config.validate()?;

        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let planner = self
            .planner
            .unwrap_or_else(|| Arc::new(PassthroughPlanner));
        let sink: Arc<dyn EventSink> = self.sink.unwrap_or_else(|| Arc::new(NoopEventSink));
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let registry = CapabilityRegistry::from_table(self.config.capabilities.clone());
        let collab = Arc::new(CollaborationManager::new(
            Arc::clone(&store),
            registry,
            Arc::clone(&sink),
            Arc::clone(&clock),
            &self.config.session,
        ));
        let tasks = Arc::new(TaskManager::new(
            Arc::clone(&store),
            Arc::clone(&collab),
            planner,
            Arc::clone(&sink),
            Arc::clone(&clock),
            self.config.planner.clone(),
            self.config.health.clone(),
        ));
        let batch = Arc::new(BatchManager::new(
            store,
            Arc::clone(&tasks),
            provider,
            sink,
            clock,
            self.config.batch.clone(),
        ));

        Ok(CoordinationContext {
            collab,
            tasks,
            batch,
        })
    }
}
