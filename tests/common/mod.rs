//! Shared fixtures: a context wired with a manual clock, buffered event
//! sink, and scripted planner/provider stand-ins.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use taskboard::{
    BatchItem, BatchProvider, BoardConfig, BoardError, BufferedEventSink, CapabilityProfile,
    Clock, CoordinationContext, EventSink, ManualClock, PlanConstraints, Planner, Result,
    SubtaskDescriptor,
};
use taskboard::batch::ProviderBatchStatus;

pub struct ScriptedProvider {
    pub fail_submit: AtomicBool,
    pub statuses: Mutex<HashMap<String, ProviderBatchStatus>>,
    counter: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            fail_submit: AtomicBool::new(false),
            statuses: Mutex::new(HashMap::new()),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn set_status(&self, batch_id: &str, status: ProviderBatchStatus) {
        self.statuses.lock().insert(batch_id.to_string(), status);
    }
}

impl BatchProvider for ScriptedProvider {
    fn submit(&self, _items: &[BatchItem], _timeout: Duration) -> Result<String> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(BoardError::BatchProvider {
                operation: "submit".to_string(),
                message: "provider unavailable".to_string(),
            });
        }
        let id = format!("batch-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.statuses
            .lock()
            .insert(id.clone(), ProviderBatchStatus::Pending);
        Ok(id)
    }

    fn status(&self, batch_id: &str, _timeout: Duration) -> Result<ProviderBatchStatus> {
        self.statuses
            .lock()
            .get(batch_id)
            .copied()
            .ok_or_else(|| BoardError::BatchNotFound(batch_id.to_string()))
    }
}

pub enum ScriptedPlan {
    Plan(Vec<SubtaskDescriptor>),
    Fail(String),
}

pub struct ScriptedPlanner {
    pub script: Mutex<ScriptedPlan>,
}

impl ScriptedPlanner {
    pub fn returning(plan: Vec<SubtaskDescriptor>) -> Self {
        Self {
            script: Mutex::new(ScriptedPlan::Plan(plan)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            script: Mutex::new(ScriptedPlan::Fail(message.to_string())),
        }
    }
}

impl Planner for ScriptedPlanner {
    fn decompose(
        &self,
        goal: &str,
        _constraints: &PlanConstraints,
        _timeout: Duration,
    ) -> Result<Vec<SubtaskDescriptor>> {
        match &*self.script.lock() {
            ScriptedPlan::Plan(plan) => Ok(plan.clone()),
            ScriptedPlan::Fail(message) => Err(BoardError::Planner {
                goal: goal.to_string(),
                message: message.clone(),
            }),
        }
    }
}

pub struct Harness {
    pub ctx: CoordinationContext,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<BufferedEventSink>,
    pub provider: Arc<ScriptedProvider>,
}

pub fn base_config() -> BoardConfig {
    let mut config = BoardConfig::default();
    config.capabilities.insert(
        "refactor-bot".to_string(),
        CapabilityProfile::new(
            vec!["python".to_string(), "refactoring".to_string()],
            Vec::new(),
        ),
    );
    config.capabilities.insert(
        "proto-bot".to_string(),
        CapabilityProfile::new(vec!["grpc".to_string(), "testing".to_string()], Vec::new()),
    );
    config
}

pub fn harness() -> Harness {
    harness_with(base_config(), None)
}

pub fn harness_with(config: BoardConfig, planner: Option<Arc<ScriptedPlanner>>) -> Harness {
    let clock = Arc::new(ManualClock::starting_now());
    let sink = Arc::new(BufferedEventSink::new());
    let provider = Arc::new(ScriptedProvider::new());

    let mut builder = CoordinationContext::builder(config)
        .clock(Arc::clone(&clock) as Arc<dyn Clock>)
        .event_sink(Arc::clone(&sink) as Arc<dyn EventSink>)
        .batch_provider(Arc::clone(&provider) as Arc<dyn BatchProvider>);
    if let Some(planner) = planner {
        builder = builder.planner(planner);
    }

    Harness {
        ctx: builder.build().expect("harness context"),
        clock,
        sink,
        provider,
    }
}
