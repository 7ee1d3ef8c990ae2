//! Recording engine.
//!
//! Assembles nothing; remembers every pipeline it was asked to build, every
//! state change, and lets callers inject faults as if the media engine had
//! reported them. Used by tests and by `camerad --engine stub` dry runs.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    AssemblyError, FaultHandler, PipelineEngine, PipelineFault, PipelineHandle, PipelineState,
};
use crate::topology::Stage;

#[derive(Default)]
pub struct StubEngine {
    pipelines: Mutex<Vec<Arc<StubPipeline>>>,
    unavailable: HashSet<&'static str>,
}

impl StubEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine on which the listed element factories fail to instantiate.
    pub fn with_unavailable(factories: &[&'static str]) -> Self {
        Self {
            pipelines: Mutex::new(Vec::new()),
            unavailable: factories.iter().copied().collect(),
        }
    }

    /// Every pipeline assembled so far, oldest first.
    pub fn pipelines(&self) -> Vec<Arc<StubPipeline>> {
        lock(&self.pipelines).clone()
    }

    /// Most recent pipeline assembled under `label`.
    pub fn pipeline(&self, label: &str) -> Option<Arc<StubPipeline>> {
        lock(&self.pipelines)
            .iter()
            .rev()
            .find(|pipeline| pipeline.label == label)
            .cloned()
    }
}

impl PipelineEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn assemble(
        &self,
        label: &str,
        stages: &[Stage],
        on_fault: FaultHandler,
    ) -> Result<Box<dyn PipelineHandle>, AssemblyError> {
        if stages.is_empty() {
            return Err(AssemblyError::Empty);
        }
        if let Some(stage) = stages
            .iter()
            .find(|stage| self.unavailable.contains(stage.factory()))
        {
            return Err(AssemblyError::ElementUnavailable {
                factory: stage.factory(),
                reason: "not provided by stub engine".to_string(),
            });
        }

        let pipeline = Arc::new(StubPipeline {
            label: label.to_string(),
            stages: stages.to_vec(),
            transitions: Mutex::new(Vec::new()),
            on_fault,
        });
        lock(&self.pipelines).push(pipeline.clone());
        log::debug!("stub engine: assembled {} ({} stages)", label, stages.len());
        Ok(Box::new(StubHandle { pipeline }))
    }
}

/// Observable record of one assembled pipeline.
pub struct StubPipeline {
    label: String,
    stages: Vec<Stage>,
    transitions: Mutex<Vec<PipelineState>>,
    on_fault: FaultHandler,
}

impl StubPipeline {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// State changes in the order they were requested.
    pub fn transitions(&self) -> Vec<PipelineState> {
        lock(&self.transitions).clone()
    }

    /// Last requested state, `None` before the first transition.
    pub fn current_state(&self) -> Option<PipelineState> {
        lock(&self.transitions).last().copied()
    }

    pub fn starts(&self) -> usize {
        self.count(PipelineState::Playing)
    }

    pub fn stops(&self) -> usize {
        self.count(PipelineState::Stopped)
    }

    /// Deliver a fault exactly as an engine thread would.
    ///
    /// Runs the handler on the calling thread with no engine lock held.
    pub fn inject_fault(&self, fault: PipelineFault) {
        (self.on_fault)(fault);
    }

    fn count(&self, state: PipelineState) -> usize {
        lock(&self.transitions)
            .iter()
            .filter(|recorded| **recorded == state)
            .count()
    }
}

struct StubHandle {
    pipeline: Arc<StubPipeline>,
}

impl PipelineHandle for StubHandle {
    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        lock(&self.pipeline.transitions).push(state);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
