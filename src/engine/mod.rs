//! Media pipeline engines.
//!
//! The lifecycle manager never touches media itself. It hands an ordered
//! stage list to a [`PipelineEngine`], receives an opaque [`PipelineHandle`]
//! and drives that handle between `Playing` and `Stopped`. The engine reports
//! end-of-stream and internal errors back through a [`FaultHandler`].
//!
//! Engines:
//! - `stub`: records assembled pipelines and state changes (tests, dry runs)
//! - `gstreamer`: real pipelines (feature: engine-gstreamer)

use anyhow::Result;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::topology::Stage;

#[cfg(feature = "engine-gstreamer")]
pub mod gstreamer;
pub mod stub;

#[cfg(feature = "engine-gstreamer")]
pub use self::gstreamer::GstreamerEngine;
pub use stub::{StubEngine, StubPipeline};

/// Target state for a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Playing,
    Stopped,
}

/// Asynchronous notification from a running pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineFault {
    /// The stream ended naturally.
    End,
    /// The engine reported an internal error.
    Error(String),
}

impl fmt::Display for PipelineFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineFault::End => f.write_str("end of stream"),
            PipelineFault::Error(message) => write!(f, "error: {}", message),
        }
    }
}

/// Callback invoked by the engine, from an engine-owned thread, on every fault.
pub type FaultHandler = Arc<dyn Fn(PipelineFault) + Send + Sync>;

/// A required stage could not be instantiated or linked.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("element '{factory}' unavailable: {reason}")]
    ElementUnavailable {
        factory: &'static str,
        reason: String,
    },

    #[error("failed to link '{from}' -> '{to}'")]
    Link {
        from: &'static str,
        to: &'static str,
    },

    #[error("stage input does not fit topology {topology}")]
    InputMismatch { topology: &'static str },

    #[error("pipeline has no stages")]
    Empty,

    #[error("pipeline engine error: {0}")]
    Engine(String),
}

/// Exclusive handle on one assembled pipeline.
pub trait PipelineHandle: Send {
    /// Move the pipeline to `state`, blocking until the engine confirms it.
    fn set_state(&mut self, state: PipelineState) -> Result<()>;
}

/// Builds pipelines from stage lists.
pub trait PipelineEngine: Send + Sync {
    /// Engine identifier.
    fn name(&self) -> &'static str;

    /// Instantiate and link `stages` in order.
    ///
    /// The returned pipeline is not running. `on_fault` stays registered for
    /// the lifetime of the handle.
    fn assemble(
        &self,
        label: &str,
        stages: &[Stage],
        on_fault: FaultHandler,
    ) -> Result<Box<dyn PipelineHandle>, AssemblyError>;
}
