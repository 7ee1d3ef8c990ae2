//! Per-source runtime unit.
//!
//! A [`Camera`] owns exactly one assembled pipeline and drives it through
//!
//! ```text
//! Constructing -> Playing <-> Stopped -> Destroyed
//! ```
//!
//! Pipeline faults (end-of-stream or error) received while `Playing` trigger a
//! full stop-then-start restart, retried forever without backoff.
//!
//! All transitions, including fault-triggered restarts arriving on engine
//! threads, run under one per-camera lock. `destroy` therefore can never
//! interleave with a restart of the same camera.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::engine::{
    AssemblyError, FaultHandler, PipelineEngine, PipelineFault, PipelineHandle, PipelineState,
};
use crate::topology::{Stage, Topology};

/// Stable identity of a registered source.
///
/// Device identities and ingest ports live in disjoint variants, so the two
/// startup paths can never collide.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    /// Path-derived device identity (udev `ID_PATH`).
    Device(String),
    /// UDP ingest source keyed by its listening port.
    Ingest(u16),
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Device(id) => f.write_str(id),
            SourceId::Ingest(port) => write!(f, "udp:{}", port),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraState {
    Constructing,
    Playing,
    Stopped,
    Destroyed,
}

/// Counters for one camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CameraStats {
    pub faults: u64,
    pub restarts: u64,
}

/// Everything needed to build a camera.
#[derive(Clone, Debug)]
pub struct CameraSpec {
    pub id: SourceId,
    pub name: String,
    /// Device node or `udp:<port>`, for log lines.
    pub origin: String,
    pub topology: Topology,
    pub stages: Vec<Stage>,
}

pub struct Camera {
    id: SourceId,
    name: String,
    origin: String,
    topology: Topology,
    inner: Mutex<CameraInner>,
}

struct CameraInner {
    pipeline: Option<Box<dyn PipelineHandle>>,
    state: CameraState,
    stats: CameraStats,
}

impl Camera {
    /// Assemble the camera's pipeline.
    ///
    /// The camera is returned in `Constructing`; nothing is running yet.
    pub fn create(
        spec: CameraSpec,
        engine: &dyn PipelineEngine,
    ) -> Result<Arc<Self>, AssemblyError> {
        let camera = Arc::new(Self {
            id: spec.id,
            name: spec.name,
            origin: spec.origin,
            topology: spec.topology,
            inner: Mutex::new(CameraInner {
                pipeline: None,
                state: CameraState::Constructing,
                stats: CameraStats::default(),
            }),
        });

        let weak: Weak<Camera> = Arc::downgrade(&camera);
        let on_fault: FaultHandler = Arc::new(move |fault| {
            if let Some(camera) = weak.upgrade() {
                camera.on_fault(fault);
            }
        });
        let label = camera.id.to_string();
        let pipeline = engine.assemble(&label, &spec.stages, on_fault)?;
        camera.lock().pipeline = Some(pipeline);
        camera.log(&format!("camera created ({})", camera.topology));
        Ok(camera)
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn state(&self) -> CameraState {
        self.lock().state
    }

    pub fn stats(&self) -> CameraStats {
        self.lock().stats
    }

    /// Set the pipeline playing; blocks until the engine confirms.
    pub fn start(&self) {
        let mut inner = self.lock();
        self.start_locked(&mut inner);
    }

    /// Halt the pipeline; a no-op when already stopped.
    pub fn stop(&self) {
        let mut inner = self.lock();
        self.stop_locked(&mut inner);
    }

    /// Full stop-then-start cycle.
    pub fn restart(&self) {
        let mut inner = self.lock();
        self.restart_locked(&mut inner);
    }

    /// Stop the pipeline and release it. Terminal.
    pub fn destroy(&self) {
        let mut inner = self.lock();
        if inner.state == CameraState::Destroyed {
            return;
        }
        self.stop_locked(&mut inner);
        inner.pipeline = None;
        inner.state = CameraState::Destroyed;
        self.log("camera destroyed");
    }

    fn on_fault(&self, fault: PipelineFault) {
        let mut inner = self.lock();
        inner.stats.faults += 1;
        if inner.state != CameraState::Playing {
            log::debug!(
                "[{}]: {} ignored in state {:?}",
                self.origin,
                fault,
                inner.state
            );
            return;
        }
        match &fault {
            PipelineFault::End => self.log("stream ended"),
            PipelineFault::Error(message) => self.log(&format!("stream error: {}", message)),
        }
        self.restart_locked(&mut inner);
    }

    fn restart_locked(&self, inner: &mut CameraInner) {
        self.log("stream restarted");
        self.stop_locked(inner);
        self.start_locked(inner);
        inner.stats.restarts += 1;
    }

    fn start_locked(&self, inner: &mut CameraInner) {
        if inner.state == CameraState::Destroyed {
            log::debug!("[{}]: start ignored, camera destroyed", self.origin);
            return;
        }
        let Some(pipeline) = inner.pipeline.as_mut() else {
            log::error!("[{}]: start requested without a pipeline", self.origin);
            return;
        };
        if inner.state == CameraState::Playing {
            return;
        }
        // The camera stays Playing even if the engine refuses: the engine's
        // error message will arrive as a fault and drive another restart.
        inner.state = CameraState::Playing;
        match pipeline.set_state(PipelineState::Playing) {
            Ok(()) => self.log("stream started"),
            Err(err) => log::error!("[{}]: failed to start stream: {:#}", self.origin, err),
        }
    }

    fn stop_locked(&self, inner: &mut CameraInner) {
        let Some(pipeline) = inner.pipeline.as_mut() else {
            log::error!("[{}]: stop requested without a pipeline", self.origin);
            return;
        };
        if inner.state == CameraState::Stopped {
            return;
        }
        inner.state = CameraState::Stopped;
        match pipeline.set_state(PipelineState::Stopped) {
            Ok(()) => self.log("stream stopped"),
            Err(err) => log::error!("[{}]: failed to stop stream: {:#}", self.origin, err),
        }
    }

    fn log(&self, message: &str) {
        log::info!("[{}]: {}", self.origin, message);
    }

    fn lock(&self) -> MutexGuard<'_, CameraInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Camera {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Camera")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StubEngine;

    fn spec(label: &str) -> CameraSpec {
        CameraSpec {
            id: SourceId::Device(label.to_string()),
            name: "front".to_string(),
            origin: "/dev/video0".to_string(),
            topology: Topology::MjpegRelay,
            stages: vec![Stage::Convert, Stage::Queue],
        }
    }

    #[test]
    fn created_camera_is_not_running() -> anyhow::Result<()> {
        let engine = StubEngine::new();
        let camera = Camera::create(spec("cam"), &engine)?;
        assert_eq!(camera.state(), CameraState::Constructing);
        let pipeline = engine.pipeline("cam").expect("assembled");
        assert!(pipeline.transitions().is_empty());
        Ok(())
    }

    #[test]
    fn start_and_stop_drive_the_pipeline() -> anyhow::Result<()> {
        let engine = StubEngine::new();
        let camera = Camera::create(spec("cam"), &engine)?;
        camera.start();
        assert_eq!(camera.state(), CameraState::Playing);
        camera.stop();
        camera.stop();
        assert_eq!(camera.state(), CameraState::Stopped);

        let pipeline = engine.pipeline("cam").expect("assembled");
        assert_eq!(
            pipeline.transitions(),
            vec![PipelineState::Playing, PipelineState::Stopped]
        );
        Ok(())
    }

    #[test]
    fn fault_while_playing_restarts_once() -> anyhow::Result<()> {
        for fault in [PipelineFault::End, PipelineFault::Error("boom".to_string())] {
            let engine = StubEngine::new();
            let camera = Camera::create(spec("cam"), &engine)?;
            camera.start();
            let pipeline = engine.pipeline("cam").expect("assembled");

            pipeline.inject_fault(fault);

            assert_eq!(pipeline.starts(), 2);
            assert_eq!(pipeline.stops(), 1);
            assert_eq!(
                pipeline.transitions(),
                vec![
                    PipelineState::Playing,
                    PipelineState::Stopped,
                    PipelineState::Playing
                ]
            );
            assert_eq!(camera.state(), CameraState::Playing);
            assert_eq!(
                camera.stats(),
                CameraStats {
                    faults: 1,
                    restarts: 1
                }
            );
        }
        Ok(())
    }

    #[test]
    fn faults_outside_playing_are_ignored() -> anyhow::Result<()> {
        let engine = StubEngine::new();
        let camera = Camera::create(spec("cam"), &engine)?;
        camera.start();
        camera.stop();
        let pipeline = engine.pipeline("cam").expect("assembled");
        pipeline.inject_fault(PipelineFault::End);
        assert_eq!(camera.state(), CameraState::Stopped);
        assert_eq!(pipeline.transitions().len(), 2);
        Ok(())
    }

    #[test]
    fn destroy_stops_once_and_releases_pipeline() -> anyhow::Result<()> {
        let engine = StubEngine::new();
        let camera = Camera::create(spec("cam"), &engine)?;
        camera.start();
        camera.destroy();
        camera.destroy();
        assert_eq!(camera.state(), CameraState::Destroyed);

        let pipeline = engine.pipeline("cam").expect("assembled");
        assert_eq!(pipeline.stops(), 1);

        // Start after destroy is a no-op and late faults are dropped.
        camera.start();
        pipeline.inject_fault(PipelineFault::Error("late".to_string()));
        assert_eq!(camera.state(), CameraState::Destroyed);
        assert_eq!(pipeline.starts(), 1);
        Ok(())
    }

    #[test]
    fn restart_cycles_stop_then_start() -> anyhow::Result<()> {
        let engine = StubEngine::new();
        let camera = Camera::create(spec("cam"), &engine)?;
        camera.start();
        camera.restart();
        let pipeline = engine.pipeline("cam").expect("assembled");
        assert_eq!(pipeline.stops(), 1);
        assert_eq!(pipeline.starts(), 2);
        assert_eq!(camera.stats().restarts, 1);
        Ok(())
    }

    #[test]
    fn assembly_failure_yields_no_camera() {
        let engine = StubEngine::with_unavailable(&["queue"]);
        let result = Camera::create(spec("cam"), &engine);
        assert!(matches!(
            result,
            Err(AssemblyError::ElementUnavailable { factory: "queue", .. })
        ));
    }

    #[test]
    fn source_ids_render_for_logs() {
        assert_eq!(
            SourceId::Device("pci-0000:00:14.0-usb-0:1".to_string()).to_string(),
            "pci-0000:00:14.0-usb-0:1"
        );
        assert_eq!(SourceId::Ingest(5123).to_string(), "udp:5123");
    }
}
