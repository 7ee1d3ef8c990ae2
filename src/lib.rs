//! Camera relay lifecycle manager.
//!
//! Watches for capture devices appearing and disappearing, builds one media
//! pipeline per device (or per statically configured UDP ingest port) that
//! republishes the stream to a WebRTC signalling server or a UDP target, and
//! restarts any pipeline that ends or faults.
//!
//! # Architecture
//!
//! - `topology`: the fixed catalog of pipeline shapes and stage planning
//! - `engine`: the media engine seam (`PipelineEngine`), a recording stub and
//!   the GStreamer backend (feature `engine-gstreamer`)
//! - `camera`: one source and its `Constructing -> Playing <-> Stopped -> Destroyed`
//!   state machine, with fault-driven restart
//! - `registry`: the mutex-guarded identity -> camera map
//! - `manager`: resolution against configuration, add/remove/ingest
//! - `hotplug`: device descriptors, the capture filter, and monitors
//!   (in-process channel, udev with feature `hotplug-udev`)
//! - `discovery`, `watcher`, `ingest`, `supervisor`: startup and event flow
//! - `config`, `signaller`, `turn`: settings and sink endpoints
//!
//! Per-camera failures are logged and contained; only configuration and
//! monitor failures reach the caller.

pub mod camera;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod hotplug;
pub mod ingest;
pub mod manager;
pub mod registry;
pub mod signaller;
pub mod supervisor;
pub mod topology;
pub mod turn;
pub mod watcher;

pub use camera::{Camera, CameraState, CameraStats, SourceId};
pub use config::{CameraConfig, IngestConfig, RelayConfig};
pub use engine::{AssemblyError, PipelineEngine, PipelineFault, PipelineState, StubEngine};
#[cfg(feature = "engine-gstreamer")]
pub use engine::GstreamerEngine;
pub use hotplug::{ChannelMonitor, DeviceDescriptor, DeviceMonitor, HotplugAction, HotplugEvent};
#[cfg(all(feature = "hotplug-udev", target_os = "linux"))]
pub use hotplug::UdevMonitor;
pub use manager::{AddOutcome, CameraManager, RemoveOutcome};
pub use registry::CameraRegistry;
pub use signaller::{wait_for_signaller, SignallerEndpoint};
pub use supervisor::{RunningSupervisor, Supervisor};
pub use topology::{Protocol, StreamMode, Topology};
pub use turn::TurnServer;
