//! Camera lifecycle manager.
//!
//! Single entry point for registry mutation. Discovery, the hot-plug watcher
//! and the static ingest launcher all funnel into [`CameraManager`]:
//!
//! - `resolve`: device descriptor + configuration -> settings or skip
//! - `apply_add` / `apply_ingest`: select topology, assemble, start, insert
//! - `apply_remove`: destroy and erase
//!
//! Per-camera failures never escape this boundary; they are logged and
//! reported as outcome values.

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use crate::camera::{Camera, CameraSpec, SourceId};
use crate::config::{CameraConfig, IngestConfig, RelayConfig};
use crate::engine::{AssemblyError, PipelineEngine};
use crate::hotplug::{DeviceDescriptor, HotplugAction, HotplugEvent};
use crate::registry::{CameraRegistry, Insertion};
use crate::topology::{
    plan, Geometry, PipelineParams, Protocol, SinkContext, StreamInput, StreamMode, Topology,
};

/// Settings a device-bound camera runs with after resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraSettings {
    pub name: String,
    pub protocol: Protocol,
    pub geometry: Geometry,
    pub mode: StreamMode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The device has a configuration entry.
    Configured(CameraSettings),
    /// The device is unknown; defaults apply. `suggested_config` is the
    /// block logged for the operator, when it could be rendered.
    Defaulted {
        settings: CameraSettings,
        suggested_config: Option<String>,
    },
    /// The configuration entry is disabled; no camera is created.
    Disabled,
}

#[derive(Debug)]
pub enum AddOutcome {
    Added(Arc<Camera>),
    Disabled,
    AlreadyPresent,
    /// The manager has shut down; nothing was built.
    Closed,
    Failed(AssemblyError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// No camera was registered under the identity. Logged and ignored.
    Unmatched,
}

pub struct CameraManager {
    config: RelayConfig,
    sinks: SinkContext,
    engine: Arc<dyn PipelineEngine>,
    registry: CameraRegistry,
}

impl CameraManager {
    pub fn new(config: RelayConfig, engine: Arc<dyn PipelineEngine>) -> Self {
        let sinks = SinkContext {
            signaller: config.signaller.clone(),
            turn_servers: config.turn.servers.clone(),
        };
        Self {
            config,
            sinks,
            engine,
            registry: CameraRegistry::new(),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &CameraRegistry {
        &self.registry
    }

    /// Look the device up in configuration.
    pub fn resolve(&self, device: &DeviceDescriptor) -> Resolution {
        let id = &device.id_path;
        match self.config.cameras.get(id) {
            Some(entry) if entry.disabled => {
                log::info!(
                    "camera with id={} path={} is disabled, skipping",
                    id,
                    device.devnode
                );
                Resolution::Disabled
            }
            Some(entry) => {
                let settings = settings_from(entry, device);
                log::info!(
                    "adding camera {} with id={} path={}",
                    settings.name,
                    id,
                    device.devnode
                );
                Resolution::Configured(settings)
            }
            None => {
                let settings = settings_from(&CameraConfig::default(), device);
                log::info!(
                    "adding unknown camera with id={} path={}",
                    id,
                    device.devnode
                );
                let suggested = match suggested_config(id, &settings) {
                    Ok(block) => {
                        log::info!("used config:\n{}", block);
                        Some(block)
                    }
                    Err(err) => {
                        log::warn!("could not render suggested config: {:#}", err);
                        None
                    }
                };
                Resolution::Defaulted {
                    settings,
                    suggested_config: suggested,
                }
            }
        }
    }

    /// Resolve then apply.
    pub fn add_device(&self, device: &DeviceDescriptor) -> AddOutcome {
        match self.resolve(device) {
            Resolution::Disabled => AddOutcome::Disabled,
            Resolution::Configured(settings) | Resolution::Defaulted { settings, .. } => {
                self.apply_add(device, &settings)
            }
        }
    }

    /// Build, start and register a camera for a device.
    pub fn apply_add(&self, device: &DeviceDescriptor, settings: &CameraSettings) -> AddOutcome {
        let id = SourceId::Device(device.id_path.clone());
        let topology = Topology::for_camera(&settings.mode, settings.protocol);
        let params = PipelineParams {
            display_name: settings.name.clone(),
            input: StreamInput::Device(device.devnode.clone()),
            geometry: settings.geometry,
        };
        self.insert(id, settings.name.clone(), device.devnode.clone(), topology, params)
    }

    /// Build, start and register a UDP ingest source.
    pub fn apply_ingest(&self, ingest: &IngestConfig) -> AddOutcome {
        let id = SourceId::Ingest(ingest.port);
        let topology = Topology::for_ingest(&ingest.format);
        let params = PipelineParams {
            display_name: ingest.name.clone(),
            input: StreamInput::Udp(ingest.port),
            geometry: ingest.geometry,
        };
        log::info!("adding ingest {} on udp port {}", ingest.name, ingest.port);
        self.insert(id.clone(), ingest.name.clone(), id.to_string(), topology, params)
    }

    /// Destroy and unregister the camera for `id`.
    pub fn apply_remove(&self, id: &SourceId) -> RemoveOutcome {
        match self.registry.remove(id) {
            Some(camera) => {
                log::info!(
                    "removed camera {} with id={} path={}",
                    camera.name(),
                    id,
                    camera.origin()
                );
                RemoveOutcome::Removed
            }
            None => {
                log::warn!("remove for unregistered camera id={} ignored", id);
                RemoveOutcome::Unmatched
            }
        }
    }

    pub fn remove_device(&self, device: &DeviceDescriptor) -> RemoveOutcome {
        self.apply_remove(&SourceId::Device(device.id_path.clone()))
    }

    /// Route one hot-plug event.
    pub fn handle_event(&self, event: &HotplugEvent) {
        log::debug!("hot-plug {} {}", event.action, event.device.id_path);
        match event.action {
            HotplugAction::Add if self.registry.is_closed() => {
                log::info!(
                    "add for id={} ignored, manager is shut down",
                    event.device.id_path
                );
            }
            HotplugAction::Add => {
                self.add_device(&event.device);
            }
            HotplugAction::Remove => {
                self.remove_device(&event.device);
            }
        }
    }

    /// Destroy every registered camera and refuse later adds. Returns how
    /// many were running.
    pub fn shutdown(&self) -> usize {
        let drained = self.registry.close();
        log::info!("stopped {} camera(s)", drained.len());
        drained.len()
    }

    fn insert(
        &self,
        id: SourceId,
        name: String,
        origin: String,
        topology: Topology,
        params: PipelineParams,
    ) -> AddOutcome {
        // Only assembly runs under the registry lock. Starting may block on
        // the engine, so it happens after the camera is registered.
        let inserted = self.registry.insert_with(&id, || {
            let stages = plan(&topology, &params, &self.sinks)?;
            let camera = Camera::create(
                CameraSpec {
                    id: id.clone(),
                    name,
                    origin,
                    topology: topology.clone(),
                    stages,
                },
                self.engine.as_ref(),
            )?;
            Ok(camera)
        });
        match inserted {
            Ok(Insertion::Inserted(camera)) => {
                // A remove or shutdown that won the race has already
                // destroyed the camera; start is then a no-op.
                camera.start();
                AddOutcome::Added(camera)
            }
            Ok(Insertion::AlreadyPresent(existing)) => {
                log::warn!(
                    "camera id={} already registered (path={}), add ignored",
                    id,
                    existing.origin()
                );
                AddOutcome::AlreadyPresent
            }
            Ok(Insertion::Closed) => {
                log::info!("camera id={} not added, manager is shut down", id);
                AddOutcome::Closed
            }
            Err(err) => {
                log::error!("failed to assemble {} pipeline for {}: {}", topology, id, err);
                AddOutcome::Failed(err)
            }
        }
    }
}

fn settings_from(entry: &CameraConfig, device: &DeviceDescriptor) -> CameraSettings {
    CameraSettings {
        name: entry.name.clone().unwrap_or_else(|| default_name(device)),
        protocol: entry.protocol,
        geometry: entry.geometry,
        mode: entry.mode.clone(),
    }
}

/// Display name for a device without a configured name.
///
/// Uses the udev path tag; when absent, derives the same shape from the
/// identity by replacing everything except alphanumerics and `-` with `_`.
pub fn default_name(device: &DeviceDescriptor) -> String {
    if let Some(tag) = device.id_path_tag.as_deref().filter(|tag| !tag.is_empty()) {
        return tag.to_string();
    }
    static PATH_TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = PATH_TAG_RE
        .get_or_init(|| Regex::new(r"[^A-Za-z0-9-]").expect("static pattern is valid"));
    re.replace_all(&device.id_path, "_").into_owned()
}

#[derive(Serialize)]
struct SuggestedCamera<'a> {
    name: &'a str,
    protocol: Protocol,
    width: u32,
    height: u32,
    framerate: u32,
    mode: &'static str,
}

/// Configuration block, in config-file shape, that reproduces `settings`.
pub fn suggested_config(id: &str, settings: &CameraSettings) -> Result<String> {
    let camera = SuggestedCamera {
        name: &settings.name,
        protocol: settings.protocol,
        width: settings.geometry.width,
        height: settings.geometry.height,
        framerate: settings.geometry.framerate,
        mode: settings.mode.name(),
    };
    let mut cameras = BTreeMap::new();
    cameras.insert(id, camera);
    let mut root = BTreeMap::new();
    root.insert("cameras", cameras);
    Ok(toml::to_string(&root)?)
}
