//! Startup ordering and shutdown for the whole relay.
//!
//! ```text
//! subscribe (queue events) -> discovery -> static ingest -> apply events
//! ```
//!
//! Opening the subscription first means a device plugged in or pulled while
//! discovery is enumerating is still seen, and its event is applied after
//! discovery's own add for that identity.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::discovery::{Discovery, DiscoveryReport};
use crate::engine::PipelineEngine;
use crate::hotplug::DeviceMonitor;
use crate::ingest::StaticIngestLauncher;
use crate::manager::CameraManager;
use crate::watcher::{HotplugWatcher, WatcherHandle};

pub struct Supervisor {
    manager: Arc<CameraManager>,
    monitor: Arc<dyn DeviceMonitor>,
}

pub struct RunningSupervisor {
    manager: Arc<CameraManager>,
    watcher: WatcherHandle,
    discovery: DiscoveryReport,
    ingest_started: usize,
}

impl Supervisor {
    pub fn new(
        config: RelayConfig,
        engine: Arc<dyn PipelineEngine>,
        monitor: Arc<dyn DeviceMonitor>,
    ) -> Self {
        log::info!(
            "camera relay: engine={} signaller={} cameras configured={} ingest configured={}",
            engine.name(),
            config.signaller.uri(),
            config.cameras.len(),
            config.ingest.len()
        );
        Self {
            manager: Arc::new(CameraManager::new(config, engine)),
            monitor,
        }
    }

    pub fn manager(&self) -> &Arc<CameraManager> {
        &self.manager
    }

    pub fn start(self) -> Result<RunningSupervisor> {
        let pending = HotplugWatcher::new(self.manager.clone(), self.monitor.clone())
            .subscribe()
            .context("start hot-plug watcher")?;
        let discovery = Discovery::new(self.manager.clone(), self.monitor.clone())
            .run()
            .context("startup discovery")?;
        let ingest_started = StaticIngestLauncher::new(self.manager.clone()).run();
        let watcher = pending.process()?;
        Ok(RunningSupervisor {
            manager: self.manager,
            watcher,
            discovery,
            ingest_started,
        })
    }
}

impl RunningSupervisor {
    pub fn manager(&self) -> &Arc<CameraManager> {
        &self.manager
    }

    pub fn discovery(&self) -> DiscoveryReport {
        self.discovery
    }

    pub fn ingest_started(&self) -> usize {
        self.ingest_started
    }

    /// True once the hot-plug subscription has ended.
    pub fn watcher_finished(&self) -> bool {
        self.watcher.is_finished()
    }

    /// Wait for the hot-plug subscription to end, then destroy every camera.
    pub fn join(self) -> Result<()> {
        let outcome = self.watcher.join();
        self.manager.shutdown();
        outcome
    }

    /// Destroy every camera without waiting for the subscription.
    ///
    /// The watcher thread is left running, but the registry is closed: a
    /// later add event is logged and dropped, never started.
    pub fn shutdown(self) -> usize {
        self.manager.shutdown()
    }
}
