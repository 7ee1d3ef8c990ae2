//! Statically configured UDP ingest sources.
//!
//! Each `[ingest."<port>"]` entry becomes one relay keyed by its listening
//! port. Ingest sources never come from hot-plug, so they are started once at
//! startup and live until shutdown. They are still inserted through the
//! shared registry.

use std::sync::Arc;

use crate::manager::{AddOutcome, CameraManager};

pub struct StaticIngestLauncher {
    manager: Arc<CameraManager>,
}

impl StaticIngestLauncher {
    pub fn new(manager: Arc<CameraManager>) -> Self {
        Self { manager }
    }

    /// Start every configured ingest source, in port order.
    ///
    /// Returns how many were started. Failures are logged by the manager.
    pub fn run(&self) -> usize {
        let mut started = 0;
        for ingest in self.manager.config().ingest.values() {
            if let AddOutcome::Added(_) = self.manager.apply_ingest(ingest) {
                started += 1;
            }
        }
        if started > 0 {
            log::info!("started {} ingest source(s)", started);
        }
        started
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraState, SourceId};
    use crate::config::RelayConfig;
    use crate::engine::StubEngine;
    use crate::hotplug::DeviceDescriptor;
    use crate::topology::Topology;

    const CONFIG: &str = r#"
        [ingest."5123"]
        name = "thermal"
        width = 160
        height = 120
        framerate = 9

        [ingest."5124"]
        name = "depth"
        format = "GRAY8"
    "#;

    #[test]
    fn starts_one_source_per_port() -> anyhow::Result<()> {
        let engine = Arc::new(StubEngine::new());
        let manager = Arc::new(CameraManager::new(
            RelayConfig::from_toml_str(CONFIG)?,
            engine.clone(),
        ));
        assert_eq!(StaticIngestLauncher::new(manager.clone()).run(), 2);

        let thermal = manager
            .registry()
            .lookup(&SourceId::Ingest(5123))
            .expect("registered");
        assert_eq!(thermal.state(), CameraState::Playing);
        assert_eq!(
            thermal.topology(),
            &Topology::UdpIngestRelay {
                format: "GRAY16_LE".to_string()
            }
        );
        assert!(engine.pipeline("udp:5124").is_some());
        Ok(())
    }

    #[test]
    fn ingest_and_devices_do_not_collide() -> anyhow::Result<()> {
        let manager = Arc::new(CameraManager::new(
            RelayConfig::from_toml_str(CONFIG)?,
            Arc::new(StubEngine::new()),
        ));
        manager.add_device(&DeviceDescriptor::capture("5123", "/dev/video0"));
        StaticIngestLauncher::new(manager.clone()).run();
        assert_eq!(manager.registry().len(), 3);
        Ok(())
    }

    #[test]
    fn second_run_adds_nothing() -> anyhow::Result<()> {
        let manager = Arc::new(CameraManager::new(
            RelayConfig::from_toml_str(CONFIG)?,
            Arc::new(StubEngine::new()),
        ));
        let launcher = StaticIngestLauncher::new(manager.clone());
        launcher.run();
        assert_eq!(launcher.run(), 0);
        assert_eq!(manager.registry().len(), 2);
        Ok(())
    }
}
