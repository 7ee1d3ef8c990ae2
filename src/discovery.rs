//! One-shot startup enumeration of present capture devices.

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::hotplug::{DeviceMonitor, CAPTURE_FILTER};
use crate::manager::{AddOutcome, CameraManager};

pub struct Discovery {
    manager: Arc<CameraManager>,
    monitor: Arc<dyn DeviceMonitor>,
}

/// Tally of one discovery pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub found: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Discovery {
    pub fn new(manager: Arc<CameraManager>, monitor: Arc<dyn DeviceMonitor>) -> Self {
        Self { manager, monitor }
    }

    /// Enumerate present devices and add a camera for each.
    ///
    /// Only a failed enumeration is an error; per-device failures are
    /// counted and logged by the manager.
    pub fn run(&self) -> Result<DiscoveryReport> {
        let devices = self
            .monitor
            .enumerate(&CAPTURE_FILTER)
            .context("enumerate capture devices")?;
        let mut report = DiscoveryReport {
            found: devices.len(),
            ..DiscoveryReport::default()
        };
        for device in &devices {
            match self.manager.add_device(device) {
                AddOutcome::Added(_) => report.added += 1,
                AddOutcome::Disabled | AddOutcome::AlreadyPresent | AddOutcome::Closed => {
                    report.skipped += 1
                }
                AddOutcome::Failed(_) => report.failed += 1,
            }
        }
        log::info!(
            "discovery: {} device(s) found, {} added, {} skipped, {} failed",
            report.found,
            report.added,
            report.skipped,
            report.failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SourceId;
    use crate::config::RelayConfig;
    use crate::engine::StubEngine;
    use crate::hotplug::{ChannelMonitor, DeviceDescriptor};

    #[test]
    fn adds_every_present_capture_device() -> Result<()> {
        let config = RelayConfig::from_toml_str(
            r#"
            [cameras."usb-0:2"]
            disabled = true
            "#,
        )?;
        let engine = Arc::new(StubEngine::new());
        let manager = Arc::new(CameraManager::new(config, engine));

        let mut output_node = DeviceDescriptor::capture("usb-0:4", "/dev/video7");
        output_node.capabilities = Some(":video_output:".to_string());
        let (monitor, _events) = ChannelMonitor::new(vec![
            DeviceDescriptor::capture("usb-0:1", "/dev/video0"),
            DeviceDescriptor::capture("usb-0:2", "/dev/video2"),
            DeviceDescriptor::capture("usb-0:3", "/dev/video4"),
            output_node,
        ]);

        let report = Discovery::new(manager.clone(), Arc::new(monitor)).run()?;
        assert_eq!(
            report,
            DiscoveryReport {
                found: 3,
                added: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(
            manager.registry().ids(),
            vec![
                SourceId::Device("usb-0:1".to_string()),
                SourceId::Device("usb-0:3".to_string())
            ]
        );
        Ok(())
    }

    #[test]
    fn rerun_adds_only_new_devices() -> Result<()> {
        let manager = Arc::new(CameraManager::new(
            RelayConfig::default(),
            Arc::new(StubEngine::new()),
        ));
        let first = DeviceDescriptor::capture("usb-0:1", "/dev/video0");
        let (monitor, _events) = ChannelMonitor::new(vec![first.clone()]);
        let monitor = Arc::new(monitor);
        let discovery = Discovery::new(manager.clone(), monitor.clone());
        assert_eq!(discovery.run()?.added, 1);

        monitor.set_present(vec![
            first,
            DeviceDescriptor::capture("usb-0:5", "/dev/video2"),
        ]);
        assert_eq!(
            discovery.run()?,
            DiscoveryReport {
                found: 2,
                added: 1,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(manager.registry().len(), 2);

        manager.shutdown();
        assert_eq!(
            discovery.run()?,
            DiscoveryReport {
                found: 2,
                added: 0,
                skipped: 2,
                failed: 0
            }
        );
        assert!(manager.registry().is_empty());
        Ok(())
    }

    #[test]
    fn empty_system_adds_nothing() -> Result<()> {
        let manager = Arc::new(CameraManager::new(
            RelayConfig::default(),
            Arc::new(StubEngine::new()),
        ));
        let (monitor, _events) = ChannelMonitor::new(Vec::new());
        let report = Discovery::new(manager.clone(), Arc::new(monitor)).run()?;
        assert_eq!(report, DiscoveryReport::default());
        assert!(manager.registry().is_empty());
        Ok(())
    }
}
