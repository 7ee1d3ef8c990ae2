//! Hot-plug device sources.
//!
//! This module provides the [`DeviceMonitor`] seam over the OS hot-plug facility:
//! - udev on Linux (feature: hotplug-udev)
//! - in-process channel monitor (tests, dry runs)
//!
//! A monitor only reports devices. It never decides what a device becomes;
//! that is the manager's job.

use anyhow::Result;
use std::fmt;

pub mod channel;
#[cfg(all(feature = "hotplug-udev", target_os = "linux"))]
pub mod udev;

pub use channel::{ChannelMonitor, EventSender};
#[cfg(all(feature = "hotplug-udev", target_os = "linux"))]
pub use self::udev::UdevMonitor;

/// Kernel subsystem and capability attribute a capture device must carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceFilter {
    pub subsystem: &'static str,
    pub capabilities: &'static str,
}

/// Video4Linux nodes that can capture.
pub const CAPTURE_FILTER: DeviceFilter = DeviceFilter {
    subsystem: "video4linux",
    capabilities: ":capture:",
};

impl DeviceFilter {
    pub fn matches(&self, device: &DeviceDescriptor) -> bool {
        device.capabilities.as_deref() == Some(self.capabilities)
    }
}

/// Snapshot of one device as reported by the hot-plug subsystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Stable, path-derived identity (udev `ID_PATH`).
    pub id_path: String,
    /// Identifier-safe variant of `id_path` (udev `ID_PATH_TAG`).
    pub id_path_tag: Option<String>,
    /// Device node, e.g. `/dev/video0`.
    pub devnode: String,
    /// Capability attribute (udev `ID_V4L_CAPABILITIES`).
    pub capabilities: Option<String>,
    pub serial: Option<String>,
    pub vendor: Option<String>,
    pub model: Option<String>,
}

impl DeviceDescriptor {
    /// Descriptor for a capture-capable node with no vendor metadata.
    pub fn capture(id_path: &str, devnode: &str) -> Self {
        Self {
            id_path: id_path.to_string(),
            id_path_tag: None,
            devnode: devnode.to_string(),
            capabilities: Some(CAPTURE_FILTER.capabilities.to_string()),
            serial: None,
            vendor: None,
            model: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HotplugAction {
    Add,
    Remove,
}

impl fmt::Display for HotplugAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HotplugAction::Add => f.write_str("add"),
            HotplugAction::Remove => f.write_str("remove"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HotplugEvent {
    pub action: HotplugAction,
    pub device: DeviceDescriptor,
}

/// OS hot-plug facility.
pub trait DeviceMonitor: Send + Sync {
    /// Devices present right now that match `filter`. Finite, one-shot.
    fn enumerate(&self, filter: &DeviceFilter) -> Result<Vec<DeviceDescriptor>>;

    /// Deliver add/remove events for `filter.subsystem` until the subscription ends.
    ///
    /// Blocks the calling thread. `ready` is invoked exactly once, as soon as
    /// the subscription is live and no later event can be missed. Returning at
    /// all means the subscription terminated.
    fn subscribe(
        &self,
        filter: &DeviceFilter,
        ready: &mut dyn FnMut(),
        on_event: &mut dyn FnMut(HotplugEvent),
    ) -> Result<()>;
}
