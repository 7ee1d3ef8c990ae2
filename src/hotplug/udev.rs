//! udev device monitor (Linux).
//!
//! Enumeration uses a udev enumerator matched on subsystem and
//! `ID_V4L_CAPABILITIES`; the subscription reads the udev netlink monitor.
//! udev handles are not `Send`, so every call opens its own context on the
//! calling thread.

use anyhow::{Context, Result};
use std::os::unix::io::AsRawFd;

use super::{DeviceDescriptor, DeviceFilter, DeviceMonitor, HotplugAction, HotplugEvent};

const CAPABILITIES_PROPERTY: &str = "ID_V4L_CAPABILITIES";

#[derive(Debug, Default)]
pub struct UdevMonitor;

impl UdevMonitor {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceMonitor for UdevMonitor {
    fn enumerate(&self, filter: &DeviceFilter) -> Result<Vec<DeviceDescriptor>> {
        let mut enumerator = udev::Enumerator::new().context("create udev enumerator")?;
        enumerator
            .match_subsystem(filter.subsystem)
            .context("match udev subsystem")?;
        enumerator
            .match_property(CAPABILITIES_PROPERTY, filter.capabilities)
            .context("match udev capabilities")?;
        let devices = enumerator.scan_devices().context("scan udev devices")?;
        Ok(devices
            .filter_map(|device| descriptor_from(&device))
            .filter(|device| filter.matches(device))
            .collect())
    }

    fn subscribe(
        &self,
        filter: &DeviceFilter,
        ready: &mut dyn FnMut(),
        on_event: &mut dyn FnMut(HotplugEvent),
    ) -> Result<()> {
        let socket = udev::MonitorBuilder::new()
            .context("create udev monitor")?
            .match_subsystem(filter.subsystem)
            .context("match udev monitor subsystem")?
            .listen()
            .context("listen on udev monitor")?;
        ready();

        let mut fds = [libc::pollfd {
            fd: socket.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }];
        loop {
            // SAFETY: `fds` is a valid, exclusively borrowed array of one pollfd.
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), 1, -1) };
            if rc < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err).context("poll udev monitor");
            }
            for event in socket.iter() {
                let action = match event.event_type() {
                    udev::EventType::Add => HotplugAction::Add,
                    udev::EventType::Remove => HotplugAction::Remove,
                    _ => continue,
                };
                let Some(device) = descriptor_from(&event.device()) else {
                    log::debug!("udev {} event without ID_PATH ignored", action);
                    continue;
                };
                on_event(HotplugEvent { action, device });
            }
        }
    }
}

fn descriptor_from(device: &udev::Device) -> Option<DeviceDescriptor> {
    let property = |key: &str| {
        device
            .property_value(key)
            .map(|value| value.to_string_lossy().into_owned())
    };
    Some(DeviceDescriptor {
        id_path: property("ID_PATH")?,
        id_path_tag: property("ID_PATH_TAG"),
        devnode: device.devnode()?.to_string_lossy().into_owned(),
        capabilities: property(CAPABILITIES_PROPERTY),
        serial: property("ID_SERIAL_SHORT"),
        vendor: property("ID_VENDOR"),
        model: property("ID_MODEL"),
    })
}
