//! In-process device monitor.
//!
//! Devices "present at startup" are given up front; later add/remove events
//! are pushed through an [`EventSender`]. The subscription ends when every
//! sender has been dropped.

use anyhow::{anyhow, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard};

use super::{DeviceDescriptor, DeviceFilter, DeviceMonitor, HotplugAction, HotplugEvent};

pub struct ChannelMonitor {
    present: Mutex<Vec<DeviceDescriptor>>,
    events: Mutex<Option<Receiver<HotplugEvent>>>,
}

/// Producer side of a [`ChannelMonitor`].
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<HotplugEvent>,
}

impl EventSender {
    pub fn add(&self, device: DeviceDescriptor) -> Result<()> {
        self.send(HotplugAction::Add, device)
    }

    pub fn remove(&self, device: DeviceDescriptor) -> Result<()> {
        self.send(HotplugAction::Remove, device)
    }

    pub fn send(&self, action: HotplugAction, device: DeviceDescriptor) -> Result<()> {
        self.tx
            .send(HotplugEvent { action, device })
            .map_err(|_| anyhow!("hot-plug subscription closed"))
    }
}

impl ChannelMonitor {
    pub fn new(present: Vec<DeviceDescriptor>) -> (Self, EventSender) {
        let (tx, rx) = mpsc::channel();
        let monitor = Self {
            present: Mutex::new(present),
            events: Mutex::new(Some(rx)),
        };
        (monitor, EventSender { tx })
    }

    /// Change the set returned by later enumerations.
    pub fn set_present(&self, present: Vec<DeviceDescriptor>) {
        *lock(&self.present) = present;
    }
}

impl DeviceMonitor for ChannelMonitor {
    fn enumerate(&self, filter: &DeviceFilter) -> Result<Vec<DeviceDescriptor>> {
        Ok(lock(&self.present)
            .iter()
            .filter(|device| filter.matches(device))
            .cloned()
            .collect())
    }

    fn subscribe(
        &self,
        _filter: &DeviceFilter,
        ready: &mut dyn FnMut(),
        on_event: &mut dyn FnMut(HotplugEvent),
    ) -> Result<()> {
        let rx = lock(&self.events)
            .take()
            .ok_or_else(|| anyhow!("channel monitor supports a single subscription"))?;
        ready();
        for event in rx {
            on_event(event);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
