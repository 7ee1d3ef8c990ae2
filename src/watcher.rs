//! Hot-plug watcher.
//!
//! The subscription runs on its own thread and only forwards capture-capable
//! events into a queue. A second thread drains that queue into the manager,
//! one event at a time, so events for the same identity are applied in the
//! order they were observed.
//!
//! [`HotplugWatcher::subscribe`] returns once the subscription is live, before
//! any event is applied. Callers that must finish other work first (startup
//! enumeration) do it between `subscribe` and [`PendingEvents::process`];
//! events arriving in between are queued rather than lost.

use anyhow::{anyhow, Context, Result};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::hotplug::{DeviceMonitor, HotplugEvent, CAPTURE_FILTER};
use crate::manager::CameraManager;

pub struct HotplugWatcher {
    manager: Arc<CameraManager>,
    monitor: Arc<dyn DeviceMonitor>,
}

/// A live subscription whose events are being queued.
pub struct PendingEvents {
    manager: Arc<CameraManager>,
    events: Receiver<HotplugEvent>,
    subscription: JoinHandle<Result<()>>,
}

pub struct WatcherHandle {
    subscription: JoinHandle<Result<()>>,
    dispatcher: JoinHandle<()>,
}

impl HotplugWatcher {
    pub fn new(manager: Arc<CameraManager>, monitor: Arc<dyn DeviceMonitor>) -> Self {
        Self { manager, monitor }
    }

    /// Subscribe and start applying events immediately.
    pub fn start(&self) -> Result<WatcherHandle> {
        self.subscribe()?.process()
    }

    /// Open the subscription and block until it is live.
    pub fn subscribe(&self) -> Result<PendingEvents> {
        let (ready_tx, ready_rx) = mpsc::sync_channel::<()>(1);
        let (event_tx, event_rx) = mpsc::channel();
        let monitor = self.monitor.clone();
        let subscription = thread::Builder::new()
            .name("hotplug-subscribe".to_string())
            .spawn(move || {
                let mut ready = || {
                    let _ = ready_tx.send(());
                };
                let mut forward = |event: HotplugEvent| {
                    if !CAPTURE_FILTER.matches(&event.device) {
                        log::debug!(
                            "hot-plug {} for non-capture node {} ignored",
                            event.action,
                            event.device.devnode
                        );
                        return;
                    }
                    let _ = event_tx.send(event);
                };
                monitor.subscribe(&CAPTURE_FILTER, &mut ready, &mut forward)
            })
            .context("spawn hot-plug subscription thread")?;

        if ready_rx.recv().is_err() {
            // The thread exited without signalling readiness.
            let outcome = subscription
                .join()
                .map_err(|_| anyhow!("hot-plug subscription thread panicked"))?;
            outcome.context("hot-plug subscription failed")?;
            return Err(anyhow!("hot-plug subscription ended before it was live"));
        }
        log::info!("hot-plug subscription live");

        Ok(PendingEvents {
            manager: self.manager.clone(),
            events: event_rx,
            subscription,
        })
    }
}

impl PendingEvents {
    /// Apply queued events, then every later one, on a dispatcher thread.
    pub fn process(self) -> Result<WatcherHandle> {
        let PendingEvents {
            manager,
            events,
            subscription,
        } = self;
        let dispatcher = thread::Builder::new()
            .name("hotplug-dispatch".to_string())
            .spawn(move || {
                for event in events {
                    manager.handle_event(&event);
                }
            })
            .context("spawn hot-plug dispatcher thread")?;
        Ok(WatcherHandle {
            subscription,
            dispatcher,
        })
    }
}

impl WatcherHandle {
    /// True once the subscription has ended and every event is applied.
    pub fn is_finished(&self) -> bool {
        self.subscription.is_finished() && self.dispatcher.is_finished()
    }

    /// Wait for the subscription to end and the queue to drain.
    ///
    /// A subscription that ends cleanly yields `Ok`; a monitor failure is
    /// returned as the error.
    pub fn join(self) -> Result<()> {
        let outcome = self
            .subscription
            .join()
            .map_err(|_| anyhow!("hot-plug subscription thread panicked"))?;
        self.dispatcher
            .join()
            .map_err(|_| anyhow!("hot-plug dispatcher thread panicked"))?;
        outcome.context("hot-plug subscription failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SourceId;
    use crate::config::RelayConfig;
    use crate::engine::StubEngine;
    use crate::hotplug::{ChannelMonitor, DeviceDescriptor, DeviceFilter};

    fn manager(engine: Arc<StubEngine>) -> Arc<CameraManager> {
        Arc::new(CameraManager::new(RelayConfig::default(), engine))
    }

    #[test]
    fn applies_events_in_arrival_order() -> Result<()> {
        let engine = Arc::new(StubEngine::new());
        let manager = manager(engine.clone());
        let (monitor, events) = ChannelMonitor::new(Vec::new());
        let handle = HotplugWatcher::new(manager.clone(), Arc::new(monitor)).start()?;

        let front = DeviceDescriptor::capture("usb-0:1", "/dev/video0");
        let back = DeviceDescriptor::capture("usb-0:2", "/dev/video2");
        events.add(front.clone())?;
        events.add(back)?;
        events.remove(front.clone())?;
        events.add(front)?;
        drop(events);
        handle.join()?;

        assert_eq!(
            manager.registry().ids(),
            vec![
                SourceId::Device("usb-0:1".to_string()),
                SourceId::Device("usb-0:2".to_string())
            ]
        );
        let front_pipelines = engine
            .pipelines()
            .into_iter()
            .filter(|pipeline| pipeline.label() == "usb-0:1")
            .count();
        assert_eq!(front_pipelines, 2);
        Ok(())
    }

    #[test]
    fn non_capture_events_are_dropped() -> Result<()> {
        let manager = manager(Arc::new(StubEngine::new()));
        let (monitor, events) = ChannelMonitor::new(Vec::new());
        let handle = HotplugWatcher::new(manager.clone(), Arc::new(monitor)).start()?;

        let mut metadata_node = DeviceDescriptor::capture("usb-0:1", "/dev/video1");
        metadata_node.capabilities = Some(":video_output:".to_string());
        events.add(metadata_node)?;
        drop(events);
        handle.join()?;

        assert!(manager.registry().is_empty());
        Ok(())
    }

    #[test]
    fn events_queue_until_processing_starts() -> Result<()> {
        let manager = manager(Arc::new(StubEngine::new()));
        let (monitor, events) = ChannelMonitor::new(Vec::new());
        let pending = HotplugWatcher::new(manager.clone(), Arc::new(monitor)).subscribe()?;

        events.add(DeviceDescriptor::capture("usb-0:1", "/dev/video0"))?;
        drop(events);
        // Nothing is applied while the events are only queued.
        assert!(manager.registry().is_empty());

        pending.process()?.join()?;
        assert_eq!(manager.registry().len(), 1);
        Ok(())
    }

    struct FailingMonitor;

    impl DeviceMonitor for FailingMonitor {
        fn enumerate(&self, _filter: &DeviceFilter) -> Result<Vec<DeviceDescriptor>> {
            Ok(Vec::new())
        }

        fn subscribe(
            &self,
            _filter: &DeviceFilter,
            _ready: &mut dyn FnMut(),
            _on_event: &mut dyn FnMut(HotplugEvent),
        ) -> Result<()> {
            Err(anyhow!("netlink socket unavailable"))
        }
    }

    #[test]
    fn failed_subscription_is_reported() {
        let manager = manager(Arc::new(StubEngine::new()));
        let err = match HotplugWatcher::new(manager, Arc::new(FailingMonitor)).subscribe() {
            Ok(_) => panic!("subscription should fail"),
            Err(err) => err,
        };
        assert!(format!("{:#}", err).contains("netlink socket unavailable"));
    }
}
