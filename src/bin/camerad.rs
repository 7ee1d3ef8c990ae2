//! camerad - camera relay daemon
//!
//! This daemon:
//! 1. Loads the relay configuration (cameras, ingest ports, signaller, TURN)
//! 2. Optionally waits for the signalling server to accept connections
//! 3. Starts one pipeline per present capture device and per ingest port
//! 4. Follows hot-plug add/remove events until Ctrl-C

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use camera_relay::config::CONFIG_PATH_ENV;
use camera_relay::{
    wait_for_signaller, ChannelMonitor, DeviceMonitor, PipelineEngine, RelayConfig, StubEngine,
    Supervisor,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    Gstreamer,
    /// Record pipelines without running media (dry run).
    Stub,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MonitorKind {
    Udev,
    /// No hot-plug source; only ingest entries are started.
    #[value(name = "none")]
    Disabled,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Relay hot-plugged cameras to WebRTC or UDP")]
struct Args {
    /// Configuration file (TOML, or JSON with a .json extension).
    #[arg(long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Media engine.
    #[arg(long, env = "CAMERA_RELAY_ENGINE", value_enum, default_value = "gstreamer")]
    engine: EngineKind,

    /// Hot-plug device monitor.
    #[arg(long, env = "CAMERA_RELAY_MONITOR", value_enum, default_value = "udev")]
    monitor: MonitorKind,

    /// Block at startup until the signalling server accepts connections.
    #[arg(long, env = "CAMERA_RELAY_WAIT_FOR_SIGNALLER")]
    wait_for_signaller: bool,

    /// Seconds between signaller reachability probes.
    #[arg(long, default_value_t = 1)]
    signaller_poll_secs: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = RelayConfig::load_from(args.config.as_deref())?;
    resolve_turn_servers(&mut config);

    if args.wait_for_signaller {
        wait_for_signaller(
            &config.signaller,
            Duration::from_secs(args.signaller_poll_secs.max(1)),
            None,
        )?;
    }

    let engine = build_engine(args.engine)?;
    // Keeps the idle monitor's subscription open for the daemon's lifetime.
    let (monitor, _idle_events) = build_monitor(args.monitor)?;

    let running = Supervisor::new(config, engine, monitor).start()?;
    log::info!(
        "camerad running: {} camera(s) registered",
        running.manager().registry().len()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    loop {
        match rx.recv_timeout(Duration::from_millis(500)) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                log::info!("shutdown signal received, stopping cameras...");
                running.shutdown();
                return Ok(());
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if running.watcher_finished() {
                    log::warn!("hot-plug subscription ended, stopping cameras...");
                    return running.join();
                }
            }
        }
    }
}

fn resolve_turn_servers(config: &mut RelayConfig) {
    if let Some(servers) = &config.turn.servers {
        log::info!("using {} static turn server(s)", servers.len());
        return;
    }
    let Some(source) = config.turn.credentials.clone() else {
        return;
    };
    #[cfg(feature = "turn-fetch")]
    {
        config.turn.servers = camera_relay::turn::fetch_turn_servers(
            &source.url,
            &source.api_token,
            &source.turn_token,
        );
    }
    #[cfg(not(feature = "turn-fetch"))]
    {
        log::warn!(
            "turn.credentials_url {} ignored: built without the turn-fetch feature",
            source.url
        );
    }
}

fn build_engine(kind: EngineKind) -> Result<Arc<dyn PipelineEngine>> {
    match kind {
        EngineKind::Stub => Ok(Arc::new(StubEngine::new())),
        #[cfg(feature = "engine-gstreamer")]
        EngineKind::Gstreamer => Ok(Arc::new(camera_relay::GstreamerEngine::new()?)),
        #[cfg(not(feature = "engine-gstreamer"))]
        EngineKind::Gstreamer => Err(anyhow!(
            "gstreamer engine requires the engine-gstreamer feature; use --engine stub"
        )),
    }
}

type IdleEvents = Option<camera_relay::hotplug::EventSender>;

fn build_monitor(kind: MonitorKind) -> Result<(Arc<dyn DeviceMonitor>, IdleEvents)> {
    match kind {
        MonitorKind::Disabled => {
            let (monitor, events) = ChannelMonitor::new(Vec::new());
            let monitor: Arc<dyn DeviceMonitor> = Arc::new(monitor);
            Ok((monitor, Some(events)))
        }
        #[cfg(all(feature = "hotplug-udev", target_os = "linux"))]
        MonitorKind::Udev => {
            let monitor: Arc<dyn DeviceMonitor> = Arc::new(camera_relay::UdevMonitor::new());
            Ok((monitor, None))
        }
        #[cfg(not(all(feature = "hotplug-udev", target_os = "linux")))]
        MonitorKind::Udev => Err(anyhow!(
            "udev monitor requires Linux and the hotplug-udev feature; use --monitor none"
        )),
    }
}
