//! Signalling endpoint used by outbound WebRTC sinks.
//!
//! The signalling server itself runs as a separate process. This module only
//! knows how to address it and how to wait until it accepts connections.

use anyhow::{anyhow, Result};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Address substituted for the unspecified address when building client URIs.
const LOOPBACK_HOST: &str = "localhost";
const UNSPECIFIED_HOST: &str = "0.0.0.0";

/// Connection parameters for the signalling server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignallerEndpoint {
    pub host: String,
    pub port: u16,
    /// Use `wss://` instead of `ws://`.
    pub secure: bool,
    /// CA bundle handed to the sink's signaller when present.
    pub certificate: Option<PathBuf>,
}

impl Default for SignallerEndpoint {
    fn default() -> Self {
        Self {
            host: UNSPECIFIED_HOST.to_string(),
            port: 8443,
            secure: false,
            certificate: None,
        }
    }
}

impl SignallerEndpoint {
    /// Host a client on this machine should dial.
    ///
    /// A server bound to the unspecified address is reached through `localhost`.
    pub fn client_host(&self) -> &str {
        if self.host == UNSPECIFIED_HOST {
            LOOPBACK_HOST
        } else {
            &self.host
        }
    }

    /// `{scheme}://{host}:{port}` as handed to outbound sinks.
    pub fn uri(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}", scheme, self.client_host(), self.port)
    }
}

/// Block until the signalling server accepts TCP connections.
///
/// Polls every `poll_interval`. With `timeout = None` this waits forever,
/// which is what the daemon does at startup.
pub fn wait_for_signaller(
    endpoint: &SignallerEndpoint,
    poll_interval: Duration,
    timeout: Option<Duration>,
) -> Result<()> {
    let started = Instant::now();
    log::info!("waiting for signaller at {}", endpoint.uri());
    loop {
        if probe(endpoint, poll_interval) {
            log::info!("signaller reachable at {}", endpoint.uri());
            return Ok(());
        }
        if let Some(limit) = timeout {
            if started.elapsed() >= limit {
                return Err(anyhow!(
                    "signaller at {} not reachable after {:?}",
                    endpoint.uri(),
                    limit
                ));
            }
        }
        std::thread::sleep(poll_interval);
    }
}

fn probe(endpoint: &SignallerEndpoint, connect_timeout: Duration) -> bool {
    let dial_host = if endpoint.host == UNSPECIFIED_HOST {
        "127.0.0.1"
    } else {
        endpoint.host.as_str()
    };
    let Ok(addrs) = (dial_host, endpoint.port).to_socket_addrs() else {
        return false;
    };
    let connect_timeout = connect_timeout.max(Duration::from_millis(50));
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, connect_timeout).is_ok())
}
