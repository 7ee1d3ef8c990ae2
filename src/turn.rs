//! TURN relay descriptors injected into outbound sinks.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Credential lifetime requested from the TURN credential service (90 days).
pub const TURN_CREDENTIAL_TTL_SECS: u64 = 86_400 * 90;

/// One relay server as understood by `webrtcsink`'s `turn-servers` property.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServer {
    pub scheme: String,
    pub user: String,
    pub credential: String,
    /// Host, optionally with port and query (e.g. `turn.example:3478?transport=udp`).
    pub host: String,
}

impl fmt::Display for TurnServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}:{}@{}",
            self.scheme, self.user, self.credential, self.host
        )
    }
}

/// Convert an ICE-server credential response into relay descriptors.
///
/// Expected shape: `{"iceServers": {"username": .., "credential": .., "urls": [..]}}`.
/// Only `turn:` URLs are kept; STUN entries carry no credentials to inject.
pub fn parse_ice_servers(response: &serde_json::Value) -> Vec<TurnServer> {
    let Some(ice) = response.get("iceServers") else {
        return Vec::new();
    };
    let user = ice.get("username").and_then(|v| v.as_str()).unwrap_or("");
    let credential = ice.get("credential").and_then(|v| v.as_str()).unwrap_or("");
    let urls = ice
        .get("urls")
        .and_then(|v| v.as_array())
        .map(|urls| urls.as_slice())
        .unwrap_or_default();

    urls.iter()
        .filter_map(|url| url.as_str())
        .filter_map(|url| url.strip_prefix("turn:"))
        .map(|host| TurnServer {
            scheme: "turn".to_string(),
            user: user.to_string(),
            credential: credential.to_string(),
            host: host.to_string(),
        })
        .collect()
}

/// Request short-lived TURN credentials from a credential service.
///
/// `url` may contain a `{TURN_TOKEN}` placeholder. Any failure is logged and
/// yields `None`, meaning "no relay servers configured".
#[cfg(feature = "turn-fetch")]
pub fn fetch_turn_servers(url: &str, api_token: &str, turn_token: &str) -> Option<Vec<TurnServer>> {
    let url = url.replace("{TURN_TOKEN}", turn_token);
    let response = ureq::post(&url)
        .set("Authorization", &format!("Bearer {}", api_token))
        .set("Content-Type", "application/json")
        .send_json(serde_json::json!({ "ttl": TURN_CREDENTIAL_TTL_SECS }));
    let body: serde_json::Value = match response {
        Ok(response) => match response.into_json() {
            Ok(body) => body,
            Err(err) => {
                log::warn!("turn credentials: invalid response body: {}", err);
                return None;
            }
        },
        Err(err) => {
            log::warn!("turn credentials: request failed: {}", err);
            return None;
        }
    };
    let servers = parse_ice_servers(&body);
    log::debug!("turn servers: {}", servers.len());
    Some(servers)
}
