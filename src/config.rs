use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::signaller::SignallerEndpoint;
use crate::topology::{Geometry, Protocol, StreamMode};
use crate::turn::TurnServer;

pub const CONFIG_PATH_ENV: &str = "CAMERA_RELAY_CONFIG";

pub const DEFAULT_PROTOCOL: Protocol = Protocol::Mjpeg;
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_FRAMERATE: u32 = 10;
const DEFAULT_SIGNALLER_HOST: &str = "0.0.0.0";
const DEFAULT_SIGNALLER_PORT: u16 = 8443;
const DEFAULT_INGEST_FORMAT: &str = "GRAY16_LE";

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    signaller: Option<SignallerConfigFile>,
    turn: Option<TurnConfigFile>,
    cameras: Option<HashMap<String, CameraConfigFile>>,
    ingest: Option<HashMap<String, IngestConfigFile>>,
}

#[derive(Debug, Deserialize, Default)]
struct SignallerConfigFile {
    host: Option<String>,
    port: Option<u16>,
    secure: Option<bool>,
    certificate: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct TurnConfigFile {
    servers: Option<Vec<TurnServer>>,
    credentials_url: Option<String>,
    api_token: Option<String>,
    turn_token: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    name: Option<String>,
    protocol: Option<Protocol>,
    width: Option<u32>,
    height: Option<u32>,
    framerate: Option<u32>,
    mode: Option<ModeName>,
    disabled: Option<bool>,
    target_host: Option<String>,
    target_port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
enum ModeName {
    #[serde(rename = "webrtc")]
    Webrtc,
    #[serde(rename = "udp-out")]
    UdpOut,
}

#[derive(Debug, Deserialize, Default)]
struct IngestConfigFile {
    name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    framerate: Option<u32>,
    format: Option<String>,
}

/// Everything the lifecycle manager reads at startup. Never reloaded.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub signaller: SignallerEndpoint,
    pub turn: TurnSettings,
    /// Device-bound cameras keyed by stable device identity (udev `ID_PATH`).
    pub cameras: HashMap<String, CameraConfig>,
    /// Network ingest sources keyed by listening port.
    pub ingest: BTreeMap<u16, IngestConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnSettings {
    /// Statically configured relays.
    pub servers: Option<Vec<TurnServer>>,
    /// Remote credential service queried at startup when no static list is given.
    pub credentials: Option<TurnCredentialSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnCredentialSource {
    pub url: String,
    pub api_token: String,
    pub turn_token: String,
}

/// Configuration entry for one device-bound camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    /// Display name; the device's path tag is used when unset.
    pub name: Option<String>,
    pub protocol: Protocol,
    pub geometry: Geometry,
    pub mode: StreamMode,
    pub disabled: bool,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            name: None,
            protocol: DEFAULT_PROTOCOL,
            geometry: Geometry {
                width: DEFAULT_WIDTH,
                height: DEFAULT_HEIGHT,
                framerate: DEFAULT_FRAMERATE,
            },
            mode: StreamMode::Webrtc,
            disabled: false,
        }
    }
}

/// Configuration entry for one UDP ingest source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub name: String,
    pub port: u16,
    pub geometry: Geometry,
    /// Raw pixel format of incoming frames, e.g. `GRAY16_LE`.
    pub format: String,
}

impl RelayConfig {
    /// Load from the file named by `CAMERA_RELAY_CONFIG`, if any.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse TOML configuration text. Environment overrides are not applied.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: RelayConfigFile =
            toml::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let mut cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RelayConfigFile) -> Result<Self> {
        let signaller_file = file.signaller.unwrap_or_default();
        let signaller = SignallerEndpoint {
            host: signaller_file
                .host
                .unwrap_or_else(|| DEFAULT_SIGNALLER_HOST.to_string()),
            port: signaller_file.port.unwrap_or(DEFAULT_SIGNALLER_PORT),
            secure: signaller_file.secure.unwrap_or(false),
            certificate: signaller_file.certificate,
        };

        let turn = match file.turn {
            Some(turn) => TurnSettings {
                servers: turn.servers,
                credentials: match (turn.credentials_url, turn.api_token) {
                    (Some(url), Some(api_token)) => Some(TurnCredentialSource {
                        url,
                        api_token,
                        turn_token: turn.turn_token.unwrap_or_default(),
                    }),
                    (Some(_), None) => {
                        return Err(anyhow!("turn.credentials_url requires turn.api_token"))
                    }
                    _ => None,
                },
            },
            None => TurnSettings::default(),
        };

        let mut cameras = HashMap::new();
        for (id, entry) in file.cameras.unwrap_or_default() {
            let camera = camera_from_file(&id, entry)?;
            cameras.insert(id, camera);
        }

        let mut ingest = BTreeMap::new();
        for (key, entry) in file.ingest.unwrap_or_default() {
            let port: u16 = key
                .trim()
                .parse()
                .map_err(|_| anyhow!("ingest key '{}' must be a UDP port number", key))?;
            ingest.insert(port, ingest_from_file(port, entry));
        }

        Ok(Self {
            signaller,
            turn,
            cameras,
            ingest,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("CAMERA_RELAY_SIGNALLER_HOST") {
            if !host.trim().is_empty() {
                self.signaller.host = host;
            }
        }
        if let Ok(port) = std::env::var("CAMERA_RELAY_SIGNALLER_PORT") {
            self.signaller.port = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("CAMERA_RELAY_SIGNALLER_PORT must be a port number"))?;
        }
        if let Ok(secure) = std::env::var("CAMERA_RELAY_SIGNALLER_SECURE") {
            self.signaller.secure = parse_bool(&secure).ok_or_else(|| {
                anyhow!("CAMERA_RELAY_SIGNALLER_SECURE must be true/false/1/0")
            })?;
        }
        if let Ok(path) = std::env::var("CAMERA_RELAY_SIGNALLER_CA") {
            if !path.trim().is_empty() {
                self.signaller.certificate = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.signaller.host.trim().is_empty() {
            return Err(anyhow!("signaller.host must not be empty"));
        }
        for (id, camera) in &self.cameras {
            validate_geometry(&format!("cameras.\"{}\"", id), camera.geometry)?;
        }
        for (port, ingest) in &self.ingest {
            validate_geometry(&format!("ingest.\"{}\"", port), ingest.geometry)?;
            if ingest.format.trim().is_empty() {
                return Err(anyhow!("ingest.\"{}\".format must not be empty", port));
            }
        }
        Ok(())
    }
}

fn camera_from_file(id: &str, file: CameraConfigFile) -> Result<CameraConfig> {
    let defaults = CameraConfig::default();
    let mode = match file.mode.unwrap_or(ModeName::Webrtc) {
        ModeName::Webrtc => StreamMode::Webrtc,
        ModeName::UdpOut => match (file.target_host, file.target_port) {
            (Some(host), Some(port)) => StreamMode::UdpOut { host, port },
            _ => {
                return Err(anyhow!(
                    "cameras.\"{}\": mode udp-out requires target_host and target_port",
                    id
                ))
            }
        },
    };
    Ok(CameraConfig {
        name: file.name,
        protocol: file.protocol.unwrap_or(defaults.protocol),
        geometry: Geometry {
            width: file.width.unwrap_or(defaults.geometry.width),
            height: file.height.unwrap_or(defaults.geometry.height),
            framerate: file.framerate.unwrap_or(defaults.geometry.framerate),
        },
        mode,
        disabled: file.disabled.unwrap_or(false),
    })
}

fn ingest_from_file(port: u16, file: IngestConfigFile) -> IngestConfig {
    IngestConfig {
        name: file.name.unwrap_or_else(|| format!("udp-{}", port)),
        port,
        geometry: Geometry {
            width: file.width.unwrap_or(DEFAULT_WIDTH),
            height: file.height.unwrap_or(DEFAULT_HEIGHT),
            framerate: file.framerate.unwrap_or(DEFAULT_FRAMERATE),
        },
        format: file
            .format
            .unwrap_or_else(|| DEFAULT_INGEST_FORMAT.to_string()),
    }
}

fn validate_geometry(section: &str, geometry: Geometry) -> Result<()> {
    if geometry.width == 0 || geometry.height == 0 {
        return Err(anyhow!("{}: width and height must be greater than zero", section));
    }
    if geometry.framerate == 0 {
        return Err(anyhow!("{}: framerate must be greater than zero", section));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<RelayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
