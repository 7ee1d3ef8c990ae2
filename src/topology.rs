//! Pipeline topology catalog.
//!
//! Every camera runs one of five fixed topologies. A topology is a closed
//! enum; its ordered stage list comes from a static table and is turned into
//! concrete, parameterized [`Stage`]s by [`plan`]. Engines only ever see the
//! resulting list, never the topology itself.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::engine::AssemblyError;
use crate::signaller::SignallerEndpoint;
use crate::turn::TurnServer;

/// Encoding a capture device is asked to deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    H264,
    Mjpeg,
    Raw,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::H264 => "h264",
            Protocol::Mjpeg => "mjpeg",
            Protocol::Raw => "raw",
        };
        f.write_str(name)
    }
}

/// Where a device-bound camera publishes its frames.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StreamMode {
    Webrtc,
    UdpOut { host: String, port: u16 },
}

impl StreamMode {
    pub fn name(&self) -> &'static str {
        match self {
            StreamMode::Webrtc => "webrtc",
            StreamMode::UdpOut { .. } => "udp-out",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Topology {
    H264Relay,
    MjpegRelay,
    RawGrayRelay,
    UdpOutRelay { host: String, port: u16 },
    UdpIngestRelay { format: String },
}

/// Position-independent role of a stage inside a topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Capture,
    Filter,
    Parse,
    Decode,
    Convert,
    Queue,
    OutboundSink,
    UdpSink,
}

const H264_RELAY: &[StageKind] = &[
    StageKind::Capture,
    StageKind::Filter,
    StageKind::Parse,
    StageKind::Decode,
    StageKind::OutboundSink,
];
const MJPEG_RELAY: &[StageKind] = &[
    StageKind::Capture,
    StageKind::Filter,
    StageKind::Decode,
    StageKind::OutboundSink,
];
const RAW_GRAY_RELAY: &[StageKind] = &[
    StageKind::Capture,
    StageKind::Filter,
    StageKind::Convert,
    StageKind::Queue,
    StageKind::OutboundSink,
];
const UDP_OUT_RELAY: &[StageKind] = &[
    StageKind::Capture,
    StageKind::Filter,
    StageKind::Convert,
    StageKind::UdpSink,
];
const UDP_INGEST_RELAY: &[StageKind] = &[
    StageKind::Capture,
    StageKind::Filter,
    StageKind::Convert,
    StageKind::Queue,
    StageKind::OutboundSink,
];

const RAW_GRAY_FORMAT: &str = "GRAY16_LE";

impl Topology {
    /// Topology for a device-bound camera.
    ///
    /// `udp-out` ignores the protocol: the device is always read as raw video.
    pub fn for_camera(mode: &StreamMode, protocol: Protocol) -> Self {
        match (mode, protocol) {
            (StreamMode::UdpOut { host, port }, _) => Topology::UdpOutRelay {
                host: host.clone(),
                port: *port,
            },
            (StreamMode::Webrtc, Protocol::H264) => Topology::H264Relay,
            (StreamMode::Webrtc, Protocol::Mjpeg) => Topology::MjpegRelay,
            (StreamMode::Webrtc, Protocol::Raw) => Topology::RawGrayRelay,
        }
    }

    pub fn for_ingest(format: &str) -> Self {
        Topology::UdpIngestRelay {
            format: format.to_string(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Topology::H264Relay => "h264-relay",
            Topology::MjpegRelay => "mjpeg-relay",
            Topology::RawGrayRelay => "raw-gray-relay",
            Topology::UdpOutRelay { .. } => "udp-out-relay",
            Topology::UdpIngestRelay { .. } => "udp-ingest-relay",
        }
    }

    /// Ordered stage roles for this topology.
    pub fn stage_kinds(&self) -> &'static [StageKind] {
        match self {
            Topology::H264Relay => H264_RELAY,
            Topology::MjpegRelay => MJPEG_RELAY,
            Topology::RawGrayRelay => RAW_GRAY_RELAY,
            Topology::UdpOutRelay { .. } => UDP_OUT_RELAY,
            Topology::UdpIngestRelay { .. } => UDP_INGEST_RELAY,
        }
    }

    pub fn publishes_webrtc(&self) -> bool {
        self.stage_kinds().contains(&StageKind::OutboundSink)
    }

    fn caps(&self, geometry: Geometry) -> CapsSpec {
        let (media, format) = match self {
            Topology::H264Relay => ("video/x-h264", None),
            Topology::MjpegRelay => ("image/jpeg", None),
            Topology::RawGrayRelay => ("video/x-raw", Some(RAW_GRAY_FORMAT.to_string())),
            Topology::UdpOutRelay { .. } => ("video/x-raw", None),
            Topology::UdpIngestRelay { format } => ("video/x-raw", Some(format.clone())),
        };
        CapsSpec {
            media,
            format,
            geometry,
        }
    }

    fn decoder(&self) -> Option<&'static str> {
        match self {
            Topology::H264Relay => Some("avdec_h264"),
            Topology::MjpegRelay => Some("jpegdec"),
            _ => None,
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Caps constraint applied by the filter stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapsSpec {
    pub media: &'static str,
    pub format: Option<String>,
    pub geometry: Geometry,
}

impl fmt::Display for CapsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.media)?;
        if let Some(format) = &self.format {
            write!(f, ", format={}", format)?;
        }
        write!(
            f,
            ", width={}, height={}, framerate={}/1",
            self.geometry.width, self.geometry.height, self.geometry.framerate
        )
    }
}

/// Settings carried by the WebRTC publishing sink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundSink {
    pub display_name: String,
    pub signaller_uri: String,
    pub ca_file: Option<PathBuf>,
    pub turn_servers: Option<Vec<String>>,
}

/// A fully parameterized pipeline stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stage {
    DeviceCapture { device: String },
    UdpCapture { port: u16 },
    Filter(CapsSpec),
    Parse,
    Decode { factory: &'static str },
    Convert,
    Queue,
    OutboundSink(OutboundSink),
    UdpSink { host: String, port: u16 },
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::DeviceCapture { .. } | Stage::UdpCapture { .. } => StageKind::Capture,
            Stage::Filter(_) => StageKind::Filter,
            Stage::Parse => StageKind::Parse,
            Stage::Decode { .. } => StageKind::Decode,
            Stage::Convert => StageKind::Convert,
            Stage::Queue => StageKind::Queue,
            Stage::OutboundSink(_) => StageKind::OutboundSink,
            Stage::UdpSink { .. } => StageKind::UdpSink,
        }
    }

    /// Element factory that implements this stage.
    pub fn factory(&self) -> &'static str {
        match self {
            Stage::DeviceCapture { .. } => "v4l2src",
            Stage::UdpCapture { .. } => "udpsrc",
            Stage::Filter(_) => "capsfilter",
            Stage::Parse => "h264parse",
            Stage::Decode { factory } => *factory,
            Stage::Convert => "videoconvert",
            Stage::Queue => "queue",
            Stage::OutboundSink(_) => "webrtcsink",
            Stage::UdpSink { .. } => "udpsink",
        }
    }

    /// Element name inside the pipeline. Unique per topology.
    pub fn element_name(&self) -> &'static str {
        match self.kind() {
            StageKind::Capture => "camera-source",
            StageKind::Filter => "filter",
            StageKind::Parse => "parse",
            StageKind::Decode => "decode",
            StageKind::Convert => "convert",
            StageKind::Queue => "queue",
            StageKind::OutboundSink => "webrtc",
            StageKind::UdpSink => "udp-sink",
        }
    }
}

/// What feeds the capture stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamInput {
    /// Device node, e.g. `/dev/video0`.
    Device(String),
    /// Local UDP listening port.
    Udp(u16),
}

/// Per-camera values the stage table is filled with.
#[derive(Clone, Debug)]
pub struct PipelineParams {
    pub display_name: String,
    pub input: StreamInput,
    pub geometry: Geometry,
}

/// Process-wide settings shared by every outbound sink.
#[derive(Clone, Debug, Default)]
pub struct SinkContext {
    pub signaller: SignallerEndpoint,
    pub turn_servers: Option<Vec<TurnServer>>,
}

impl SinkContext {
    fn outbound_sink(&self, display_name: &str) -> OutboundSink {
        OutboundSink {
            display_name: display_name.to_string(),
            signaller_uri: self.signaller.uri(),
            ca_file: self.signaller.certificate.clone(),
            turn_servers: self
                .turn_servers
                .as_ref()
                .map(|servers| servers.iter().map(|server| server.to_string()).collect()),
        }
    }
}

/// Expand a topology into its ordered, parameterized stage list.
pub fn plan(
    topology: &Topology,
    params: &PipelineParams,
    sink: &SinkContext,
) -> Result<Vec<Stage>, AssemblyError> {
    topology
        .stage_kinds()
        .iter()
        .map(|kind| stage_for(*kind, topology, params, sink))
        .collect()
}

fn stage_for(
    kind: StageKind,
    topology: &Topology,
    params: &PipelineParams,
    sink: &SinkContext,
) -> Result<Stage, AssemblyError> {
    let stage = match kind {
        StageKind::Capture => match (topology, &params.input) {
            (Topology::UdpIngestRelay { .. }, StreamInput::Udp(port)) => {
                Stage::UdpCapture { port: *port }
            }
            (Topology::UdpIngestRelay { .. }, StreamInput::Device(_))
            | (_, StreamInput::Udp(_)) => {
                return Err(AssemblyError::InputMismatch {
                    topology: topology.name(),
                })
            }
            (_, StreamInput::Device(device)) => Stage::DeviceCapture {
                device: device.clone(),
            },
        },
        StageKind::Filter => Stage::Filter(topology.caps(params.geometry)),
        StageKind::Parse => Stage::Parse,
        StageKind::Decode => Stage::Decode {
            factory: topology.decoder().ok_or(AssemblyError::InputMismatch {
                topology: topology.name(),
            })?,
        },
        StageKind::Convert => Stage::Convert,
        StageKind::Queue => Stage::Queue,
        StageKind::OutboundSink => {
            Stage::OutboundSink(sink.outbound_sink(&params.display_name))
        }
        StageKind::UdpSink => match topology {
            Topology::UdpOutRelay { host, port } => Stage::UdpSink {
                host: host.clone(),
                port: *port,
            },
            _ => {
                return Err(AssemblyError::InputMismatch {
                    topology: topology.name(),
                })
            }
        },
    };
    Ok(stage)
}
