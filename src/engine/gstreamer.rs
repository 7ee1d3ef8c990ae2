//! GStreamer pipeline engine.
//!
//! Builds one `gst::Pipeline` per camera from the stage list, element by
//! element, and watches its bus on a dedicated thread. End-of-stream and
//! error messages are forwarded to the camera's fault handler.
//!
//! The outbound sink is `webrtcsink` from gst-plugins-rs; it must be on
//! `GST_PLUGIN_PATH`.

use anyhow::{anyhow, Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    AssemblyError, FaultHandler, PipelineEngine, PipelineFault, PipelineHandle, PipelineState,
};
use crate::topology::{OutboundSink, Stage};

const BUS_POLL: Duration = Duration::from_millis(100);

pub struct GstreamerEngine;

impl GstreamerEngine {
    pub fn new() -> Result<Self> {
        gst::init().context("initialize gstreamer")?;
        Ok(Self)
    }
}

impl PipelineEngine for GstreamerEngine {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn assemble(
        &self,
        label: &str,
        stages: &[Stage],
        on_fault: FaultHandler,
    ) -> Result<Box<dyn PipelineHandle>, AssemblyError> {
        if stages.is_empty() {
            return Err(AssemblyError::Empty);
        }

        let pipeline = gst::Pipeline::with_name(&pipeline_name(label));
        let mut elements = Vec::with_capacity(stages.len());
        for stage in stages {
            let element = make_element(stage)?;
            pipeline
                .add(&element)
                .map_err(|err| AssemblyError::Engine(err.to_string()))?;
            elements.push(element);
        }

        for (pair, names) in elements.windows(2).zip(stages.windows(2)) {
            pair[0].link(&pair[1]).map_err(|_| AssemblyError::Link {
                from: names[0].element_name(),
                to: names[1].element_name(),
            })?;
        }

        let bus = pipeline
            .bus()
            .ok_or_else(|| AssemblyError::Engine("pipeline has no bus".to_string()))?;
        let shutdown = Arc::new(AtomicBool::new(false));
        spawn_bus_watch(label.to_string(), bus, shutdown.clone(), on_fault)
            .map_err(|err| AssemblyError::Engine(err.to_string()))?;

        Ok(Box::new(GstreamerPipeline { pipeline, shutdown }))
    }
}

struct GstreamerPipeline {
    pipeline: gst::Pipeline,
    shutdown: Arc<AtomicBool>,
}

impl PipelineHandle for GstreamerPipeline {
    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        let target = match state {
            PipelineState::Playing => gst::State::Playing,
            PipelineState::Stopped => gst::State::Null,
        };
        self.pipeline
            .set_state(target)
            .with_context(|| format!("set pipeline to {:?}", target))?;
        let (result, current, _pending) = self.pipeline.state(gst::ClockTime::NONE);
        result.with_context(|| format!("wait for pipeline state {:?}", target))?;
        if current != target {
            return Err(anyhow!(
                "pipeline settled in {:?} instead of {:?}",
                current,
                target
            ));
        }
        Ok(())
    }
}

impl Drop for GstreamerPipeline {
    fn drop(&mut self) {
        // The bus thread may be blocked inside the fault handler, so it is
        // signalled rather than joined.
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn make_element(stage: &Stage) -> Result<gst::Element, AssemblyError> {
    let factory = stage.factory();
    let unavailable = |err: gst::glib::BoolError| AssemblyError::ElementUnavailable {
        factory,
        reason: err.to_string(),
    };
    let builder = gst::ElementFactory::make(factory).name(stage.element_name());
    let element = match stage {
        Stage::DeviceCapture { device } => builder.property("device", device.as_str()).build(),
        Stage::UdpCapture { port } => builder.property("port", i32::from(*port)).build(),
        Stage::Filter(caps) => {
            let caps = gst::Caps::from_str(&caps.to_string()).map_err(unavailable)?;
            builder.property("caps", caps).build()
        }
        Stage::UdpSink { host, port } => builder
            .property("host", host.as_str())
            .property("port", i32::from(*port))
            .build(),
        Stage::Parse | Stage::Decode { .. } | Stage::Convert | Stage::Queue => builder.build(),
        Stage::OutboundSink(settings) => {
            let sink = builder.build().map_err(unavailable)?;
            configure_outbound_sink(&sink, settings);
            return Ok(sink);
        }
    };
    element.map_err(unavailable)
}

fn configure_outbound_sink(sink: &gst::Element, settings: &OutboundSink) {
    let meta = gst::Structure::builder("meta")
        .field("name", settings.display_name.as_str())
        .build();
    sink.set_property("meta", meta);

    if let Some(servers) = &settings.turn_servers {
        let servers =
            gst::Array::from_values(servers.iter().map(|server| server.to_send_value()));
        sink.set_property("turn-servers", servers);
    }

    let signaller = sink.property::<gst::glib::Object>("signaller");
    signaller.set_property("uri", settings.signaller_uri.as_str());
    if let Some(ca_file) = &settings.ca_file {
        signaller.set_property("cafile", ca_file.to_string_lossy().to_string());
    }
}

fn spawn_bus_watch(
    label: String,
    bus: gst::Bus,
    shutdown: Arc<AtomicBool>,
    on_fault: FaultHandler,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("bus-{}", label))
        .spawn(move || {
            let poll = gst::ClockTime::from_mseconds(BUS_POLL.as_millis() as u64);
            while !shutdown.load(Ordering::SeqCst) {
                let Some(message) = bus.timed_pop_filtered(
                    poll,
                    &[gst::MessageType::Eos, gst::MessageType::Error],
                ) else {
                    continue;
                };
                let fault = match message.view() {
                    gst::MessageView::Eos(..) => PipelineFault::End,
                    gst::MessageView::Error(err) => PipelineFault::Error(format!(
                        "{} (from {:?}): {:?}",
                        err.error(),
                        err.src().map(|src| src.path_string()),
                        err.debug()
                    )),
                    _ => continue,
                };
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                on_fault(fault);
            }
            log::debug!("bus watch for {} finished", label);
        })
        .map(|_| ())
}

fn pipeline_name(label: &str) -> String {
    let sanitized: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("pipeline-{}", sanitized)
}
