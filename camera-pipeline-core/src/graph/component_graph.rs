use std::fmt;
use std::str::FromStr;

use crate::models::component::{ComponentKind, ConnectionFlags, PortDirection, PortRef};
use crate::models::config::CaptureMode;
use crate::models::diagnostics::PoolStats;
use crate::models::error::PipelineError;
use crate::pool::buffer_pool::BufferPool;
use crate::traits::device::Device;

use super::component::Component;
use super::connection::Connection;
use super::port::Port;

pub const CAMERA_PREVIEW_PORT: usize = 0;
pub const CAMERA_VIDEO_PORT: usize = 1;
pub const CAMERA_STILL_PORT: usize = 2;
pub const CAMERA_MIN_OUTPUTS: usize = 3;

/// Splitter output feeding the encoder.
pub const ROUTER_ENCODER_PORT: usize = 0;
/// Splitter output delivered raw through callbacks.
pub const ROUTER_RAW_TAP_PORT: usize = 1;

/// Ports addressable by name from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortName {
    Preview,
    Video,
    Still,
    EncoderInput,
    EncoderOutput,
}

impl FromStr for PortName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preview" => Ok(Self::Preview),
            "video" => Ok(Self::Video),
            "still" => Ok(Self::Still),
            "encoder-input" => Ok(Self::EncoderInput),
            "encoder-output" => Ok(Self::EncoderOutput),
            other => Err(PipelineError::InvalidArgument(format!("unknown port: {}", other))),
        }
    }
}

impl fmt::Display for PortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Preview => "preview",
            Self::Video => "video",
            Self::Still => "still",
            Self::EncoderInput => "encoder-input",
            Self::EncoderOutput => "encoder-output",
        })
    }
}

/// Camera output that carries captured frames in the given mode.
pub fn capture_port_index(mode: CaptureMode) -> usize {
    match mode {
        CaptureMode::Still => CAMERA_STILL_PORT,
        CaptureMode::Video => CAMERA_VIDEO_PORT,
    }
}

/// Owns every component, connection and pool of one session.
///
/// Teardown runs connections → pools → components; callback ports and the
/// control port must already be disabled by the caller.
#[derive(Debug, Default)]
pub struct ComponentGraph {
    camera: Option<Component>,
    router: Option<Component>,
    encoder: Option<Component>,
    preview: Option<Component>,
    connections: Vec<Connection>,
    pools: Vec<BufferPool>,
}

impl ComponentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.camera.is_none()
            && self.router.is_none()
            && self.encoder.is_none()
            && self.preview.is_none()
            && self.connections.is_empty()
            && self.pools.is_empty()
    }

    pub(crate) fn set_camera(&mut self, camera: Component) {
        self.camera = Some(camera);
    }

    pub(crate) fn set_router(&mut self, router: Component) {
        self.router = Some(router);
    }

    pub(crate) fn set_encoder(&mut self, encoder: Component) {
        self.encoder = Some(encoder);
    }

    pub(crate) fn set_preview(&mut self, preview: Component) {
        self.preview = Some(preview);
    }

    pub fn camera(&self) -> Result<&Component, PipelineError> {
        self.camera.as_ref().ok_or_else(|| not_created("camera"))
    }

    pub fn camera_mut(&mut self) -> Result<&mut Component, PipelineError> {
        self.camera.as_mut().ok_or_else(|| not_created("camera"))
    }

    pub fn encoder(&self) -> Result<&Component, PipelineError> {
        self.encoder.as_ref().ok_or_else(|| not_created("encoder"))
    }

    pub fn encoder_mut(&mut self) -> Result<&mut Component, PipelineError> {
        self.encoder.as_mut().ok_or_else(|| not_created("encoder"))
    }

    pub fn router(&self) -> Option<&Component> {
        self.router.as_ref()
    }

    pub fn router_mut(&mut self) -> Option<&mut Component> {
        self.router.as_mut()
    }

    pub fn preview(&self) -> Option<&Component> {
        self.preview.as_ref()
    }

    pub fn has_preview(&self) -> bool {
        self.preview.is_some()
    }

    /// Components in creation order.
    pub(crate) fn components_mut(&mut self) -> impl Iterator<Item = &mut Component> {
        [
            self.camera.as_mut(),
            self.router.as_mut(),
            self.encoder.as_mut(),
            self.preview.as_mut(),
        ]
        .into_iter()
        .flatten()
    }

    /// Resolve a named port, rejecting the capture port the mode does not use.
    pub fn port(&self, name: PortName, mode: CaptureMode) -> Result<&Port, PipelineError> {
        check_active(name, mode)?;
        match name {
            PortName::Preview => self.camera()?.output(CAMERA_PREVIEW_PORT),
            PortName::Video => self.camera()?.output(CAMERA_VIDEO_PORT),
            PortName::Still => self.camera()?.output(CAMERA_STILL_PORT),
            PortName::EncoderInput => self.encoder()?.input(0),
            PortName::EncoderOutput => self.encoder()?.output(0),
        }
    }

    pub fn port_mut(&mut self, name: PortName, mode: CaptureMode) -> Result<&mut Port, PipelineError> {
        check_active(name, mode)?;
        match name {
            PortName::Preview => self.camera_mut()?.output_mut(CAMERA_PREVIEW_PORT),
            PortName::Video => self.camera_mut()?.output_mut(CAMERA_VIDEO_PORT),
            PortName::Still => self.camera_mut()?.output_mut(CAMERA_STILL_PORT),
            PortName::EncoderInput => self.encoder_mut()?.input_mut(0),
            PortName::EncoderOutput => self.encoder_mut()?.output_mut(0),
        }
    }

    /// Look up any port of the graph by reference.
    pub fn port_by_ref_mut(&mut self, port_ref: PortRef) -> Result<&mut Port, PipelineError> {
        let component = self
            .components_mut()
            .find(|c| c.handle() == port_ref.component)
            .ok_or_else(|| {
                PipelineError::InvalidArgument(format!("{} is not part of this session", port_ref))
            })?;
        match port_ref.direction {
            PortDirection::Input => component.input_mut(port_ref.index as usize),
            PortDirection::Output => component.output_mut(port_ref.index as usize),
            PortDirection::Control => Err(PipelineError::InvalidArgument(format!(
                "{} carries no buffers",
                port_ref
            ))),
        }
    }

    /// Copy the source's format onto the sink, commit it, then create and
    /// enable a tunnel between them.
    ///
    /// The connection is recorded as soon as it exists, so a failed enable
    /// still leaves it for teardown.
    pub fn connect<D: Device + ?Sized>(
        &mut self,
        device: &D,
        source: PortRef,
        sink: PortRef,
    ) -> Result<(), PipelineError> {
        let format = self.port_by_ref_mut(source)?.format().clone();
        {
            let sink_port = self.port_by_ref_mut(sink)?;
            if sink_port.is_connected() {
                return Err(PipelineError::InvalidState(format!("{} is already connected", sink)));
            }
            sink_port.commit_format(device, format)?;
        }
        if self.port_by_ref_mut(source)?.is_connected() {
            return Err(PipelineError::InvalidState(format!("{} is already connected", source)));
        }

        let connection = Connection::create(device, source, sink, ConnectionFlags::TUNNEL)?;
        let handle = connection.handle();
        self.connections.push(connection);
        self.port_by_ref_mut(source)?.bind_connection(handle)?;
        self.port_by_ref_mut(sink)?.bind_connection(handle)?;

        if let Some(connection) = self.connections.last_mut() {
            connection.enable(device)?;
        }
        Ok(())
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub(crate) fn add_pool(&mut self, pool: BufferPool) {
        self.pools.push(pool);
    }

    pub fn pools(&self) -> &[BufferPool] {
        &self.pools
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.pools.iter().map(BufferPool::stats).collect()
    }

    /// Disable the camera's control port. Best-effort.
    pub fn disable_control<D: Device + ?Sized>(&mut self, device: &D) {
        if let Some(camera) = self.camera.as_mut() {
            camera.disable_control(device);
        }
    }

    /// Destroy connections, then pools, then components. Never fails;
    /// problems are logged and teardown carries on.
    pub fn teardown<D: Device + ?Sized>(&mut self, device: &D) {
        for connection in self.connections.drain(..).rev() {
            let (source, sink) = (connection.source(), connection.sink());
            connection.destroy(device);
            log::debug!("destroyed connection {} -> {}", source, sink);
        }
        for pool in self.pools.drain(..) {
            let stats = pool.stats();
            if stats.in_flight > 0 {
                log::warn!(
                    "destroying pool for {} with {} buffers still in flight",
                    stats.port,
                    stats.in_flight
                );
            }
            if let Err(e) = device.destroy_pool(pool) {
                log::warn!("failed to destroy pool for {}: {}", stats.port, e);
            }
        }

        for component in [
            self.preview.take(),
            self.encoder.take(),
            self.router.take(),
            self.camera.take(),
        ]
        .into_iter()
        .flatten()
        {
            component.destroy(device);
        }
    }
}

fn not_created(what: &str) -> PipelineError {
    PipelineError::InvalidState(format!("{} has not been created", what))
}

fn check_active(name: PortName, mode: CaptureMode) -> Result<(), PipelineError> {
    let inactive = match mode {
        CaptureMode::Still => PortName::Video,
        CaptureMode::Video => PortName::Still,
    };
    if name == inactive {
        return Err(PipelineError::InvalidArgument(format!(
            "{} port is not used in {:?} capture mode",
            name, mode
        )));
    }
    Ok(())
}

/// Role-based component kinds for a session.
pub fn encoder_kind_for(mode: CaptureMode) -> ComponentKind {
    match mode {
        CaptureMode::Still => ComponentKind::ImageEncoder,
        CaptureMode::Video => ComponentKind::VideoEncoder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_names_parse() {
        assert_eq!("encoder-output".parse::<PortName>().unwrap(), PortName::EncoderOutput);
        assert!("viewfinder".parse::<PortName>().is_err());
        assert_eq!(PortName::EncoderInput.to_string(), "encoder-input");
    }

    #[test]
    fn inactive_capture_port_is_rejected() {
        assert!(check_active(PortName::Video, CaptureMode::Still).is_err());
        assert!(check_active(PortName::Still, CaptureMode::Video).is_err());
        assert!(check_active(PortName::Preview, CaptureMode::Still).is_ok());
        assert!(check_active(PortName::Still, CaptureMode::Still).is_ok());
    }

    #[test]
    fn capture_port_follows_mode() {
        assert_eq!(capture_port_index(CaptureMode::Still), CAMERA_STILL_PORT);
        assert_eq!(capture_port_index(CaptureMode::Video), CAMERA_VIDEO_PORT);
        assert_eq!(encoder_kind_for(CaptureMode::Video), ComponentKind::VideoEncoder);
    }

    #[test]
    fn empty_graph_resolves_nothing() {
        let graph = ComponentGraph::new();
        assert!(graph.is_empty());
        assert!(matches!(
            graph.port(PortName::Preview, CaptureMode::Still),
            Err(PipelineError::InvalidState(_))
        ));
    }
}
