use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use camera_pipeline_core::models::component::{
    ComponentDescriptor, ComponentHandle, ComponentKind, ConnectionFlags, ConnectionHandle,
    PortDescriptor, PortDirection, PortRef,
};
use camera_pipeline_core::models::error::PipelineError;
use camera_pipeline_core::models::format::{
    align_up, BufferRequirements, Encoding, PortFormat, VideoFormat, HEIGHT_ALIGNMENT,
    WIDTH_ALIGNMENT,
};
use camera_pipeline_core::models::params::{Parameter, ParameterId};
use camera_pipeline_core::pool::buffer::Buffer;
use camera_pipeline_core::traits::device::{BufferCallback, ControlCallback};

/// Highest H.264 bitrate the encoder accepts, in bits per second.
pub const MAX_H264_BITRATE: u32 = 25_000_000;

/// Recommended size of one compressed output buffer.
pub const ENCODED_BUFFER_SIZE: u32 = 80 * 1024;

/// Smallest compressed output buffer the encoders work with.
pub const ENCODED_BUFFER_SIZE_MIN: u32 = 16 * 1024;

/// Size of one opaque image handle.
pub const OPAQUE_BUFFER_SIZE: u32 = 128;

const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(33_333);

/// One call the device received, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    ComponentCreated(ComponentHandle, ComponentKind),
    ComponentEnabled(ComponentHandle),
    ComponentDisabled(ComponentHandle),
    ComponentDestroyed(ComponentHandle),
    FormatCommitted(PortRef, Encoding),
    BuffersConfigured(PortRef, u32, u32),
    ParameterSet(PortRef, Parameter),
    PortEnabled(PortRef),
    PortDisabled(PortRef),
    ControlPortEnabled(ComponentHandle),
    PoolCreated(PortRef),
    PoolDestroyed(PortRef),
    ConnectionCreated(ConnectionHandle, PortRef, PortRef),
    ConnectionEnabled(ConnectionHandle),
    ConnectionDisabled(ConnectionHandle),
    ConnectionDestroyed(ConnectionHandle),
}

/// Failures to inject, configured through [`crate::VirtualDeviceBuilder`].
#[derive(Debug, Clone, Default)]
pub(crate) struct Faults {
    pub unavailable: Vec<ComponentKind>,
    pub camera_outputs: Option<usize>,
    pub rejected_encodings: Vec<Encoding>,
    pub rejected_parameters: Vec<ParameterId>,
    pub fail_connection_enable: bool,
    pub max_pools: Option<usize>,
    pub transmission_failures: HashSet<u64>,
    pub refuse_buffers: bool,
    pub refuse_capture_stop: bool,
}

pub(crate) struct PortState {
    pub format: PortFormat,
    pub requirements: BufferRequirements,
    pub buffer_num: u32,
    pub buffer_size: u32,
    pub enabled: bool,
    pub callback: Option<BufferCallback>,
    pub queue: VecDeque<Buffer>,
}

impl PortState {
    fn new(format: PortFormat, is_output: bool) -> Self {
        let requirements = requirements_for(&format, is_output);
        Self {
            format,
            requirements,
            buffer_num: 0,
            buffer_size: 0,
            enabled: false,
            callback: None,
            queue: VecDeque::new(),
        }
    }

    fn descriptor(&self) -> PortDescriptor {
        PortDescriptor {
            format: self.format.clone(),
            requirements: self.requirements,
        }
    }
}

pub(crate) struct ComponentState {
    pub kind: ComponentKind,
    pub enabled: bool,
    pub inputs: Vec<PortState>,
    pub outputs: Vec<PortState>,
    pub control: Option<ControlCallback>,
}

pub(crate) struct ConnectionState {
    pub source: PortRef,
    pub sink: PortRef,
    pub enabled: bool,
}

/// Where one synthetic frame goes: a pool-bound port at the end of a tunnel chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Target {
    pub port: PortRef,
    pub encoding: Encoding,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct FramePlan {
    pub sequence: u64,
    pub targets: Vec<Target>,
    pub interval: Duration,
    pub corrupt: bool,
}

pub(crate) struct DeviceState {
    next_handle: u64,
    pub components: HashMap<ComponentHandle, ComponentState>,
    pub connections: HashMap<ConnectionHandle, ConnectionState>,
    pub parameters: HashMap<(PortRef, ParameterId), Parameter>,
    pub events: Vec<DeviceEvent>,
    pub faults: Faults,
    pub live_pools: usize,
    frames_produced: u64,
}

impl DeviceState {
    pub fn new(faults: Faults) -> Self {
        Self {
            next_handle: 1,
            components: HashMap::new(),
            connections: HashMap::new(),
            parameters: HashMap::new(),
            events: Vec::new(),
            faults,
            live_pools: 0,
            frames_produced: 0,
        }
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    pub fn create_component(&mut self, kind: ComponentKind) -> Result<ComponentDescriptor, PipelineError> {
        if self.faults.unavailable.contains(&kind) {
            return Err(PipelineError::DeviceUnavailable(format!(
                "{} is not available",
                kind.component_name()
            )));
        }

        let (inputs, outputs) = match kind {
            ComponentKind::Camera => (0, self.faults.camera_outputs.unwrap_or(3)),
            ComponentKind::VideoEncoder | ComponentKind::ImageEncoder => (1, 1),
            ComponentKind::VideoSplitter => (1, 4),
            ComponentKind::NullSink => (1, 0),
        };
        let (input_format, output_format) = default_formats(kind);
        let state = ComponentState {
            kind,
            enabled: false,
            inputs: (0..inputs)
                .map(|_| PortState::new(input_format.clone(), false))
                .collect(),
            outputs: (0..outputs)
                .map(|_| PortState::new(output_format.clone(), true))
                .collect(),
            control: None,
        };

        let handle = ComponentHandle(self.next_handle());
        let descriptor = ComponentDescriptor {
            handle,
            kind,
            inputs: state.inputs.iter().map(PortState::descriptor).collect(),
            outputs: state.outputs.iter().map(PortState::descriptor).collect(),
        };
        self.components.insert(handle, state);
        self.events.push(DeviceEvent::ComponentCreated(handle, kind));
        Ok(descriptor)
    }

    pub fn component(&self, handle: ComponentHandle) -> Result<&ComponentState, PipelineError> {
        self.components
            .get(&handle)
            .ok_or_else(|| PipelineError::InvalidArgument(format!("no component {}", handle.0)))
    }

    pub fn component_mut(&mut self, handle: ComponentHandle) -> Result<&mut ComponentState, PipelineError> {
        self.components
            .get_mut(&handle)
            .ok_or_else(|| PipelineError::InvalidArgument(format!("no component {}", handle.0)))
    }

    pub fn port(&self, port: PortRef) -> Result<&PortState, PipelineError> {
        let component = self.component(port.component)?;
        let ports = match port.direction {
            PortDirection::Input => &component.inputs,
            PortDirection::Output => &component.outputs,
            PortDirection::Control => return Err(no_buffers(port)),
        };
        ports
            .get(port.index as usize)
            .ok_or_else(|| PipelineError::InvalidArgument(format!("no port {}", port)))
    }

    pub fn port_mut(&mut self, port: PortRef) -> Result<&mut PortState, PipelineError> {
        let component = self.component_mut(port.component)?;
        let ports = match port.direction {
            PortDirection::Input => &mut component.inputs,
            PortDirection::Output => &mut component.outputs,
            PortDirection::Control => return Err(no_buffers(port)),
        };
        ports
            .get_mut(port.index as usize)
            .ok_or_else(|| PipelineError::InvalidArgument(format!("no port {}", port)))
    }

    pub fn commit_format(&mut self, port: PortRef, format: &PortFormat) -> Result<PortDescriptor, PipelineError> {
        let kind = self.component(port.component)?.kind;
        if self.port(port)?.enabled {
            return Err(PipelineError::InvalidState(format!(
                "cannot change the format of enabled port {}",
                port
            )));
        }
        if self.faults.rejected_encodings.contains(&format.encoding)
            || !accepts(kind, port.direction, format.encoding)
        {
            return Err(PipelineError::FormatRejected(format!(
                "{} does not accept {} on {}",
                kind.component_name(),
                format.encoding,
                port
            )));
        }
        if format.video.width == 0 || format.video.height == 0 {
            return Err(PipelineError::FormatRejected(format!(
                "{}: zero-sized picture",
                port
            )));
        }
        if format.encoding == Encoding::H264 && format.bitrate > MAX_H264_BITRATE {
            return Err(PipelineError::FormatRejected(format!(
                "{}: bitrate {} exceeds {}",
                port, format.bitrate, MAX_H264_BITRATE
            )));
        }

        let mut accepted = format.clone();
        accepted.video.width = align_up(accepted.video.width, WIDTH_ALIGNMENT);
        accepted.video.height = align_up(accepted.video.height, HEIGHT_ALIGNMENT);

        let is_output = port.direction == PortDirection::Output;
        let state = self.port_mut(port)?;
        state.requirements = requirements_for(&accepted, is_output);
        state.format = accepted;
        let descriptor = state.descriptor();
        self.events.push(DeviceEvent::FormatCommitted(port, format.encoding));
        Ok(descriptor)
    }

    pub fn configure_buffers(&mut self, port: PortRef, num: u32, size: u32) -> Result<(), PipelineError> {
        let state = self.port_mut(port)?;
        if state.enabled {
            return Err(PipelineError::InvalidState(format!(
                "cannot resize buffers of enabled port {}",
                port
            )));
        }
        let req = state.requirements;
        if num < req.num_min || size < req.size_min {
            return Err(PipelineError::InvalidArgument(format!(
                "{}: {} x {} bytes is below the minimum {} x {}",
                port, num, size, req.num_min, req.size_min
            )));
        }
        state.buffer_num = num;
        state.buffer_size = size;
        self.events.push(DeviceEvent::BuffersConfigured(port, num, size));
        Ok(())
    }

    pub fn create_connection(
        &mut self,
        source: PortRef,
        sink: PortRef,
        _flags: ConnectionFlags,
    ) -> Result<ConnectionHandle, PipelineError> {
        if source.direction != PortDirection::Output || sink.direction != PortDirection::Input {
            return Err(PipelineError::InvalidArgument(format!(
                "cannot connect {} to {}",
                source, sink
            )));
        }
        self.port(source)?;
        self.port(sink)?;
        if let Some(taken) = [source, sink].into_iter().find(|p| self.is_connected(*p)) {
            return Err(PipelineError::InvalidState(format!(
                "{} is already connected",
                taken
            )));
        }

        let handle = ConnectionHandle(self.next_handle());
        self.connections.insert(
            handle,
            ConnectionState {
                source,
                sink,
                enabled: false,
            },
        );
        self.events
            .push(DeviceEvent::ConnectionCreated(handle, source, sink));
        Ok(handle)
    }

    pub fn set_connection_enabled(&mut self, handle: ConnectionHandle, enabled: bool) -> Result<(), PipelineError> {
        let connection = self
            .connections
            .get_mut(&handle)
            .ok_or_else(|| PipelineError::InvalidArgument(format!("no connection {}", handle.0)))?;
        if connection.enabled == enabled {
            return Ok(());
        }
        connection.enabled = enabled;
        let (source, sink) = (connection.source, connection.sink);
        for port in [source, sink] {
            self.port_mut(port)?.enabled = enabled;
        }
        self.events.push(if enabled {
            DeviceEvent::ConnectionEnabled(handle)
        } else {
            DeviceEvent::ConnectionDisabled(handle)
        });
        Ok(())
    }

    pub fn is_connected(&self, port: PortRef) -> bool {
        self.connections
            .values()
            .any(|c| c.source == port || c.sink == port)
    }

    pub fn has_connections(&self, component: ComponentHandle) -> bool {
        self.connections
            .values()
            .any(|c| c.source.component == component || c.sink.component == component)
    }

    /// Follow enabled tunnels from `source` and pick the next frame's
    /// destinations.
    pub fn plan_frame(&mut self, source: PortRef) -> Result<FramePlan, String> {
        let camera = self
            .component(source.component)
            .map_err(|e| e.to_string())?;
        if !camera.enabled {
            return Err("camera is disabled".into());
        }
        let rate = self
            .port(source)
            .map_err(|e| e.to_string())?
            .format
            .video
            .frame_rate
            .as_f64();

        let mut targets = Vec::new();
        self.collect_targets(source, &mut targets, 0);
        if targets.is_empty() {
            return Err("no enabled port receives frames".into());
        }

        let sequence = self.frames_produced;
        self.frames_produced += 1;
        Ok(FramePlan {
            sequence,
            targets,
            interval: if rate > 0.0 {
                Duration::from_secs_f64(1.0 / rate)
            } else {
                DEFAULT_FRAME_INTERVAL
            },
            corrupt: self.faults.transmission_failures.contains(&sequence),
        })
    }

    fn collect_targets(&self, output: PortRef, targets: &mut Vec<Target>, depth: usize) {
        if depth > self.components.len() {
            return;
        }
        let tunnel = self
            .connections
            .values()
            .find(|c| c.source == output && c.enabled);

        if let Some(tunnel) = tunnel {
            let Ok(next) = self.component(tunnel.sink.component) else {
                return;
            };
            if !next.enabled {
                return;
            }
            for index in 0..next.outputs.len() {
                let port = PortRef::output(tunnel.sink.component, index as u32);
                self.collect_targets(port, targets, depth + 1);
            }
            return;
        }

        let Ok(state) = self.port(output) else {
            return;
        };
        if state.enabled && state.callback.is_some() {
            let video = &state.format.video;
            let (width, height) = visible_size(video);
            targets.push(Target {
                port: output,
                encoding: state.format.encoding,
                width,
                height,
            });
        }
    }
}

fn no_buffers(port: PortRef) -> PipelineError {
    PipelineError::InvalidArgument(format!("{} carries no buffers", port))
}

fn visible_size(video: &VideoFormat) -> (u32, u32) {
    if video.crop.width > 0 && video.crop.height > 0 {
        (video.crop.width as u32, video.crop.height as u32)
    } else {
        (video.width, video.height)
    }
}

fn default_formats(kind: ComponentKind) -> (PortFormat, PortFormat) {
    let raw = PortFormat::new(Encoding::Opaque, Some(Encoding::I420), VideoFormat::default());
    let yuv = PortFormat::new(Encoding::I420, None, VideoFormat::default());
    match kind {
        ComponentKind::VideoEncoder => (yuv.clone(), PortFormat::new(Encoding::H264, None, VideoFormat::default())),
        ComponentKind::ImageEncoder => (yuv.clone(), PortFormat::new(Encoding::Jpeg, None, VideoFormat::default())),
        ComponentKind::Camera | ComponentKind::VideoSplitter | ComponentKind::NullSink => (raw.clone(), raw),
    }
}

fn is_uncompressed(encoding: Encoding) -> bool {
    matches!(
        encoding,
        Encoding::Opaque | Encoding::I420 | Encoding::Rgb24 | Encoding::Bgr24
    )
}

fn accepts(kind: ComponentKind, direction: PortDirection, encoding: Encoding) -> bool {
    match (kind, direction) {
        (ComponentKind::VideoEncoder, PortDirection::Output) => {
            matches!(encoding, Encoding::H264 | Encoding::Mjpeg)
        }
        (ComponentKind::ImageEncoder, PortDirection::Output) => matches!(
            encoding,
            Encoding::Jpeg | Encoding::Png | Encoding::Gif | Encoding::Bmp
        ),
        (ComponentKind::NullSink, _) => true,
        _ => is_uncompressed(encoding),
    }
}

fn requirements_for(format: &PortFormat, is_output: bool) -> BufferRequirements {
    let pixels = format.video.width * format.video.height;
    let size = match format.encoding {
        Encoding::Opaque => OPAQUE_BUFFER_SIZE,
        Encoding::I420 => pixels * 3 / 2,
        Encoding::Rgb24 | Encoding::Bgr24 => pixels * 3,
        _ if is_output => ENCODED_BUFFER_SIZE,
        _ => ENCODED_BUFFER_SIZE_MIN,
    };
    let size_min = if format.encoding.is_compressed() {
        ENCODED_BUFFER_SIZE_MIN
    } else {
        size
    };
    BufferRequirements {
        num_min: 1,
        num_recommended: 3,
        size_min,
        size_recommended: size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_pipeline_core::models::format::Rational;

    fn format(encoding: Encoding, width: u32, height: u32) -> PortFormat {
        PortFormat::new(
            encoding,
            None,
            VideoFormat::for_resolution(width, height, Rational::negotiated()),
        )
    }

    #[test]
    fn splitter_has_one_input_and_four_outputs() {
        let mut state = DeviceState::new(Faults::default());
        let descriptor = state.create_component(ComponentKind::VideoSplitter).unwrap();
        assert_eq!(descriptor.inputs.len(), 1);
        assert_eq!(descriptor.outputs.len(), 4);
    }

    #[test]
    fn image_encoder_rejects_h264_output() {
        let mut state = DeviceState::new(Faults::default());
        let encoder = state.create_component(ComponentKind::ImageEncoder).unwrap().handle;
        let result = state.commit_format(PortRef::output(encoder, 0), &format(Encoding::H264, 640, 480));
        assert!(matches!(result, Err(PipelineError::FormatRejected(_))));
    }

    #[test]
    fn commit_aligns_dimensions_and_sizes_buffers() {
        let mut state = DeviceState::new(Faults::default());
        let camera = state.create_component(ComponentKind::Camera).unwrap().handle;
        let mut requested = format(Encoding::I420, 1920, 1080);
        requested.video.width = 1920;
        requested.video.height = 1080;

        let descriptor = state
            .commit_format(PortRef::output(camera, 2), &requested)
            .unwrap();
        assert_eq!(descriptor.format.video.height, 1088);
        assert_eq!(descriptor.requirements.size_recommended, 1920 * 1088 * 3 / 2);
    }

    #[test]
    fn undersized_buffers_are_refused() {
        let mut state = DeviceState::new(Faults::default());
        let encoder = state.create_component(ComponentKind::VideoEncoder).unwrap().handle;
        let output = PortRef::output(encoder, 0);
        state.commit_format(output, &format(Encoding::H264, 640, 480)).unwrap();
        assert!(state.configure_buffers(output, 3, 1024).is_err());
        state.configure_buffers(output, 3, ENCODED_BUFFER_SIZE).unwrap();
    }

    #[test]
    fn a_port_takes_one_connection() {
        let mut state = DeviceState::new(Faults::default());
        let camera = state.create_component(ComponentKind::Camera).unwrap().handle;
        let sink = state.create_component(ComponentKind::NullSink).unwrap().handle;
        let encoder = state.create_component(ComponentKind::VideoEncoder).unwrap().handle;

        state
            .create_connection(PortRef::output(camera, 0), PortRef::input(sink, 0), ConnectionFlags::TUNNEL)
            .unwrap();
        let second = state.create_connection(
            PortRef::output(camera, 0),
            PortRef::input(encoder, 0),
            ConnectionFlags::TUNNEL,
        );
        assert!(matches!(second, Err(PipelineError::InvalidState(_))));
    }
}
