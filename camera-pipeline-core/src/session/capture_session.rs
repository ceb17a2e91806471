use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::graph::component::Component;
use crate::graph::component_graph::{
    capture_port_index, encoder_kind_for, ComponentGraph, PortName, CAMERA_MIN_OUTPUTS,
    CAMERA_PREVIEW_PORT, ROUTER_ENCODER_PORT, ROUTER_RAW_TAP_PORT,
};
use crate::models::component::{ComponentHandle, ComponentKind, ControlEvent, PortRef};
use crate::models::config::{CameraConfig, CaptureMode, RouterConfig, SensorMode, SessionConfiguration};
use crate::models::diagnostics::{PoolStats, SessionDiagnostics};
use crate::models::encoder::{EncoderKind, EncoderPolicy};
use crate::models::error::PipelineError;
use crate::models::format::{Encoding, PortFormat, Rational, VideoFormat};
use crate::models::frame::{FrameInfo, FrameMetadata};
use crate::models::params::{
    AwbMode, CameraParameters, CameraUseCase, ExposureMode, Parameter, ParameterId,
};
use crate::models::state::PipelineState;
use crate::processing::completion::CompletionContext;
use crate::processing::frame_signal::FrameSignal;
use crate::processing::negotiation::apply_encoder_policy;
use crate::traits::device::{ControlCallback, Device};
use crate::traits::frame_sink::SharedSink;
use crate::traits::session_delegate::SessionDelegate;

/// Orchestrates one camera → encoder pipeline on a [`Device`].
///
/// ```text
/// [camera preview] ──tunnel──→ [null sink]
/// [camera still|video] ──tunnel──→ ([splitter] ──tunnel──→) [encoder] → pool/callback → FrameSink
///                                       └── raw tap → pool/callback → raw FrameSink
/// ```
///
/// Setup calls must run in lifecycle order; each returns the first error it
/// hits and leaves everything created so far for teardown. Teardown runs on
/// `close()` and on drop, never fails, and releases resources in the order
/// callback ports → control port → connections → pools → components.
pub struct CaptureSession<D: Device + 'static> {
    device: Arc<D>,
    camera_num: u32,
    state: PipelineState,
    graph: ComponentGraph,
    sensor_mode: SensorMode,
    capture_mode: CaptureMode,
    router: Option<RouterConfig>,
    policy: Option<EncoderPolicy>,
    completions: Vec<Arc<CompletionContext>>,
    sinks: Vec<SharedSink>,
    raw_sink: Option<SharedSink>,
    signal: Arc<FrameSignal>,
    diagnostics: Arc<Mutex<SessionDiagnostics>>,
    delegate: Option<Arc<dyn SessionDelegate>>,
    capture_timeout: Option<Duration>,
    capture_enabled: bool,
}

impl<D: Device + 'static> CaptureSession<D> {
    pub fn new(device: Arc<D>, camera_num: u32) -> Self {
        Self {
            device,
            camera_num,
            state: PipelineState::Idle,
            graph: ComponentGraph::new(),
            sensor_mode: SensorMode::Invalid,
            capture_mode: CaptureMode::Still,
            router: None,
            policy: None,
            completions: Vec::new(),
            sinks: Vec::new(),
            raw_sink: None,
            signal: Arc::new(FrameSignal::new()),
            diagnostics: Arc::new(Mutex::new(SessionDiagnostics::default())),
            delegate: None,
            capture_timeout: None,
            capture_enabled: false,
        }
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn SessionDelegate>) {
        self.delegate = Some(delegate);
    }

    /// Insert a splitter between the capture port and the encoder. Must be
    /// called before `open`.
    pub fn set_router(&mut self, router: RouterConfig) -> Result<(), PipelineError> {
        self.require(|s| s.is_idle(), "set a router")?;
        self.router = Some(router);
        Ok(())
    }

    /// Destination for the splitter's raw tap.
    pub fn set_raw_sink(&mut self, sink: SharedSink) {
        self.raw_sink = Some(sink);
    }

    /// Longest wait for a frame; `None` waits indefinitely.
    pub fn set_capture_timeout(&mut self, timeout: Option<Duration>) {
        self.capture_timeout = timeout;
    }

    pub fn state(&self) -> PipelineState {
        self.state.clone()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        self.diagnostics.lock().clone()
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.graph.pool_stats()
    }

    pub fn sensor_mode(&self) -> SensorMode {
        self.sensor_mode
    }

    pub fn capture_mode(&self) -> CaptureMode {
        self.capture_mode
    }

    /// Frames completed on the encoder output since the session started.
    pub fn frames_captured(&self) -> u64 {
        self.signal.count()
    }

    /// The format last committed to a named port.
    pub fn port_format(&self, name: PortName) -> Result<PortFormat, PipelineError> {
        Ok(self.graph.port(name, self.capture_mode)?.format().clone())
    }

    pub fn graph(&self) -> &ComponentGraph {
        &self.graph
    }

    // --- Setup ---

    /// Create the camera, the encoder for `capture_mode`, and the splitter
    /// if a router is configured. Transitions: idle → opened.
    pub fn open(&mut self, sensor_mode: SensorMode, capture_mode: CaptureMode) -> Result<(), PipelineError> {
        self.require(|s| s.is_idle(), "open")?;
        if !sensor_mode.is_valid() {
            return Err(self.fail(PipelineError::InvalidArgument(
                "sensor mode is not set".into(),
            )));
        }
        self.sensor_mode = sensor_mode;
        self.capture_mode = capture_mode;

        let result = self.open_components();
        self.finish_step(result, PipelineState::Opened)?;
        log::info!(
            "camera {} opened in {:?} mode at {}",
            self.camera_num,
            capture_mode,
            sensor_mode
        );
        Ok(())
    }

    fn open_components(&mut self) -> Result<(), PipelineError> {
        let device = &*self.device;

        let mut camera = Component::create(device, ComponentKind::Camera, 0, CAMERA_MIN_OUTPUTS)?;
        let control = camera.control();
        let configured = device
            .set_parameter(control, &Parameter::CameraNum(self.camera_num))
            .and_then(|()| device.set_parameter(control, &Parameter::SensorMode(self.sensor_mode.index())))
            .and_then(|()| device.enable_control_port(camera.handle(), control_logger()));
        if let Err(e) = configured {
            camera.destroy(device);
            return Err(e);
        }
        camera.mark_control_enabled();
        self.graph.set_camera(camera);

        let encoder = Component::create(device, encoder_kind_for(self.capture_mode), 1, 1)?;
        self.graph.set_encoder(encoder);

        if let Some(router) = self.router {
            let outputs = if router.raw_tap { 2 } else { 1 };
            let splitter = Component::create(device, ComponentKind::VideoSplitter, 1, outputs)?;
            self.graph.set_router(splitter);
        }
        Ok(())
    }

    pub fn configure_preview_format(
        &mut self,
        encoding: Encoding,
        variant: Option<Encoding>,
        video: VideoFormat,
    ) -> Result<(), PipelineError> {
        self.configure_format(PortName::Preview, PortFormat::new(encoding, variant, video))
    }

    pub fn configure_video_format(
        &mut self,
        encoding: Encoding,
        variant: Option<Encoding>,
        video: VideoFormat,
    ) -> Result<(), PipelineError> {
        self.configure_format(PortName::Video, PortFormat::new(encoding, variant, video))
    }

    pub fn configure_still_format(
        &mut self,
        encoding: Encoding,
        variant: Option<Encoding>,
        video: VideoFormat,
    ) -> Result<(), PipelineError> {
        self.configure_format(PortName::Still, PortFormat::new(encoding, variant, video))
    }

    /// Commit `format` to a named port.
    ///
    /// Fails with `InvalidArgument` for the capture port the mode does not
    /// use, and `InvalidState` once a pool or tunnel references the port.
    pub fn configure_format(&mut self, name: PortName, format: PortFormat) -> Result<(), PipelineError> {
        self.require_opened("configure a port format")?;
        let device = &*self.device;
        let port = self.graph.port_mut(name, self.capture_mode)?;
        if port.is_bound() {
            return Err(PipelineError::InvalidState(format!(
                "{} port is already bound ({:?})",
                name,
                port.binding()
            )));
        }
        port.commit_format(device, format)
    }

    /// Create and enable a null sink to absorb the preview output.
    pub fn configure_preview(&mut self) -> Result<(), PipelineError> {
        self.require(|s| matches!(s, PipelineState::Opened), "configure the preview")?;
        if self.graph.has_preview() {
            return Ok(());
        }
        let device = &*self.device;
        let mut sink = Component::create(device, ComponentKind::NullSink, 1, 0)?;
        if let Err(e) = sink.enable(device) {
            sink.destroy(device);
            return Err(e);
        }
        self.graph.set_preview(sink);
        log::info!("preview routed to {}", ComponentKind::NullSink);
        Ok(())
    }

    pub fn configure_camera(&mut self, config: &CameraConfig) -> Result<(), PipelineError> {
        self.set_control(Parameter::CameraConfig(*config))?;
        log::info!(
            "camera configured: stills {}x{}, preview {}x{}",
            config.max_stills_w,
            config.max_stills_h,
            config.max_preview_video_w,
            config.max_preview_video_h
        );
        Ok(())
    }

    pub fn set_awb_mode(&mut self, mode: AwbMode) -> Result<(), PipelineError> {
        self.set_control(Parameter::AwbMode(mode))
    }

    pub fn set_exposure_mode(&mut self, mode: ExposureMode) -> Result<(), PipelineError> {
        self.set_control(Parameter::ExposureMode(mode))
    }

    pub fn set_sharpness(&mut self, value: Rational) -> Result<(), PipelineError> {
        self.set_control(Parameter::Sharpness(value))
    }

    pub fn set_contrast(&mut self, value: Rational) -> Result<(), PipelineError> {
        self.set_control(Parameter::Contrast(value))
    }

    pub fn set_brightness(&mut self, value: Rational) -> Result<(), PipelineError> {
        self.set_control(Parameter::Brightness(value))
    }

    pub fn set_saturation(&mut self, value: Rational) -> Result<(), PipelineError> {
        self.set_control(Parameter::Saturation(value))
    }

    pub fn set_iso(&mut self, iso: u32) -> Result<(), PipelineError> {
        self.set_control(Parameter::Iso(iso))
    }

    pub fn set_shutter_speed(&mut self, micros: u32) -> Result<(), PipelineError> {
        self.set_control(Parameter::ShutterSpeed(micros))
    }

    pub fn set_use_case(&mut self, use_case: CameraUseCase) -> Result<(), PipelineError> {
        self.set_control(Parameter::UseCase(use_case))
    }

    /// Apply every image control in `params`, stopping at the first failure.
    pub fn apply_camera_parameters(&mut self, params: &CameraParameters) -> Result<(), PipelineError> {
        params.validate().map_err(PipelineError::InvalidArgument)?;
        for parameter in params.to_parameters() {
            self.set_control(parameter)?;
        }
        Ok(())
    }

    /// Read a parameter from the camera's control port.
    pub fn get_parameter(&self, id: ParameterId) -> Result<Parameter, PipelineError> {
        let control = self.graph.camera()?.control();
        self.device.get_parameter(control, id)
    }

    fn set_control(&mut self, parameter: Parameter) -> Result<(), PipelineError> {
        self.require_opened("set a camera parameter")?;
        let control = self.graph.camera()?.control();
        self.device.set_parameter(control, &parameter).inspect_err(|e| {
            log::error!("failed to set {:?}: {}", parameter.id(), e);
        })
    }

    /// Propagate the capture port's format down to the encoder input, then
    /// configure the encoder output per `policy`.
    pub fn configure_encoder(&mut self, policy: EncoderPolicy) -> Result<(), PipelineError> {
        self.require(|s| matches!(s, PipelineState::Opened), "configure the encoder")?;
        let expected = EncoderKind::for_capture_mode(self.capture_mode);
        if policy.kind() != expected {
            return Err(PipelineError::InvalidArgument(format!(
                "{:?} encoder policy does not fit {:?} capture",
                policy.kind(),
                self.capture_mode
            )));
        }

        let result = self.negotiate_encoder(&policy);
        if let Err(e) = result {
            return Err(self.fail(e));
        }
        self.policy = Some(policy);
        Ok(())
    }

    fn negotiate_encoder(&mut self, policy: &EncoderPolicy) -> Result<(), PipelineError> {
        let device = &*self.device;
        let capture = capture_port_index(self.capture_mode);
        let mut format = self.graph.camera()?.output(capture)?.format().clone();

        if let Some(router) = self.graph.router_mut() {
            router.input_mut(0)?.commit_format(device, format.clone())?;
            let raw = router.input(0)?.format().clone();
            for i in 0..router.output_count() {
                router.output_mut(i)?.commit_format(device, raw.clone())?;
            }
            format = router.output(ROUTER_ENCODER_PORT)?.format().clone();
            if let (Some(config), Ok(tap)) = (self.router, router.output_mut(ROUTER_RAW_TAP_PORT)) {
                if config.raw_tap {
                    let mut tap_format = tap.format().clone();
                    tap_format.encoding = config.raw_encoding;
                    tap_format.encoding_variant = None;
                    tap.commit_format(device, tap_format)?;
                }
            }
        }

        let encoder = self.graph.encoder_mut()?;
        encoder.input_mut(0)?.commit_format(device, format)?;
        apply_encoder_policy(device, encoder, policy)
    }

    /// Enable every component. Transitions: opened → components enabled.
    pub fn enable_components(&mut self) -> Result<(), PipelineError> {
        self.require(|s| matches!(s, PipelineState::Opened), "enable components")?;
        let device = &*self.device;
        let mut result = Ok(());
        for component in self.graph.components_mut() {
            if let Err(e) = component.enable(device) {
                log::error!("failed to enable {}: {}", component.kind(), e);
                result = Err(e);
                break;
            }
        }
        self.finish_step(result, PipelineState::ComponentsEnabled)
    }

    /// Allocate pools for the callback-driven ports: the encoder output and,
    /// with a raw tap, splitter output 1.
    /// Transitions: components enabled → pools ready.
    pub fn create_buffer_pools(&mut self) -> Result<(), PipelineError> {
        self.require(
            |s| matches!(s, PipelineState::ComponentsEnabled),
            "create buffer pools",
        )?;
        let result = self.allocate_pools();
        self.finish_step(result, PipelineState::PoolsReady)
    }

    fn allocate_pools(&mut self) -> Result<(), PipelineError> {
        let mut ports = vec![self.graph.encoder()?.output(0)?.port_ref()];
        if let (Some(router), Some(config)) = (self.graph.router(), self.router) {
            if config.raw_tap {
                ports.push(router.output(ROUTER_RAW_TAP_PORT)?.port_ref());
            }
        }

        for port_ref in ports {
            let port = self.graph.port_by_ref_mut(port_ref)?;
            let (num, size) = (port.buffer_num(), port.buffer_size());
            let pool = self.device.create_pool(port_ref, num, size).inspect_err(|e| {
                log::error!("failed to create pool for {}: {}", port_ref, e);
            })?;
            port.bind_pool()?;
            self.graph.add_pool(pool);
            log::info!("{}: pool of {} x {} bytes", port_ref, num, size);
        }
        Ok(())
    }

    /// Tunnel capture → (splitter →) encoder, then preview → null sink.
    /// Transitions: pools ready → connected.
    pub fn set_up_connections(&mut self) -> Result<(), PipelineError> {
        self.require(
            |s| matches!(s, PipelineState::PoolsReady),
            "set up connections",
        )?;
        let result = self.connect_all();
        self.finish_step(result, PipelineState::Connected)
    }

    fn connect_all(&mut self) -> Result<(), PipelineError> {
        let device = &*self.device;
        let camera = self.graph.camera()?;
        let capture = camera.output(capture_port_index(self.capture_mode))?.port_ref();
        let preview = camera.output(CAMERA_PREVIEW_PORT)?.port_ref();
        let encoder_input = self.graph.encoder()?.input(0)?.port_ref();
        let router = match self.graph.router() {
            Some(router) => Some((
                router.input(0)?.port_ref(),
                router.output(ROUTER_ENCODER_PORT)?.port_ref(),
            )),
            None => None,
        };
        let null_sink = match self.graph.preview() {
            Some(sink) => Some(sink.input(0)?.port_ref()),
            None => None,
        };

        match router {
            Some((router_input, router_output)) => {
                self.graph.connect(device, capture, router_input)?;
                self.graph.connect(device, router_output, encoder_input)?;
            }
            None => self.graph.connect(device, capture, encoder_input)?,
        }
        if let Some(sink_input) = null_sink {
            self.graph.connect(device, preview, sink_input)?;
        }
        Ok(())
    }

    /// Open `sink`, attach completion handlers to every pool-bound port and
    /// prime them with the pool's buffers.
    /// Transitions: connected → streaming.
    pub fn enable_callbacks(&mut self, sink: SharedSink) -> Result<(), PipelineError> {
        self.require(|s| matches!(s, PipelineState::Connected), "enable callbacks")?;
        let result = self.attach_callbacks(sink);
        self.finish_step(result, PipelineState::Streaming)
    }

    fn attach_callbacks(&mut self, sink: SharedSink) -> Result<(), PipelineError> {
        let (width, height) = self.sensor_mode.dimensions();
        let policy = self
            .policy
            .unwrap_or_else(|| EncoderPolicy::default_for(self.capture_mode));
        let encoder_output = self.graph.encoder()?.output(0)?.port_ref();

        let mut pools = self.graph.pools().to_vec();
        pools.sort_by_key(|p| p.port() != encoder_output);

        for pool in pools {
            let port = pool.port();
            let is_encoder = port == encoder_output;
            let (encoding, target) = if is_encoder {
                (policy.output_encoding(), Some(Arc::clone(&sink)))
            } else {
                let raw = self.router.map(|r| r.raw_encoding).unwrap_or(Encoding::I420);
                (raw, self.raw_sink.clone())
            };

            if let Some(target) = &target {
                open_sink(target)?;
                self.sinks.push(Arc::clone(target));
            }

            let info = FrameInfo {
                width,
                height,
                encoding,
            };
            let mut context = CompletionContext::new(
                pool,
                self.device.clone(),
                info,
                Arc::clone(&self.diagnostics),
            );
            if let Some(target) = target {
                context = context.with_sink(target);
            }
            if is_encoder {
                context = context.with_signal(Arc::clone(&self.signal));
            }
            if let Some(delegate) = &self.delegate {
                context = context.with_delegate(Arc::clone(delegate));
            }

            let context = Arc::new(context);
            self.device.enable_port(port, Some(context.callback()))?;
            self.completions.push(Arc::clone(&context));
            let sent = context.prime()?;
            log::info!("{}: callbacks enabled, {} buffers sent", port, sent);
        }
        Ok(())
    }

    /// Run the standard setup sequence for `config`, ending with frames
    /// flowing into `sink`.
    pub fn start_pipeline(&mut self, config: &SessionConfiguration, sink: SharedSink) -> Result<(), PipelineError> {
        self.require(|s| s.is_idle(), "start the pipeline")?;
        config.validate().map_err(PipelineError::InvalidArgument)?;

        self.camera_num = config.camera_num;
        if config.router.is_some() {
            self.router = config.router;
        }
        self.capture_timeout = config.capture_timeout;

        self.open(config.sensor_mode, config.capture_mode)?;
        self.configure_camera(&CameraConfig::for_sensor_mode(config.sensor_mode))?;

        let (width, height) = config.sensor_mode.dimensions();
        let capture_rate = match config.capture_mode {
            CaptureMode::Still => Rational::negotiated(),
            CaptureMode::Video => config.frame_rate,
        };
        if config.preview {
            let preview = VideoFormat::for_resolution(width, height, config.frame_rate);
            self.configure_preview_format(Encoding::Opaque, Some(Encoding::I420), preview)?;
        }
        let capture = VideoFormat::for_resolution(width, height, capture_rate);
        match config.capture_mode {
            CaptureMode::Still => {
                self.configure_still_format(Encoding::Opaque, Some(Encoding::I420), capture)?
            }
            CaptureMode::Video => {
                self.configure_video_format(Encoding::Opaque, Some(Encoding::I420), capture)?
            }
        }

        if config.preview {
            self.configure_preview()?;
        }
        if let Some(params) = &config.camera_params {
            self.apply_camera_parameters(params)?;
        }
        self.configure_encoder(config.encoder_policy())?;
        self.enable_components()?;
        self.create_buffer_pools()?;
        self.set_up_connections()?;
        self.enable_callbacks(sink)
    }

    // --- Capture ---

    /// Turn capture on for the active capture port.
    /// Transitions: streaming → capturing.
    pub fn enable_capture(&mut self) -> Result<(), PipelineError> {
        self.require(|s| s.is_streaming(), "enable capture")?;
        self.set_capture(true)?;
        self.capture_enabled = true;
        self.set_state(PipelineState::Capturing);
        Ok(())
    }

    /// Turn capture off. Transitions: capturing → streaming.
    ///
    /// If the device refuses, the session stays capturing so `close` still
    /// turns capture off.
    pub fn disable_capture(&mut self) -> Result<(), PipelineError> {
        self.require(|s| s.is_capturing(), "disable capture")?;
        self.set_capture(false)?;
        self.capture_enabled = false;
        self.set_state(PipelineState::Streaming);
        Ok(())
    }

    fn set_capture(&self, on: bool) -> Result<(), PipelineError> {
        let camera = self.graph.camera()?;
        let port = camera.output(capture_port_index(self.capture_mode))?.port_ref();
        self.device.set_parameter(port, &Parameter::Capture(on))
    }

    /// Trigger one still and wait for it to complete.
    pub fn capture_still(&mut self) -> Result<FrameMetadata, PipelineError> {
        if self.capture_mode != CaptureMode::Still {
            return Err(PipelineError::InvalidState(
                "still capture needs a session opened in still mode".into(),
            ));
        }
        let seen = self.signal.count();
        self.enable_capture()?;
        let frame = self.signal.wait_past(seen, self.capture_timeout);
        if let Err(e) = self.disable_capture() {
            log::warn!("failed to reset capture: {}", e);
        }
        let frame = frame?;
        log::info!(
            "still {} captured ({}x{})",
            frame.sequence,
            frame.width,
            frame.height
        );
        Ok(frame)
    }

    /// Capture `count` stills, pausing `settle` after each.
    pub fn capture_stills(&mut self, count: usize, settle: Duration) -> Result<Vec<FrameMetadata>, PipelineError> {
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            frames.push(self.capture_still()?);
            if !settle.is_zero() {
                thread::sleep(settle);
            }
        }
        Ok(frames)
    }

    /// Capture video for `duration` and return how many frames completed.
    pub fn record(&mut self, duration: Duration) -> Result<u64, PipelineError> {
        if self.capture_mode != CaptureMode::Video {
            return Err(PipelineError::InvalidState(
                "recording needs a session opened in video mode".into(),
            ));
        }
        let seen = self.signal.count();
        self.enable_capture()?;
        thread::sleep(duration);
        self.disable_capture()?;
        let frames = self.signal.count() - seen;
        log::info!("recorded {} frames in {:?}", frames, duration);
        Ok(frames)
    }

    // --- Teardown ---

    /// Release everything the session created. Idempotent; never fails.
    pub fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        let device = &*self.device;

        if self.capture_enabled {
            self.capture_enabled = false;
            if let Err(e) = self.set_capture(false) {
                log::warn!("failed to disable capture: {}", e);
            }
        }

        for context in self.completions.drain(..) {
            context.disable();
            if let Err(e) = device.disable_port(context.port()) {
                log::warn!("failed to disable {}: {}", context.port(), e);
            }
            context.discard_partial();
        }

        self.graph.disable_control(device);
        self.graph.teardown(device);

        for sink in self.sinks.drain(..) {
            if let Err(e) = sink.lock().close() {
                log::warn!("failed to close sink: {}", e);
            }
        }

        self.set_state(PipelineState::Closed);
        log::info!("camera {} closed", self.camera_num);
    }

    // --- Internal helpers ---

    fn set_state(&mut self, state: PipelineState) {
        self.state = state.clone();
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(&state);
        }
    }

    fn require(&self, allowed: impl Fn(&PipelineState) -> bool, action: &str) -> Result<(), PipelineError> {
        if allowed(&self.state) {
            return Ok(());
        }
        Err(PipelineError::InvalidState(format!(
            "cannot {} while {:?}",
            action, self.state
        )))
    }

    /// Any state in which the components exist and are not yet streaming.
    fn require_opened(&self, action: &str) -> Result<(), PipelineError> {
        self.require(
            |s| {
                matches!(
                    s,
                    PipelineState::Opened
                        | PipelineState::ComponentsEnabled
                        | PipelineState::PoolsReady
                        | PipelineState::Connected
                        | PipelineState::Streaming
                        | PipelineState::Capturing
                )
            },
            action,
        )
    }

    fn fail(&mut self, error: PipelineError) -> PipelineError {
        log::error!("pipeline setup failed: {}", error);
        self.set_state(PipelineState::Failed(error.clone()));
        error
    }

    fn finish_step(&mut self, result: Result<(), PipelineError>, next: PipelineState) -> Result<(), PipelineError> {
        match result {
            Ok(()) => {
                self.set_state(next);
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }
}

impl<D: Device + 'static> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_sink(sink: &SharedSink) -> Result<(), PipelineError> {
    let mut sink = sink.lock();
    if !sink.is_open() {
        sink.open()?;
    }
    Ok(())
}

fn control_logger() -> ControlCallback {
    Arc::new(|component: ComponentHandle, event: ControlEvent| match event {
        ControlEvent::ParameterChanged(id) => {
            log::debug!("{}: parameter {:?} changed", PortRef::control(component), id)
        }
        ControlEvent::Error(message) => {
            log::warn!("{}: {}", PortRef::control(component), message)
        }
    })
}
