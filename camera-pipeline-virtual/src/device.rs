//! In-process camera device.
//!
//! Models the component/port/connection/buffer contract of a camera stack
//! closely enough to drive a full pipeline without hardware: formats are
//! validated and aligned, tunnels are tracked, buffers queue on ports, and
//! turning capture on spawns a thread that walks the enabled tunnels from
//! the capture port and completes synthetic encoded frames into the host's
//! buffers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use camera_pipeline_core::models::component::{
    ComponentDescriptor, ComponentHandle, ComponentKind, ConnectionFlags, ConnectionHandle,
    ControlEvent, PortDescriptor, PortDirection, PortRef,
};
use camera_pipeline_core::models::error::PipelineError;
use camera_pipeline_core::models::format::{Encoding, PortFormat};
use camera_pipeline_core::models::params::{Parameter, ParameterId};
use camera_pipeline_core::pool::buffer::{Buffer, BufferFlags, RejectedBuffer};
use camera_pipeline_core::pool::buffer_pool::BufferPool;
use camera_pipeline_core::traits::device::{BufferCallback, BufferTransport, ControlCallback, Device};

use crate::capture::CaptureWorker;
use crate::state::{DeviceEvent, DeviceState, Faults};

const MAX_ISO: u32 = 1600;

pub(crate) struct Shared {
    pub state: Mutex<DeviceState>,
    pub buffer_ready: Condvar,
}

/// A camera stack that lives entirely in memory.
///
/// Share it as `Arc<VirtualDevice>`; capture threads are joined on drop.
pub struct VirtualDevice {
    shared: Arc<Shared>,
    captures: Mutex<HashMap<PortRef, CaptureWorker>>,
}

impl VirtualDevice {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> VirtualDeviceBuilder {
        VirtualDeviceBuilder::default()
    }

    fn from_faults(faults: Faults) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DeviceState::new(faults)),
                buffer_ready: Condvar::new(),
            }),
            captures: Mutex::new(HashMap::new()),
        }
    }

    /// Every call received so far, oldest first.
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.shared.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.shared.state.lock().events.clear();
    }

    pub fn live_components(&self) -> usize {
        self.shared.state.lock().components.len()
    }

    pub fn live_connections(&self) -> usize {
        self.shared.state.lock().connections.len()
    }

    pub fn live_pools(&self) -> usize {
        self.shared.state.lock().live_pools
    }

    /// Buffers the host has sent to `port` that have not completed yet.
    pub fn queued_buffers(&self, port: PortRef) -> usize {
        self.shared
            .state
            .lock()
            .port(port)
            .map(|p| p.queue.len())
            .unwrap_or(0)
    }

    pub fn port_format(&self, port: PortRef) -> Option<PortFormat> {
        self.shared.state.lock().port(port).ok().map(|p| p.format.clone())
    }

    /// `(count, size)` last configured on `port`.
    pub fn port_buffers(&self, port: PortRef) -> Option<(u32, u32)> {
        self.shared
            .state
            .lock()
            .port(port)
            .ok()
            .map(|p| (p.buffer_num, p.buffer_size))
    }

    /// Refuse (or accept again) every buffer sent from now on.
    pub fn set_refuse_buffers(&self, refuse: bool) {
        self.shared.state.lock().faults.refuse_buffers = refuse;
    }

    /// Fail (or honour again) every request to turn capture off.
    pub fn set_refuse_capture_stop(&self, refuse: bool) {
        self.shared.state.lock().faults.refuse_capture_stop = refuse;
    }

    /// Whether a capture thread is producing frames from `port`.
    pub fn is_capturing(&self, port: PortRef) -> bool {
        self.captures
            .lock()
            .get(&port)
            .is_some_and(CaptureWorker::is_running)
    }

    fn start_capture(&self, port: PortRef) -> Result<(), PipelineError> {
        let mut captures = self.captures.lock();
        if let Some(worker) = captures.remove(&port) {
            if worker.is_running() {
                captures.insert(port, worker);
                return Ok(());
            }
            worker.stop();
        }
        // Only the video port streams continuously.
        let one_shot = port.index != 1;
        let worker = CaptureWorker::spawn(Arc::clone(&self.shared), port, one_shot)?;
        captures.insert(port, worker);
        Ok(())
    }

    fn stop_capture(&self, port: PortRef) {
        let worker = self.captures.lock().remove(&port);
        if let Some(worker) = worker {
            worker.stop();
        }
    }
}

impl Default for VirtualDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VirtualDevice {
    fn drop(&mut self) {
        for (_, worker) in self.captures.lock().drain() {
            worker.stop();
        }
    }
}

/// Configures the failures a [`VirtualDevice`] will inject.
#[derive(Debug, Default)]
pub struct VirtualDeviceBuilder {
    faults: Faults,
}

impl VirtualDeviceBuilder {
    /// `create_component(kind)` fails with `DeviceUnavailable`.
    pub fn unavailable(mut self, kind: ComponentKind) -> Self {
        self.faults.unavailable.push(kind);
        self
    }

    /// The camera exposes `count` outputs instead of three.
    pub fn camera_outputs(mut self, count: usize) -> Self {
        self.faults.camera_outputs = Some(count);
        self
    }

    /// Every format commit with this encoding fails with `FormatRejected`.
    pub fn reject_encoding(mut self, encoding: Encoding) -> Self {
        self.faults.rejected_encodings.push(encoding);
        self
    }

    pub fn reject_parameter(mut self, id: ParameterId) -> Self {
        self.faults.rejected_parameters.push(id);
        self
    }

    pub fn fail_connection_enable(mut self) -> Self {
        self.faults.fail_connection_enable = true;
        self
    }

    /// At most `count` pools may exist at once.
    pub fn max_pools(mut self, count: usize) -> Self {
        self.faults.max_pools = Some(count);
        self
    }

    /// The frame with this device-wide sequence number ends in a
    /// transmission failure instead of FRAME_END.
    pub fn transmission_failure_on(mut self, sequence: u64) -> Self {
        self.faults.transmission_failures.insert(sequence);
        self
    }

    pub fn build(self) -> VirtualDevice {
        VirtualDevice::from_faults(self.faults)
    }
}

impl BufferTransport for VirtualDevice {
    fn send_buffer(&self, port: PortRef, buffer: Buffer) -> Result<(), RejectedBuffer> {
        let mut state = self.shared.state.lock();
        if state.faults.refuse_buffers {
            return Err(RejectedBuffer::new(
                buffer,
                PipelineError::ResourceExhausted(format!("{} refused the buffer", port)),
            ));
        }
        let slot = match state.port_mut(port) {
            Ok(slot) => slot,
            Err(e) => return Err(RejectedBuffer::new(buffer, e)),
        };
        if !slot.enabled || slot.callback.is_none() {
            return Err(RejectedBuffer::new(
                buffer,
                PipelineError::InvalidState(format!("{} is not enabled for buffers", port)),
            ));
        }
        slot.queue.push_back(buffer);
        drop(state);
        self.shared.buffer_ready.notify_all();
        Ok(())
    }
}

impl Device for VirtualDevice {
    fn create_component(&self, kind: ComponentKind) -> Result<ComponentDescriptor, PipelineError> {
        let descriptor = self.shared.state.lock().create_component(kind)?;
        log::info!(
            "created {} as component {} ({} in, {} out)",
            kind.component_name(),
            descriptor.handle.0,
            descriptor.inputs.len(),
            descriptor.outputs.len()
        );
        Ok(descriptor)
    }

    fn destroy_component(&self, component: ComponentHandle) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        state.component(component)?;
        if state.has_connections(component) {
            return Err(PipelineError::InvalidState(format!(
                "component {} is still connected",
                component.0
            )));
        }
        state.components.remove(&component);
        state.parameters.retain(|(port, _), _| port.component != component);
        state.events.push(DeviceEvent::ComponentDestroyed(component));
        Ok(())
    }

    fn enable_component(&self, component: ComponentHandle) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        state.component_mut(component)?.enabled = true;
        state.events.push(DeviceEvent::ComponentEnabled(component));
        Ok(())
    }

    fn disable_component(&self, component: ComponentHandle) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        state.component_mut(component)?.enabled = false;
        state.events.push(DeviceEvent::ComponentDisabled(component));
        Ok(())
    }

    fn commit_format(&self, port: PortRef, format: &PortFormat) -> Result<PortDescriptor, PipelineError> {
        self.shared.state.lock().commit_format(port, format)
    }

    fn configure_buffers(&self, port: PortRef, num: u32, size: u32) -> Result<(), PipelineError> {
        self.shared.state.lock().configure_buffers(port, num, size)
    }

    fn set_parameter(&self, port: PortRef, parameter: &Parameter) -> Result<(), PipelineError> {
        check_range(parameter)?;
        let notify = {
            let mut state = self.shared.state.lock();
            let kind = state.component(port.component)?.kind;
            if port.direction != PortDirection::Control {
                state.port(port)?;
            }
            if state.faults.rejected_parameters.contains(&parameter.id()) {
                return Err(PipelineError::InvalidArgument(format!(
                    "{} rejected {:?}",
                    port,
                    parameter.id()
                )));
            }
            if let Parameter::Capture(on) = parameter {
                let is_capture_port = kind == ComponentKind::Camera
                    && port.direction == PortDirection::Output
                    && port.index > 0;
                if !is_capture_port {
                    return Err(PipelineError::InvalidArgument(format!(
                        "{} cannot capture",
                        port
                    )));
                }
                if *on && !state.component(port.component)?.enabled {
                    return Err(PipelineError::InvalidState("camera is not enabled".into()));
                }
                if !*on && state.faults.refuse_capture_stop {
                    return Err(PipelineError::DeviceUnavailable(format!(
                        "{} refused to stop capture",
                        port
                    )));
                }
            }

            state
                .parameters
                .insert((port, parameter.id()), parameter.clone());
            state
                .events
                .push(DeviceEvent::ParameterSet(port, parameter.clone()));
            match port.direction {
                PortDirection::Control => state.component(port.component)?.control.clone(),
                _ => None,
            }
        };

        if let Some(control) = notify {
            control(port.component, ControlEvent::ParameterChanged(parameter.id()));
        }
        match parameter {
            Parameter::Capture(true) => self.start_capture(port)?,
            Parameter::Capture(false) => self.stop_capture(port),
            _ => {}
        }
        Ok(())
    }

    fn get_parameter(&self, port: PortRef, id: ParameterId) -> Result<Parameter, PipelineError> {
        let state = self.shared.state.lock();
        state.component(port.component)?;
        state.parameters.get(&(port, id)).cloned().ok_or_else(|| {
            PipelineError::InvalidArgument(format!("{:?} has not been set on {}", id, port))
        })
    }

    fn enable_port(&self, port: PortRef, callback: Option<BufferCallback>) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        let tunnelled = state.is_connected(port);
        let slot = state.port_mut(port)?;
        if slot.enabled {
            return Err(PipelineError::InvalidState(format!("{} is already enabled", port)));
        }
        if callback.is_none() && !tunnelled {
            return Err(PipelineError::InvalidArgument(format!(
                "{} needs a callback or a connection",
                port
            )));
        }
        slot.enabled = true;
        slot.callback = callback;
        state.events.push(DeviceEvent::PortEnabled(port));
        Ok(())
    }

    fn enable_control_port(&self, component: ComponentHandle, callback: ControlCallback) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        let target = state.component_mut(component)?;
        if target.control.is_some() {
            return Err(PipelineError::InvalidState(format!(
                "control port of component {} is already enabled",
                component.0
            )));
        }
        target.control = Some(callback);
        state.events.push(DeviceEvent::ControlPortEnabled(component));
        Ok(())
    }

    fn disable_port(&self, port: PortRef) -> Result<(), PipelineError> {
        let (callback, held) = {
            let mut state = self.shared.state.lock();
            if port.direction == PortDirection::Control {
                state.component_mut(port.component)?.control = None;
                state.events.push(DeviceEvent::PortDisabled(port));
                return Ok(());
            }
            let slot = state.port_mut(port)?;
            if !slot.enabled {
                return Ok(());
            }
            slot.enabled = false;
            let held: Vec<Buffer> = slot.queue.drain(..).collect();
            let callback = slot.callback.take();
            state.events.push(DeviceEvent::PortDisabled(port));
            (callback, held)
        };
        self.shared.buffer_ready.notify_all();

        log::debug!("{}: disabled, returning {} held buffers", port, held.len());
        if let Some(callback) = callback {
            for mut buffer in held {
                buffer.length = 0;
                buffer.offset = 0;
                buffer.flags = BufferFlags::NONE;
                buffer.pts = None;
                callback(buffer);
            }
        }
        Ok(())
    }

    fn create_pool(&self, port: PortRef, num: u32, size: u32) -> Result<BufferPool, PipelineError> {
        let mut state = self.shared.state.lock();
        state.port(port)?;
        if state.faults.max_pools.is_some_and(|max| state.live_pools >= max) {
            return Err(PipelineError::ResourceExhausted(format!(
                "no memory for a pool of {} x {} bytes",
                num, size
            )));
        }
        let pool = BufferPool::new(port, num, size)?;
        state.live_pools += 1;
        state.events.push(DeviceEvent::PoolCreated(port));
        Ok(pool)
    }

    fn destroy_pool(&self, pool: BufferPool) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        state.live_pools = state.live_pools.saturating_sub(1);
        state.events.push(DeviceEvent::PoolDestroyed(pool.port()));
        Ok(())
    }

    fn create_connection(
        &self,
        source: PortRef,
        sink: PortRef,
        flags: ConnectionFlags,
    ) -> Result<ConnectionHandle, PipelineError> {
        self.shared
            .state
            .lock()
            .create_connection(source, sink, flags)
    }

    fn enable_connection(&self, connection: ConnectionHandle) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        if state.faults.fail_connection_enable {
            return Err(PipelineError::DeviceUnavailable(format!(
                "connection {} could not be enabled",
                connection.0
            )));
        }
        state.set_connection_enabled(connection, true)
    }

    fn disable_connection(&self, connection: ConnectionHandle) -> Result<(), PipelineError> {
        self.shared
            .state
            .lock()
            .set_connection_enabled(connection, false)
    }

    fn destroy_connection(&self, connection: ConnectionHandle) -> Result<(), PipelineError> {
        let mut state = self.shared.state.lock();
        state.set_connection_enabled(connection, false)?;
        state.connections.remove(&connection);
        state
            .events
            .push(DeviceEvent::ConnectionDestroyed(connection));
        Ok(())
    }
}

fn check_range(parameter: &Parameter) -> Result<(), PipelineError> {
    let out_of_range = match parameter {
        Parameter::Sharpness(v) | Parameter::Contrast(v) | Parameter::Saturation(v) => {
            !(-1.0..=1.0).contains(&v.as_f64())
        }
        Parameter::Brightness(v) => !(0.0..=1.0).contains(&v.as_f64()),
        Parameter::Iso(iso) => *iso > MAX_ISO,
        Parameter::JpegQuality(q) => !(1..=100).contains(q),
        _ => false,
    };
    if out_of_range {
        return Err(PipelineError::InvalidArgument(format!(
            "{:?} is out of range",
            parameter
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use camera_pipeline_core::models::format::Rational;

    #[test]
    fn disable_port_returns_held_buffers_empty() {
        let device = VirtualDevice::new();
        let encoder = device.create_component(ComponentKind::ImageEncoder).unwrap().handle;
        let output = PortRef::output(encoder, 0);

        let returned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&returned);
        let callback: BufferCallback = Arc::new(move |buffer: Buffer| {
            assert_eq!(buffer.length, 0);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        device.enable_port(output, Some(callback)).unwrap();

        let pool = device.create_pool(output, 3, 64).unwrap();
        while let Some(buffer) = pool.get() {
            device.send_buffer(output, buffer).unwrap();
        }
        assert_eq!(device.queued_buffers(output), 3);

        device.disable_port(output).unwrap();
        assert_eq!(returned.load(Ordering::SeqCst), 3);
        assert_eq!(device.queued_buffers(output), 0);
    }

    #[test]
    fn buffers_to_a_disabled_port_are_handed_back() {
        let device = VirtualDevice::new();
        let encoder = device.create_component(ComponentKind::ImageEncoder).unwrap().handle;
        let output = PortRef::output(encoder, 0);
        let pool = device.create_pool(output, 1, 64).unwrap();

        let rejected = device.send_buffer(output, pool.get().unwrap()).unwrap_err();
        assert!(matches!(rejected.error, PipelineError::InvalidState(_)));
        pool.release(rejected.buffer).unwrap();
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn control_parameters_are_echoed_to_the_control_callback() {
        let device = VirtualDevice::new();
        let camera = device.create_component(ComponentKind::Camera).unwrap().handle;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        device
            .enable_control_port(
                camera,
                Arc::new(move |_: ComponentHandle, event: ControlEvent| sink.lock().push(event)),
            )
            .unwrap();

        device
            .set_parameter(PortRef::control(camera), &Parameter::Iso(800))
            .unwrap();
        assert_eq!(
            *seen.lock(),
            vec![ControlEvent::ParameterChanged(ParameterId::Iso)]
        );
        assert_eq!(
            device
                .get_parameter(PortRef::control(camera), ParameterId::Iso)
                .unwrap(),
            Parameter::Iso(800)
        );
    }

    #[test]
    fn out_of_range_controls_are_rejected() {
        let device = VirtualDevice::new();
        let camera = device.create_component(ComponentKind::Camera).unwrap().handle;
        let control = PortRef::control(camera);
        assert!(device.set_parameter(control, &Parameter::Iso(6400)).is_err());
        assert!(device
            .set_parameter(control, &Parameter::Brightness(Rational::new(150, 100)))
            .is_err());
    }

    #[test]
    fn capture_is_only_valid_on_camera_capture_ports() {
        let device = VirtualDevice::new();
        let camera = device.create_component(ComponentKind::Camera).unwrap().handle;
        device.enable_component(camera).unwrap();
        let preview = PortRef::output(camera, 0);
        assert!(matches!(
            device.set_parameter(preview, &Parameter::Capture(true)),
            Err(PipelineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn connected_components_cannot_be_destroyed() {
        let device = VirtualDevice::new();
        let camera = device.create_component(ComponentKind::Camera).unwrap().handle;
        let sink = device.create_component(ComponentKind::NullSink).unwrap().handle;
        let connection = device
            .create_connection(PortRef::output(camera, 0), PortRef::input(sink, 0), ConnectionFlags::TUNNEL)
            .unwrap();

        assert!(device.destroy_component(sink).is_err());
        device.destroy_connection(connection).unwrap();
        device.destroy_component(sink).unwrap();
        assert_eq!(device.live_components(), 1);
    }
}
