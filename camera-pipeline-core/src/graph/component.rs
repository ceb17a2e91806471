use crate::models::component::{ComponentHandle, ComponentKind, PortRef};
use crate::models::error::PipelineError;
use crate::traits::device::Device;

use super::port::Port;

/// A hardware unit created through the device, with its ports.
///
/// Destruction consumes the value, so a component is destroyed exactly once.
#[derive(Debug)]
pub struct Component {
    handle: ComponentHandle,
    kind: ComponentKind,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    enabled: bool,
    control_enabled: bool,
}

impl Component {
    /// Create a component and check it exposes at least the given number of
    /// ports. A component with too few ports is destroyed again.
    pub fn create<D: Device + ?Sized>(
        device: &D,
        kind: ComponentKind,
        min_inputs: usize,
        min_outputs: usize,
    ) -> Result<Self, PipelineError> {
        let descriptor = device.create_component(kind)?;
        let handle = descriptor.handle;

        if descriptor.inputs.len() < min_inputs || descriptor.outputs.len() < min_outputs {
            if let Err(e) = device.destroy_component(handle) {
                log::warn!("failed to destroy rejected {}: {}", kind, e);
            }
            return Err(PipelineError::InvalidArgument(format!(
                "{} exposes {} inputs and {} outputs, need at least {} and {}",
                kind,
                descriptor.inputs.len(),
                descriptor.outputs.len(),
                min_inputs,
                min_outputs
            )));
        }

        let inputs = descriptor
            .inputs
            .into_iter()
            .enumerate()
            .map(|(i, d)| Port::new(PortRef::input(handle, i as u32), d))
            .collect();
        let outputs = descriptor
            .outputs
            .into_iter()
            .enumerate()
            .map(|(i, d)| Port::new(PortRef::output(handle, i as u32), d))
            .collect();

        log::info!("created {} ({:?})", kind, handle);
        Ok(Self {
            handle,
            kind,
            inputs,
            outputs,
            enabled: false,
            control_enabled: false,
        })
    }

    pub fn handle(&self) -> ComponentHandle {
        self.handle
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn control(&self) -> PortRef {
        PortRef::control(self.handle)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn input(&self, index: usize) -> Result<&Port, PipelineError> {
        self.inputs
            .get(index)
            .ok_or_else(|| self.missing_port("input", index))
    }

    pub fn input_mut(&mut self, index: usize) -> Result<&mut Port, PipelineError> {
        let err = self.missing_port("input", index);
        self.inputs.get_mut(index).ok_or(err)
    }

    pub fn output(&self, index: usize) -> Result<&Port, PipelineError> {
        self.outputs
            .get(index)
            .ok_or_else(|| self.missing_port("output", index))
    }

    pub fn output_mut(&mut self, index: usize) -> Result<&mut Port, PipelineError> {
        let err = self.missing_port("output", index);
        self.outputs.get_mut(index).ok_or(err)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn enable<D: Device + ?Sized>(&mut self, device: &D) -> Result<(), PipelineError> {
        if self.enabled {
            return Ok(());
        }
        device.enable_component(self.handle)?;
        self.enabled = true;
        Ok(())
    }

    pub fn disable<D: Device + ?Sized>(&mut self, device: &D) -> Result<(), PipelineError> {
        if !self.enabled {
            return Ok(());
        }
        self.enabled = false;
        device.disable_component(self.handle)
    }

    pub(crate) fn mark_control_enabled(&mut self) {
        self.control_enabled = true;
    }

    /// Disable the control port if it was enabled. Best-effort.
    pub fn disable_control<D: Device + ?Sized>(&mut self, device: &D) {
        if !self.control_enabled {
            return;
        }
        self.control_enabled = false;
        if let Err(e) = device.disable_port(self.control()) {
            log::warn!("failed to disable control port of {}: {}", self.kind, e);
        }
    }

    /// Disable (if still enabled) and destroy. Failures are logged.
    pub fn destroy<D: Device + ?Sized>(mut self, device: &D) {
        self.disable_control(device);
        if let Err(e) = self.disable(device) {
            log::warn!("failed to disable {}: {}", self.kind, e);
        }
        match device.destroy_component(self.handle) {
            Ok(()) => log::debug!("destroyed {} ({:?})", self.kind, self.handle),
            Err(e) => log::warn!("failed to destroy {}: {}", self.kind, e),
        }
    }

    fn missing_port(&self, direction: &str, index: usize) -> PipelineError {
        PipelineError::InvalidArgument(format!("{} has no {} port {}", self.kind, direction, index))
    }
}
