use std::fmt;

use super::format::{BufferRequirements, PortFormat};

/// Opaque device-side identity of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentHandle(pub u64);

/// Opaque device-side identity of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Control,
    Input,
    Output,
}

/// Addresses one port of one component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRef {
    pub component: ComponentHandle,
    pub direction: PortDirection,
    pub index: u32,
}

impl PortRef {
    pub fn control(component: ComponentHandle) -> Self {
        Self {
            component,
            direction: PortDirection::Control,
            index: 0,
        }
    }

    pub fn input(component: ComponentHandle, index: u32) -> Self {
        Self {
            component,
            direction: PortDirection::Input,
            index,
        }
    }

    pub fn output(component: ComponentHandle, index: u32) -> Self {
        Self {
            component,
            direction: PortDirection::Output,
            index,
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            PortDirection::Control => "control",
            PortDirection::Input => "in",
            PortDirection::Output => "out",
        };
        write!(f, "component {}:{}{}", self.component.0, dir, self.index)
    }
}

/// What a component does in the pipeline graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentRole {
    Source,
    Encoder,
    Router,
    Sink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Camera,
    VideoEncoder,
    ImageEncoder,
    VideoSplitter,
    NullSink,
}

impl ComponentKind {
    /// Name the device's constructor lookup uses.
    pub fn component_name(&self) -> &'static str {
        match self {
            Self::Camera => "vc.ril.camera",
            Self::VideoEncoder => "vc.ril.video_encode",
            Self::ImageEncoder => "vc.ril.image_encode",
            Self::VideoSplitter => "vc.ril.video_splitter",
            Self::NullSink => "vc.null_sink",
        }
    }

    pub fn role(&self) -> ComponentRole {
        match self {
            Self::Camera => ComponentRole::Source,
            Self::VideoEncoder | Self::ImageEncoder => ComponentRole::Encoder,
            Self::VideoSplitter => ComponentRole::Router,
            Self::NullSink => ComponentRole::Sink,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.component_name())
    }
}

/// Format and buffer requirements a port currently reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortDescriptor {
    pub format: PortFormat,
    pub requirements: BufferRequirements,
}

/// What the device hands back after creating a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDescriptor {
    pub handle: ComponentHandle,
    pub kind: ComponentKind,
    pub inputs: Vec<PortDescriptor>,
    pub outputs: Vec<PortDescriptor>,
}

/// How a connection moves buffers between its two ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionFlags {
    /// Buffers move inside the device without completion callbacks.
    pub tunnelling: bool,
    /// The input port's pool backs the connection.
    pub allocation_on_input: bool,
}

impl ConnectionFlags {
    pub const TUNNEL: Self = Self {
        tunnelling: true,
        allocation_on_input: true,
    };
}

/// Notification delivered on a component's control port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    ParameterChanged(super::params::ParameterId),
    Error(String),
}
