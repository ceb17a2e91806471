use super::error::PipelineError;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → opened → components enabled → pools ready → connected → streaming ⇄ capturing
///   ↓       ↓              ↓                ↓             ↓            ↓
///   └───────┴──────────────┴────────────────┴─────────────┴────────────┴──→ closed
/// ```
/// Any setup step that fails moves the session to `Failed`; teardown is still
/// required and moves it to `Closed`.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Opened,
    ComponentsEnabled,
    PoolsReady,
    Connected,
    Streaming,
    Capturing,
    Failed(PipelineError),
    Closed,
}

impl PipelineState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether frames can flow: callbacks are attached and primed.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Streaming | Self::Capturing)
    }

    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_covers_streaming_and_capturing() {
        assert!(PipelineState::Streaming.is_running());
        assert!(PipelineState::Capturing.is_running());
        assert!(!PipelineState::Connected.is_running());
    }

    #[test]
    fn failed_state_carries_error() {
        let state = PipelineState::Failed(PipelineError::TransmissionFailed);
        assert_eq!(state.error(), Some(&PipelineError::TransmissionFailed));
        assert!(PipelineState::Idle.error().is_none());
    }
}
