use serde::Serialize;

/// Counters for debugging capture sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionDiagnostics {
    pub buffers_completed: u64,
    pub frames_delivered: u64,
    pub bytes_delivered: u64,
    /// Payload bytes thrown away with a failed or flushed partial frame.
    pub bytes_discarded: u64,
    pub transmission_failures: u64,
    pub rearm_failures: u64,
    pub sink_errors: u64,
}

/// Occupancy snapshot of one buffer pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub port: String,
    pub buffer_num: u32,
    pub buffer_size: u32,
    pub available: usize,
    pub in_flight: usize,
}

impl PoolStats {
    /// Every buffer is either queued or loaned out.
    pub fn is_conserved(&self) -> bool {
        self.available + self.in_flight == self.buffer_num as usize
    }
}
