use std::mem;

use crate::pool::buffer::{Buffer, BufferFlags};

/// What a completed buffer did to the frame under assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// Payload appended; the frame is not finished yet.
    Pending,
    /// FRAME_END seen: the whole frame, ready for the sink.
    Complete(Vec<u8>),
    /// TRANSMISSION_FAILED seen: the partial frame was thrown away.
    Discarded { bytes: usize },
}

/// Accumulates buffer payloads until a frame boundary.
///
/// Wrap in `parking_lot::Mutex` when shared with a completion callback.
///
/// FRAME_START is informational only: a frame missing its FRAME_END is
/// merged into the next one rather than dropped. A FRAME_END always
/// completes a frame, even an empty one, so a waiter is never left hanging.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    data: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, buffer: &Buffer) -> AssemblyOutcome {
        if buffer.flags.contains(BufferFlags::TRANSMISSION_FAILED) {
            return AssemblyOutcome::Discarded { bytes: self.reset() };
        }

        self.data.extend_from_slice(buffer.payload());

        if buffer.flags.contains(BufferFlags::FRAME_END) {
            return AssemblyOutcome::Complete(mem::take(&mut self.data));
        }
        AssemblyOutcome::Pending
    }

    /// Drop any partial frame, returning how many bytes were discarded.
    pub fn reset(&mut self) -> usize {
        let bytes = self.data.len();
        self.data.clear();
        bytes
    }

    pub fn pending_len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::component::{ComponentHandle, PortRef};
    use crate::pool::buffer_pool::BufferPool;

    fn pool() -> BufferPool {
        BufferPool::new(PortRef::output(ComponentHandle(1), 0), 8, 16).unwrap()
    }

    fn push(assembler: &mut FrameAssembler, pool: &BufferPool, bytes: &[u8], flags: BufferFlags) -> AssemblyOutcome {
        let mut buf = pool.get().unwrap();
        buf.fill(bytes);
        buf.flags = flags;
        let outcome = assembler.push(&buf);
        pool.release(buf).unwrap();
        outcome
    }

    #[test]
    fn frame_spanning_four_buffers() {
        let pool = pool();
        let mut asm = FrameAssembler::new();

        assert_eq!(push(&mut asm, &pool, b"AB", BufferFlags::FRAME_START), AssemblyOutcome::Pending);
        assert_eq!(push(&mut asm, &pool, b"CD", BufferFlags::NONE), AssemblyOutcome::Pending);
        assert_eq!(push(&mut asm, &pool, b"EF", BufferFlags::NONE), AssemblyOutcome::Pending);
        assert_eq!(
            push(&mut asm, &pool, b"GH", BufferFlags::FRAME_END),
            AssemblyOutcome::Complete(b"ABCDEFGH".to_vec())
        );
        assert_eq!(asm.pending_len(), 0);
    }

    #[test]
    fn transmission_failure_discards_partial_frame() {
        let pool = pool();
        let mut asm = FrameAssembler::new();

        push(&mut asm, &pool, b"AB", BufferFlags::FRAME_START);
        push(&mut asm, &pool, b"CD", BufferFlags::NONE);
        assert_eq!(
            push(&mut asm, &pool, b"XX", BufferFlags::TRANSMISSION_FAILED),
            AssemblyOutcome::Discarded { bytes: 4 }
        );

        push(&mut asm, &pool, b"EF", BufferFlags::FRAME_START);
        assert_eq!(
            push(&mut asm, &pool, b"GH", BufferFlags::FRAME_END),
            AssemblyOutcome::Complete(b"EFGH".to_vec())
        );
    }

    #[test]
    fn single_buffer_frame() {
        let pool = pool();
        let mut asm = FrameAssembler::new();
        assert_eq!(
            push(&mut asm, &pool, b"JPEG", BufferFlags::FRAME),
            AssemblyOutcome::Complete(b"JPEG".to_vec())
        );
    }

    #[test]
    fn empty_frame_end_completes_an_empty_frame() {
        let pool = pool();
        let mut asm = FrameAssembler::new();
        assert_eq!(
            push(&mut asm, &pool, b"", BufferFlags::FRAME_END),
            AssemblyOutcome::Complete(Vec::new())
        );
        assert_eq!(asm.pending_len(), 0);
    }

    #[test]
    fn frame_start_does_not_clear_stale_data() {
        let pool = pool();
        let mut asm = FrameAssembler::new();
        push(&mut asm, &pool, b"AB", BufferFlags::FRAME_START);
        push(&mut asm, &pool, b"CD", BufferFlags::FRAME_START);
        assert_eq!(
            push(&mut asm, &pool, b"EF", BufferFlags::FRAME_END),
            AssemblyOutcome::Complete(b"ABCDEF".to_vec())
        );
    }
}
