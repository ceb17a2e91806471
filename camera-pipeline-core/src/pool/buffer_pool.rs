use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::buffer::{Buffer, RejectedBuffer};
use crate::models::component::PortRef;
use crate::models::diagnostics::PoolStats;
use crate::models::error::PipelineError;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

struct PoolQueue {
    queue: VecDeque<Buffer>,
    loaned: HashSet<u32>,
}

struct PoolInner {
    id: u64,
    port: PortRef,
    buffer_num: u32,
    buffer_size: u32,
    state: Mutex<PoolQueue>,
}

/// Bounded FIFO of buffers sized to one port's negotiated count and size.
///
/// Cloning yields another handle to the same pool, so the session and the
/// completion handler can share it. For the pool's whole lifetime
/// `available() + in_flight() == buffer_num()`.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(port: PortRef, buffer_num: u32, buffer_size: u32) -> Result<Self, PipelineError> {
        if buffer_num == 0 || buffer_size == 0 {
            return Err(PipelineError::ResourceExhausted(format!(
                "cannot allocate {} buffers of {} bytes for {}",
                buffer_num, buffer_size, port
            )));
        }

        let id = NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed);
        let queue = (0..buffer_num)
            .map(|i| Buffer::new(i, id, buffer_size))
            .collect();

        Ok(Self {
            inner: Arc::new(PoolInner {
                id,
                port,
                buffer_num,
                buffer_size,
                state: Mutex::new(PoolQueue {
                    queue,
                    loaned: HashSet::new(),
                }),
            }),
        })
    }

    /// Take the oldest queued buffer, if any.
    pub fn get(&self) -> Option<Buffer> {
        let mut state = self.inner.state.lock();
        let buffer = state.queue.pop_front()?;
        state.loaned.insert(buffer.id());
        Some(buffer)
    }

    /// Return a loaned buffer to the back of the queue.
    ///
    /// Buffers from another pool, or ones that are not currently on loan,
    /// are handed back untouched.
    pub fn release(&self, mut buffer: Buffer) -> Result<(), RejectedBuffer> {
        if buffer.pool_id() != self.inner.id {
            let error = PipelineError::InvalidArgument(format!(
                "buffer {} belongs to pool {}, not {}",
                buffer.id(),
                buffer.pool_id(),
                self.inner.id
            ));
            return Err(RejectedBuffer::new(buffer, error));
        }

        let mut state = self.inner.state.lock();
        if !state.loaned.remove(&buffer.id()) {
            let error = PipelineError::InvalidState(format!(
                "buffer {} was already returned to pool {}",
                buffer.id(),
                self.inner.id
            ));
            return Err(RejectedBuffer::new(buffer, error));
        }
        buffer.reset();
        state.queue.push_back(buffer);
        Ok(())
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn port(&self) -> PortRef {
        self.inner.port
    }

    pub fn buffer_num(&self) -> u32 {
        self.inner.buffer_num
    }

    pub fn buffer_size(&self) -> u32 {
        self.inner.buffer_size
    }

    pub fn available(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().loaned.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            port: self.inner.port.to_string(),
            buffer_num: self.inner.buffer_num,
            buffer_size: self.inner.buffer_size,
            available: state.queue.len(),
            in_flight: state.loaned.len(),
        }
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("id", &self.inner.id)
            .field("port", &self.inner.port)
            .field("buffer_num", &self.inner.buffer_num)
            .field("buffer_size", &self.inner.buffer_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::component::ComponentHandle;

    fn port() -> PortRef {
        PortRef::output(ComponentHandle(1), 0)
    }

    #[test]
    fn zero_sized_pool_is_rejected() {
        assert!(matches!(
            BufferPool::new(port(), 0, 1024),
            Err(PipelineError::ResourceExhausted(_))
        ));
        assert!(BufferPool::new(port(), 3, 0).is_err());
    }

    #[test]
    fn buffers_come_out_in_fifo_order() {
        let pool = BufferPool::new(port(), 3, 16).unwrap();
        let a = pool.get().unwrap();
        let b = pool.get().unwrap();
        assert_eq!((a.id(), b.id()), (0, 1));
        pool.release(a).unwrap();
        let c = pool.get().unwrap();
        assert_eq!(c.id(), 2);
        let d = pool.get().unwrap();
        assert_eq!(d.id(), 0);
        assert!(pool.get().is_none());
    }

    #[test]
    fn conservation_holds_across_many_cycles() {
        let pool = BufferPool::new(port(), 4, 16).unwrap();
        let mut held = Vec::new();
        for round in 0..100 {
            if round % 3 == 0 {
                if let Some(buf) = held.pop() {
                    pool.release(buf).unwrap();
                }
            } else if let Some(buf) = pool.get() {
                held.push(buf);
            }
            let stats = pool.stats();
            assert!(stats.is_conserved());
            assert_eq!(stats.in_flight, held.len());
        }
        for buf in held {
            pool.release(buf).unwrap();
        }
        assert_eq!(pool.available(), 4);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn foreign_buffer_is_handed_back() {
        let pool = BufferPool::new(port(), 2, 16).unwrap();
        let other = BufferPool::new(port(), 2, 16).unwrap();
        let foreign = other.get().unwrap();

        let rejected = pool.release(foreign).unwrap_err();
        assert!(matches!(rejected.error, PipelineError::InvalidArgument(_)));
        assert_eq!(pool.available(), 2);

        other.release(rejected.buffer).unwrap();
        assert_eq!(other.available(), 2);
    }

    #[test]
    fn buffer_not_on_loan_is_rejected() {
        let pool = BufferPool::new(port(), 2, 16).unwrap();
        let impostor = Buffer::new(0, pool.id(), 16);
        let rejected = pool.release(impostor).unwrap_err();
        assert!(matches!(rejected.error, PipelineError::InvalidState(_)));
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn released_buffer_is_reset() {
        let pool = BufferPool::new(port(), 1, 8).unwrap();
        let mut buf = pool.get().unwrap();
        buf.fill(b"DATA");
        pool.release(buf).unwrap();
        let buf = pool.get().unwrap();
        assert_eq!(buf.length, 0);
        assert!(buf.payload().is_empty());
    }

    #[test]
    fn clones_share_the_queue() {
        let pool = BufferPool::new(port(), 2, 8).unwrap();
        let handle = pool.clone();
        let buf = handle.get().unwrap();
        assert_eq!(pool.in_flight(), 1);
        pool.release(buf).unwrap();
        assert_eq!(handle.available(), 2);
    }
}
