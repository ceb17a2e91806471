use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::models::error::PipelineError;

/// Per-buffer flag set reported by the device on completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: Self = Self(0);
    pub const EOS: Self = Self(1 << 0);
    pub const FRAME_START: Self = Self(1 << 1);
    pub const FRAME_END: Self = Self(1 << 2);
    /// Shorthand for a frame carried in a single buffer.
    pub const FRAME: Self = Self(Self::FRAME_START.0 | Self::FRAME_END.0);
    pub const KEYFRAME: Self = Self(1 << 3);
    pub const CONFIG: Self = Self(1 << 5);
    pub const CODEC_SIDE_INFO: Self = Self(1 << 7);
    pub const CORRUPTED: Self = Self(1 << 10);
    pub const TRANSMISSION_FAILED: Self = Self(1 << 11);
    pub const NAL_END: Self = Self(1 << 12);

    const NAMES: [(BufferFlags, &'static str); 9] = [
        (Self::EOS, "EOS"),
        (Self::FRAME_START, "FRAME_START"),
        (Self::FRAME_END, "FRAME_END"),
        (Self::KEYFRAME, "KEYFRAME"),
        (Self::CONFIG, "CONFIG"),
        (Self::CODEC_SIDE_INFO, "CODEC_SIDE_INFO"),
        (Self::CORRUPTED, "CORRUPTED"),
        (Self::TRANSMISSION_FAILED, "TRANSMISSION_FAILED"),
        (Self::NAL_END, "NAL_END"),
    ];

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BufferFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for BufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Fixed-capacity payload owned by a [`crate::BufferPool`].
///
/// Deliberately not `Clone`: a buffer lives in exactly one place at a time,
/// either queued in its pool, held by the device, or in a completion handler.
pub struct Buffer {
    id: u32,
    pool_id: u64,
    data: Vec<u8>,
    /// Valid bytes starting at `offset`.
    pub length: u32,
    pub offset: u32,
    pub flags: BufferFlags,
    /// Presentation timestamp in microseconds.
    pub pts: Option<i64>,
}

impl Buffer {
    pub(crate) fn new(id: u32, pool_id: u64, capacity: u32) -> Self {
        Self {
            id,
            pool_id,
            data: vec![0; capacity as usize],
            length: 0,
            offset: 0,
            flags: BufferFlags::NONE,
            pts: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn pool_id(&self) -> u64 {
        self.pool_id
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The valid bytes, `data[offset..offset + length]`, clamped to capacity.
    pub fn payload(&self) -> &[u8] {
        let start = (self.offset as usize).min(self.data.len());
        let end = start.saturating_add(self.length as usize).min(self.data.len());
        &self.data[start..end]
    }

    /// Copy as much of `bytes` as fits, resetting the offset. Returns the
    /// number of bytes taken.
    pub fn fill(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.data.len());
        self.data[..n].copy_from_slice(&bytes[..n]);
        self.offset = 0;
        self.length = n as u32;
        n
    }

    /// Clear everything but the identity, ready for the next use.
    pub(crate) fn reset(&mut self) {
        self.length = 0;
        self.offset = 0;
        self.flags = BufferFlags::NONE;
        self.pts = None;
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("pool_id", &self.pool_id)
            .field("capacity", &self.data.len())
            .field("length", &self.length)
            .field("offset", &self.offset)
            .field("flags", &format_args!("{}", self.flags))
            .field("pts", &self.pts)
            .finish()
    }
}

/// A buffer handed back by an operation that could not take it.
#[derive(Debug)]
pub struct RejectedBuffer {
    pub buffer: Buffer,
    pub error: PipelineError,
}

impl RejectedBuffer {
    pub fn new(buffer: Buffer, error: PipelineError) -> Self {
        Self { buffer, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_respects_offset_and_length() {
        let mut buf = Buffer::new(0, 1, 8);
        buf.fill(b"ABCDEFGH");
        buf.offset = 2;
        buf.length = 3;
        assert_eq!(buf.payload(), b"CDE");
    }

    #[test]
    fn payload_is_clamped_to_capacity() {
        let mut buf = Buffer::new(0, 1, 4);
        buf.fill(b"WXYZ");
        buf.offset = 2;
        buf.length = 100;
        assert_eq!(buf.payload(), b"YZ");
        buf.offset = 9;
        assert!(buf.payload().is_empty());
    }

    #[test]
    fn fill_truncates_to_capacity() {
        let mut buf = Buffer::new(0, 1, 3);
        assert_eq!(buf.fill(b"ABCDE"), 3);
        assert_eq!(buf.payload(), b"ABC");
    }

    #[test]
    fn flags_combine_and_display() {
        let flags = BufferFlags::FRAME_START | BufferFlags::FRAME_END;
        assert_eq!(flags, BufferFlags::FRAME);
        assert!(flags.contains(BufferFlags::FRAME_END));
        assert!(!flags.contains(BufferFlags::TRANSMISSION_FAILED));
        assert_eq!(flags.to_string(), "FRAME_START|FRAME_END");
        assert_eq!(BufferFlags::NONE.to_string(), "-");
    }

    #[test]
    fn reset_keeps_identity() {
        let mut buf = Buffer::new(5, 9, 4);
        buf.fill(b"AB");
        buf.flags = BufferFlags::FRAME_END;
        buf.pts = Some(10);
        buf.reset();
        assert_eq!((buf.id(), buf.pool_id()), (5, 9));
        assert_eq!(buf.length, 0);
        assert!(buf.flags.is_empty());
        assert!(buf.pts.is_none());
    }
}
