use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::models::error::PipelineError;
use crate::models::frame::Frame;
use crate::traits::frame_sink::FrameSink;

/// Sends frames to a TCP receiver.
///
/// ## Wire Format
///
/// ```text
/// [4-byte BE payload length][payload]
/// [4-byte BE payload length][payload]
/// ...
/// ```
pub struct StreamSink {
    address: String,
    connect_timeout: Option<Duration>,
    stream: Option<TcpStream>,
    frames_sent: u64,
}

impl StreamSink {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: None,
            stream: None,
            frames_sent: 0,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    fn connect(&self) -> Result<TcpStream, PipelineError> {
        let failed = |e: io::Error| {
            PipelineError::Storage(format!("failed to connect to {}: {}", self.address, e))
        };
        let Some(timeout) = self.connect_timeout else {
            return TcpStream::connect(&self.address).map_err(failed);
        };

        let mut last_error = io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing");
        for addr in self.address.to_socket_addrs().map_err(failed)? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = e,
            }
        }
        Err(failed(last_error))
    }
}

impl FrameSink for StreamSink {
    fn open(&mut self) -> Result<(), PipelineError> {
        if self.stream.is_some() {
            self.close()?;
        }
        let stream = self.connect()?;
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("failed to set TCP_NODELAY on {}: {}", self.address, e);
        }
        self.stream = Some(stream);
        self.frames_sent = 0;
        log::info!("streaming frames to {}", self.address);
        Ok(())
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PipelineError::Storage("stream is not connected".into()))?;
        let length = u32::try_from(frame.data.len()).map_err(|_| {
            PipelineError::Storage(format!("frame of {} bytes is too large to send", frame.data.len()))
        })?;
        stream
            .write_all(&length.to_be_bytes())
            .and_then(|()| stream.write_all(&frame.data))
            .map_err(|e| PipelineError::Storage(format!("send to {} failed: {}", self.address, e)))?;
        self.frames_sent += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        let flushed = stream.flush();
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            log::debug!("shutdown of {} failed: {}", self.address, e);
        }
        log::info!("closed stream to {} after {} frames", self.address, self.frames_sent);
        flushed.map_err(|e| PipelineError::Storage(format!("flush failed: {}", e)))
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// Largest payload [`read_frame`] accepts.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Read one length-prefixed frame. `Ok(None)` on a clean end of stream,
/// `UnexpectedEof` when the stream ends inside a header or payload.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {} header bytes", filled),
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN),
        ));
    }
    let mut payload = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut payload)?;
    if payload.len() < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("stream ended after {} of {} payload bytes", payload.len(), len),
        ));
    }
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    use crate::models::format::Encoding;
    use crate::models::frame::FrameInfo;

    fn frame(data: &[u8]) -> Frame {
        let info = FrameInfo {
            width: 640,
            height: 480,
            encoding: Encoding::Jpeg,
        };
        Frame::new(data.to_vec(), info, 0, None)
    }

    #[test]
    fn frames_are_length_prefixed_big_endian() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let receiver = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            socket.read_to_end(&mut raw).unwrap();
            raw
        });

        let mut sink = StreamSink::new(address).with_connect_timeout(Duration::from_secs(5));
        sink.open().unwrap();
        sink.write_frame(&frame(b"hello")).unwrap();
        sink.write_frame(&frame(&[7u8; 300])).unwrap();
        sink.close().unwrap();

        let raw = receiver.join().unwrap();
        assert_eq!(&raw[..4], &[0, 0, 0, 5]);
        assert_eq!(&raw[4..9], b"hello");
        assert_eq!(&raw[9..13], &[0, 0, 1, 44]);

        let mut cursor = io::Cursor::new(raw);
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), b"hello");
        assert_eq!(read_frame(&mut cursor).unwrap().unwrap(), vec![7u8; 300]);
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn close_without_open_is_a_no_op() {
        let mut sink = StreamSink::new("127.0.0.1:9");
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(!sink.is_open());
    }

    #[test]
    fn write_without_connection_fails() {
        let mut sink = StreamSink::new("127.0.0.1:9");
        assert!(matches!(
            sink.write_frame(&frame(b"x")),
            Err(PipelineError::Storage(_))
        ));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut cursor = io::Cursor::new(vec![0, 0, 0, 10, 1, 2]);
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn truncated_header_is_not_end_of_stream() {
        let mut cursor = io::Cursor::new(vec![0, 0]);
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let mut empty = io::Cursor::new(Vec::new());
        assert!(read_frame(&mut empty).unwrap().is_none());
    }

    #[test]
    fn oversized_length_is_rejected_before_reading() {
        let mut cursor = io::Cursor::new(vec![0xff, 0xff, 0xff, 0xff, 1, 2, 3]);
        let err = read_frame(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn reopening_starts_a_new_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let receiver = thread::spawn(move || {
            let mut received = Vec::new();
            for _ in 0..2 {
                let (mut socket, _) = listener.accept().unwrap();
                let mut raw = Vec::new();
                socket.read_to_end(&mut raw).unwrap();
                received.push(raw);
            }
            received
        });

        let mut sink = StreamSink::new(address).with_connect_timeout(Duration::from_secs(5));
        sink.open().unwrap();
        sink.write_frame(&frame(b"one")).unwrap();
        sink.open().unwrap();
        assert!(sink.is_open());
        assert_eq!(sink.frames_sent(), 0);
        sink.write_frame(&frame(b"two")).unwrap();
        sink.close().unwrap();

        let received = receiver.join().unwrap();
        assert_eq!(received[0], [0, 0, 0, 3, b'o', b'n', b'e']);
        assert_eq!(received[1], [0, 0, 0, 3, b't', b'w', b'o']);
    }
}
