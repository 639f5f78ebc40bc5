//! Demultiplexing of the combined output channel
//!
//! Without a TTY the container runtime sends stdout and stderr over one
//! channel. Every frame starts with an 8-byte header: a stream selector byte,
//! three zero bytes, and the payload length as a big-endian `u32`.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Size of the frame header preceding every payload
pub const HEADER_LEN: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DemuxError {
    #[error("unknown stream selector {0}")]
    UnknownStream(u8),

    #[error("stream ended inside a frame ({0} bytes left over)")]
    Truncated(usize),

    #[error("payload of {0} bytes does not fit a frame header")]
    PayloadTooLarge(usize),
}

/// Which stream a frame belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Echoed stdin, delivered on stdout by convention
    Stdin,
    Stdout,
    Stderr,
}

impl StreamKind {
    /// Classify a header's stream selector byte
    pub fn from_selector(selector: u8) -> Result<Self, DemuxError> {
        match selector {
            0 => Ok(StreamKind::Stdin),
            1 => Ok(StreamKind::Stdout),
            2 => Ok(StreamKind::Stderr),
            other => Err(DemuxError::UnknownStream(other)),
        }
    }

    pub fn selector(self) -> u8 {
        match self {
            StreamKind::Stdin => 0,
            StreamKind::Stdout => 1,
            StreamKind::Stderr => 2,
        }
    }
}

/// One payload from the combined channel, header already stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub stream: StreamKind,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(stream: StreamKind, payload: impl Into<Bytes>) -> Self {
        Self {
            stream,
            payload: payload.into(),
        }
    }

    pub fn stdout(payload: impl Into<Bytes>) -> Self {
        Self::new(StreamKind::Stdout, payload)
    }

    pub fn stderr(payload: impl Into<Bytes>) -> Self {
        Self::new(StreamKind::Stderr, payload)
    }

    /// Encode the frame with its header, as it travels on the wire
    pub fn encode(&self) -> Result<Vec<u8>, DemuxError> {
        let header = encode_header(self.stream, self.payload.len())?;
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// Header for a payload of `len` bytes; the length field is a `u32`
fn encode_header(stream: StreamKind, len: usize) -> Result<[u8; HEADER_LEN], DemuxError> {
    let len = u32::try_from(len).map_err(|_| DemuxError::PayloadTooLarge(len))?;
    let [a, b, c, d] = len.to_be_bytes();
    Ok([stream.selector(), 0, 0, 0, a, b, c, d])
}

/// Incremental decoder for raw multiplexed bytes
///
/// Chunks may split frames anywhere; complete frames are yielded as soon as
/// their last byte arrives.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw bytes
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Take the next complete frame, if one is buffered
    pub fn next_frame(&mut self) -> Result<Option<Frame>, DemuxError> {
        if self.buffer.len() < HEADER_LEN {
            return Ok(None);
        }

        let stream = StreamKind::from_selector(self.buffer[0])?;
        let len = u32::from_be_bytes([
            self.buffer[4],
            self.buffer[5],
            self.buffer[6],
            self.buffer[7],
        ]) as usize;

        if self.buffer.len() < HEADER_LEN + len {
            return Ok(None);
        }

        self.buffer.advance(HEADER_LEN);
        let payload = self.buffer.split_to(len).freeze();
        Ok(Some(Frame { stream, payload }))
    }

    /// Signal end of input; fails if a partial frame is left over
    pub fn finish(self) -> Result<(), DemuxError> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(DemuxError::Truncated(self.buffer.len()))
        }
    }
}

/// The two growing output buffers of one execution
#[derive(Debug, Default)]
pub struct OutputBuffers {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl OutputBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame's payload to the buffer of its stream
    pub fn push(&mut self, frame: &Frame) {
        match frame.stream {
            StreamKind::Stdin | StreamKind::Stdout => self.stdout.extend_from_slice(&frame.payload),
            StreamKind::Stderr => self.stderr.extend_from_slice(&frame.payload),
        }
    }

    /// Demultiplex a complete raw capture of the combined channel
    pub fn from_raw(raw: &[u8]) -> Result<Self, DemuxError> {
        let mut decoder = FrameDecoder::new();
        let mut buffers = Self::new();
        decoder.push(raw);
        while let Some(frame) = decoder.next_frame()? {
            buffers.push(&frame);
        }
        decoder.finish()?;
        Ok(buffers)
    }

    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    /// Decode both buffers as UTF-8, replacing invalid sequences
    pub fn into_strings(self) -> (String, String) {
        (
            String::from_utf8_lossy(&self.stdout).into_owned(),
            String::from_utf8_lossy(&self.stderr).into_owned(),
        )
    }
}
