//! Length-prefixed framing for TCP streams
//!
//! ```text
//! +-------------------+--------------------+
//! | length (4 bytes)  |   payload          |
//! | u32 little-endian |   (length bytes)   |
//! +-------------------+--------------------+
//! ```
//!
//! The length does not include the prefix itself. A zero length is a valid, empty payload.

use std::{collections::VecDeque, io, time::Duration};

use byteorder::{ByteOrder, LE};
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const LENGTH_PREFIX: usize = 4;

/// Limits enforced while reassembling frames
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest declared payload length accepted. Default: 1 MiB.
    pub max_message_size: u32,
    /// Largest amount of unframed data held between reads. Default: 4 MiB.
    pub max_buffered: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1 << 20,
            max_buffered: 4 << 20,
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("declared message length {size} exceeds maximum {max}")]
    MessageTooLarge { size: u32, max: u32 },
    #[error("{buffered} unframed bytes exceeds maximum {max}")]
    BufferOverflow { buffered: usize, max: usize },
    #[error("peer idle for {0:?}")]
    TimedOut(Duration),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Whether the peer broke the framing contract, as opposed to the transport failing
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FrameError::MessageTooLarge { .. } | FrameError::BufferOverflow { .. }
        )
    }
}

/// Splits an arbitrarily chunked byte stream into complete payloads
#[derive(Debug)]
pub struct FrameReader {
    buffer: BytesMut,
    config: FrameConfig,
}

impl FrameReader {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            config,
        }
    }

    /// Number of bytes held that don't yet form a complete frame
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Append `chunk` and return every payload it completes, in order
    ///
    /// An error means the peer violated the configured limits; the reader should be discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>, FrameError> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while self.buffer.len() >= LENGTH_PREFIX {
            let len = LE::read_u32(&self.buffer[..LENGTH_PREFIX]);
            if len > self.config.max_message_size {
                return Err(FrameError::MessageTooLarge {
                    size: len,
                    max: self.config.max_message_size,
                });
            }
            let total = LENGTH_PREFIX + len as usize;
            if self.buffer.len() < total {
                break;
            }
            let mut frame = self.buffer.split_to(total);
            out.push(frame.split_off(LENGTH_PREFIX).freeze());
        }
        if self.buffer.len() > self.config.max_buffered {
            return Err(FrameError::BufferOverflow {
                buffered: self.buffer.len(),
                max: self.config.max_buffered,
            });
        }
        Ok(out)
    }
}

/// Prefix `payload` with its length
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX + payload.len());
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// A byte stream carrying length-prefixed payloads in both directions
pub struct FrameStream<S> {
    io: S,
    reader: FrameReader,
    ready: VecDeque<Bytes>,
    read_buf: Box<[u8]>,
    idle_timeout: Option<Duration>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FrameStream<S> {
    pub fn new(io: S, config: FrameConfig) -> Self {
        Self {
            io,
            reader: FrameReader::new(config),
            ready: VecDeque::new(),
            read_buf: vec![0; 8192].into_boxed_slice(),
            idle_timeout: None,
        }
    }

    /// Fail reads with [`FrameError::TimedOut`] when the peer sends nothing for `timeout`
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn get_ref(&self) -> &S {
        &self.io
    }

    /// Receive the next payload, or `None` if the peer closed the stream
    ///
    /// Cancel-safe: bytes already read are kept for the next call.
    pub async fn recv(&mut self) -> Result<Option<Bytes>, FrameError> {
        loop {
            if let Some(payload) = self.ready.pop_front() {
                return Ok(Some(payload));
            }
            let n = match self.idle_timeout {
                Some(timeout) => tokio::time::timeout(timeout, self.io.read(&mut self.read_buf))
                    .await
                    .map_err(|_| FrameError::TimedOut(timeout))??,
                None => self.io.read(&mut self.read_buf).await?,
            };
            if n == 0 {
                return Ok(None);
            }
            self.ready.extend(self.reader.feed(&self.read_buf[..n])?);
        }
    }

    /// Send one payload as a single frame
    ///
    /// With an idle timeout set, a peer that stops reading for that long fails the write with
    /// [`FrameError::TimedOut`].
    pub async fn send(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let frame = encode_frame(payload);
        let io = &mut self.io;
        let write = async move {
            io.write_all(&frame).await?;
            io.flush().await
        };
        match self.idle_timeout {
            Some(timeout) => tokio::time::timeout(timeout, write)
                .await
                .map_err(|_| FrameError::TimedOut(timeout))??,
            None => write.await?,
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.io.shutdown().await
    }
}
