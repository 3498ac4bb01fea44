// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framed connection halves used by both ends of an invocation.

use super::protocol::{self, Frame, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Reading half of a framed connection.
pub struct FramedReader<R> {
    inner: R,
    max_message_size: usize,
    read_buffer: Vec<u8>,
}

/// Writing half of a framed connection.
pub struct FramedWriter<W> {
    inner: W,
    max_message_size: usize,
}

/// Split a TCP stream into framed halves.
pub fn split(
    stream: TcpStream,
    max_message_size: usize,
) -> (FramedReader<OwnedReadHalf>, FramedWriter<OwnedWriteHalf>) {
    let (read, write) = stream.into_split();
    (
        FramedReader::new(read, max_message_size),
        FramedWriter::new(write, max_message_size),
    )
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(inner: R, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` if the peer closed the connection between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ConnectionError> {
        // Read length prefix (4 bytes, big-endian). EOF is a clean close only
        // before its first byte.
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            let n = self.inner.read(&mut len_buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(ConnectionError::Protocol(format!(
                    "connection closed after {} of 4 length bytes",
                    filled
                )));
            }
            filled += n;
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        protocol::check_len(len, self.max_message_size)?;

        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);

        self.inner
            .read_exact(&mut self.read_buffer)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        Ok(Some(protocol::decode(&self.read_buffer)?))
    }
}

impl<W: AsyncWrite + Unpin> FramedWriter<W> {
    pub fn new(inner: W, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
        }
    }

    /// Write one frame and flush it.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), ConnectionError> {
        let body = protocol::encode(frame, self.max_message_size)?;

        // Length fits: check_len bounds it by max_message_size.
        let len = body.len() as u32;
        self.inner.write_all(&len.to_be_bytes()).await?;
        self.inner.write_all(&body).await?;
        self.inner.flush().await?;

        Ok(())
    }

    /// Shut down the write direction.
    pub async fn shutdown(&mut self) -> Result<(), ConnectionError> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))
    }
}

/// Connection error types.
#[derive(Debug)]
pub enum ConnectionError {
    Io(String),
    Protocol(String),
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(s) => write!(f, "I/O error: {}", s),
            Self::Protocol(s) => write!(f, "Protocol error: {}", s),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<ProtocolError> for ConnectionError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e.to_string())
    }
}

impl From<std::io::Error> for ConnectionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
