//! Buffered, byte-exact I/O for the RFB wire protocol.
//!
//! Every read either yields exactly the requested number of bytes or fails
//! with [`std::io::ErrorKind::UnexpectedEof`]; callers never see partial data.
//! All multi-byte integers are big-endian (network byte order).
//!
//! Writes are staged in memory and only reach the socket on
//! [`RfbOutStream::flush`], so one RFB message maps to one `write_all`.
//!
//! # Examples
//!
//! ```no_run
//! use rfb_protocol::io::{RfbInStream, RfbOutStream};
//!
//! # async fn example(socket: tokio::net::TcpStream) -> std::io::Result<()> {
//! let (reader, writer) = socket.into_split();
//! let mut input = RfbInStream::new(reader);
//! let mut output = RfbOutStream::new(writer);
//!
//! let message_type = input.read_u8().await?;
//! output.write_u8(3);
//! output.flush().await?;
//! # let _ = message_type;
//! # Ok(())
//! # }
//! ```

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound accepted for length-prefixed strings (reason text, desktop
/// name, cut text). Anything larger is treated as a corrupt stream.
pub const MAX_STRING_LENGTH: usize = 16 * 1024 * 1024;

/// Largest step [`RfbInStream::read_vec`] buffers at a time.
pub const READ_CHUNK: usize = 64 * 1024;

/// Buffered input stream reading RFB primitives in network byte order.
pub struct RfbInStream<R> {
    reader: R,
    buffer: BytesMut,
    total_read: u64,
}

impl<R: AsyncRead + Unpin> RfbInStream<R> {
    /// Create a new input stream with an 8KB buffer.
    pub fn new(reader: R) -> Self {
        Self::with_capacity(reader, 8192)
    }

    pub fn with_capacity(reader: R, capacity: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(capacity),
            total_read: 0,
        }
    }

    /// Fill the buffer until at least `n` bytes are present.
    async fn ensure_bytes(&mut self, n: usize) -> std::io::Result<()> {
        if self.buffer.len() < n {
            self.buffer.reserve(n - self.buffer.len());
        }
        while self.buffer.len() < n {
            let bytes_read = self.reader.read_buf(&mut self.buffer).await?;
            if bytes_read == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "connection closed: expected {} bytes, got {}",
                        n,
                        self.buffer.len()
                    ),
                ));
            }
        }
        Ok(())
    }

    pub async fn read_u8(&mut self) -> std::io::Result<u8> {
        self.ensure_bytes(1).await?;
        self.total_read += 1;
        Ok(self.buffer.get_u8())
    }

    pub async fn read_u16(&mut self) -> std::io::Result<u16> {
        self.ensure_bytes(2).await?;
        self.total_read += 2;
        Ok(self.buffer.get_u16())
    }

    pub async fn read_u32(&mut self) -> std::io::Result<u32> {
        self.ensure_bytes(4).await?;
        self.total_read += 4;
        Ok(self.buffer.get_u32())
    }

    pub async fn read_i32(&mut self) -> std::io::Result<i32> {
        self.ensure_bytes(4).await?;
        self.total_read += 4;
        Ok(self.buffer.get_i32())
    }

    /// Read exactly `buf.len()` bytes.
    pub async fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.ensure_bytes(buf.len()).await?;
        self.total_read += buf.len() as u64;
        self.buffer.copy_to_slice(buf);
        Ok(())
    }

    /// Read exactly `len` bytes into a freshly allocated vector.
    ///
    /// The vector grows in [`READ_CHUNK`] steps as bytes arrive, so a bogus
    /// length from the peer costs at most one chunk before the stream ends.
    pub async fn read_vec(&mut self, len: usize) -> std::io::Result<Vec<u8>> {
        let mut data = Vec::with_capacity(len.min(READ_CHUNK));
        while data.len() < len {
            let step = (len - data.len()).min(READ_CHUNK);
            self.ensure_bytes(step).await?;
            data.extend_from_slice(&self.buffer[..step]);
            self.buffer.advance(step);
            self.total_read += step as u64;
        }
        Ok(data)
    }

    /// Read a u32 length followed by that many bytes of text.
    ///
    /// RFB strings are Latin-1 in practice; invalid UTF-8 is replaced rather
    /// than rejected so a server's reason text always reaches the log.
    pub async fn read_string(&mut self) -> std::io::Result<String> {
        let len = self.read_u32().await? as usize;
        if len > MAX_STRING_LENGTH {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("string length {} exceeds limit {}", len, MAX_STRING_LENGTH),
            ));
        }
        let data = self.read_vec(len).await?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    pub async fn skip(&mut self, n: usize) -> std::io::Result<()> {
        self.ensure_bytes(n).await?;
        self.total_read += n as u64;
        self.buffer.advance(n);
        Ok(())
    }

    /// Bytes already buffered and readable without I/O.
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    /// Total bytes consumed by callers since the stream was created.
    pub fn total_read(&self) -> u64 {
        self.total_read
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Buffered output stream writing RFB primitives in network byte order.
///
/// Nothing is sent until [`flush`](Self::flush) is awaited.
pub struct RfbOutStream<W> {
    writer: W,
    buffer: BytesMut,
}

impl<W: AsyncWrite + Unpin> RfbOutStream<W> {
    pub fn new(writer: W) -> Self {
        Self::with_capacity(writer, 1024)
    }

    pub fn with_capacity(writer: W, capacity: usize) -> Self {
        Self {
            writer,
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.put_u8(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.put_u16(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.put_u32(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.put_i32(value);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Send everything staged so far. A partial write is an error.
    pub async fn flush(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer).await?;
            self.buffer.clear();
        }
        self.writer.flush().await
    }

    /// Number of staged bytes not yet flushed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_read_big_endian_primitives() {
        let data = vec![42u8, 0x12, 0x34, 0x12, 0x34, 0x56, 0x78, 0xFF, 0xFF, 0xFF, 0xFE];
        let mut stream = RfbInStream::new(Cursor::new(data));

        assert_eq!(stream.read_u8().await.unwrap(), 42);
        assert_eq!(stream.read_u16().await.unwrap(), 0x1234);
        assert_eq!(stream.read_u32().await.unwrap(), 0x12345678);
        assert_eq!(stream.read_i32().await.unwrap(), -2);
        assert_eq!(stream.total_read(), 11);
    }

    #[tokio::test]
    async fn test_read_bytes_and_skip() {
        let mut stream = RfbInStream::new(Cursor::new(vec![1, 2, 3, 4, 5, 6]));

        let mut buf = [0u8; 2];
        stream.read_bytes(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2]);
        stream.skip(2).await.unwrap();
        assert_eq!(stream.read_vec(2).await.unwrap(), vec![5, 6]);
    }

    #[tokio::test]
    async fn test_short_read_is_eof_error() {
        let mut stream = RfbInStream::new(Cursor::new(vec![1, 2, 3]));

        let mut buf = [0u8; 4];
        let err = stream.read_bytes(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_large_read_spans_refills() {
        let data: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
        let mut stream = RfbInStream::with_capacity(Cursor::new(data.clone()), 16);

        let out = stream.read_vec(data.len()).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_read_vec_with_absurd_length_fails_at_eof() {
        let mut stream = RfbInStream::new(Cursor::new(vec![7u8; 100]));

        let err = stream.read_vec(u32::MAX as usize).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_string() {
        let mut data = vec![0, 0, 0, 5];
        data.extend_from_slice(b"hello");
        let mut stream = RfbInStream::new(Cursor::new(data));

        assert_eq!(stream.read_string().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_read_string_rejects_absurd_length() {
        let mut stream = RfbInStream::new(Cursor::new(vec![0xFF, 0xFF, 0xFF, 0xFF]));

        let err = stream.read_string().await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_writes_are_staged_until_flush() {
        let mut buffer = Vec::new();
        let mut stream = RfbOutStream::new(&mut buffer);

        stream.write_u8(3);
        stream.write_u16(0xABCD);
        stream.write_u32(0x01020304);
        stream.write_i32(-239);
        stream.write_bytes(b"ok");
        assert_eq!(stream.buffered(), 13);
        stream.flush().await.unwrap();
        assert_eq!(stream.buffered(), 0);

        assert_eq!(
            buffer,
            vec![3, 0xAB, 0xCD, 1, 2, 3, 4, 0xFF, 0xFF, 0xFF, 0x11, b'o', b'k']
        );
    }
}
