//! Byte transports carrying NETCONF messages.
//!
//! A session owns exactly one [`Transport`]. The transport moves raw bytes
//! only; framing is handled by [`crate::codec::FrameBuffer`].
//!
//! # Main Components
//!
//! - [`Transport`] - Async write/read/close boundary
//! - [`TransportWriter`] - Write half a transport can hand out so writes do
//!   not hold up reads
//! - [`StreamTransport`] - Any tokio byte stream (TCP, in-memory duplex)
//! - [`SshTransport`] - The `netconf` SSH subsystem

use async_trait::async_trait;
use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::error::NetconfError;

mod ssh;

pub use ssh::SshTransport;

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Bidirectional byte channel to a NETCONF server.
#[async_trait]
pub trait Transport: Send {
    /// Writes all of `bytes`.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), NetconfError>;

    /// Reads the next available bytes; `None` once the peer has closed.
    ///
    /// Must be cancel safe: the session I/O task polls it inside `select!`.
    async fn read(&mut self) -> Result<Option<Vec<u8>>, NetconfError>;

    /// Closes the write side and releases the channel.
    async fn close(&mut self) -> Result<(), NetconfError>;

    /// Hands out an independent write half, after which [`Transport::write`]
    /// is no longer used. Transports whose writes only enqueue (such as an
    /// SSH channel) keep the default and are written inline.
    fn split_writer(&mut self) -> Option<Box<dyn TransportWriter>> {
        None
    }
}

/// Write half detached from a [`Transport`].
#[async_trait]
pub trait TransportWriter: Send {
    /// Writes all of `bytes`.
    async fn write(&mut self, bytes: &[u8]) -> Result<(), NetconfError>;

    /// Closes the write direction.
    async fn close(&mut self) -> Result<(), NetconfError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), NetconfError> {
        (**self).write(bytes).await
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>, NetconfError> {
        (**self).read().await
    }

    async fn close(&mut self) -> Result<(), NetconfError> {
        (**self).close().await
    }

    fn split_writer(&mut self) -> Option<Box<dyn TransportWriter>> {
        (**self).split_writer()
    }
}

/// Transport over a tokio byte stream.
///
/// The stream is split on construction so the write half can be moved to
/// its own task with [`Transport::split_writer`].
pub struct StreamTransport<S> {
    reader: ReadHalf<S>,
    writer: Option<WriteHalf<S>>,
    buf: Vec<u8>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader,
            writer: Some(writer),
            buf: vec![0; READ_BUFFER_SIZE],
        }
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn write(&mut self, bytes: &[u8]) -> Result<(), NetconfError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| NetconfError::Transport("write half is detached".to_string()))?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>, NetconfError> {
        let n = self.reader.read(&mut self.buf).await?;
        if n == 0 {
            trace!("stream transport reached end of input");
            return Ok(None);
        }
        Ok(Some(self.buf[..n].to_vec()))
    }

    async fn close(&mut self) -> Result<(), NetconfError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.shutdown().await?;
        }
        Ok(())
    }

    fn split_writer(&mut self) -> Option<Box<dyn TransportWriter>> {
        let writer = self.writer.take()?;
        Some(Box::new(StreamWriter(writer)))
    }
}

struct StreamWriter<S>(WriteHalf<S>);

#[async_trait]
impl<S> TransportWriter for StreamWriter<S>
where
    S: AsyncWrite + Send + 'static,
{
    async fn write(&mut self, bytes: &[u8]) -> Result<(), NetconfError> {
        self.0.write_all(bytes).await?;
        self.0.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), NetconfError> {
        self.0.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_transport_moves_bytes_both_ways() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(client);

        transport.write(b"<hello/>").await.expect("write");
        let mut received = [0u8; 8];
        server.read_exact(&mut received).await.expect("server read");
        assert_eq!(&received, b"<hello/>");

        server.write_all(b"]]>]]>").await.expect("server write");
        let bytes = transport.read().await.expect("read").expect("bytes");
        assert_eq!(bytes, b"]]>]]>");
    }

    #[tokio::test]
    async fn split_writer_detaches_write_half() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport = StreamTransport::new(client);
        let mut writer = transport.split_writer().expect("write half");
        assert!(transport.split_writer().is_none());
        assert!(matches!(
            transport.write(b"x").await,
            Err(NetconfError::Transport(_))
        ));

        writer.write(b"<ok/>").await.expect("write");
        writer.close().await.expect("close");
        let mut received = Vec::new();
        server.read_to_end(&mut received).await.expect("server read");
        assert_eq!(received, b"<ok/>");

        server.write_all(b"]]>]]>").await.expect("server write");
        let bytes = transport.read().await.expect("read").expect("bytes");
        assert_eq!(bytes, b"]]>]]>");
    }

    #[tokio::test]
    async fn read_returns_none_after_peer_closes() {
        let (client, server) = tokio::io::duplex(64);
        let mut transport: Box<dyn Transport> = Box::new(StreamTransport::new(client));
        drop(server);
        assert!(transport.read().await.expect("read").is_none());
    }
}
