//! Framed message channel over an async byte stream.

use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::codec::{FrameConfig, HEADER_LEN};
use crate::error::ChannelError;
use crate::message::Message;

type Reader = Box<dyn AsyncRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Reads and writes whole messages over one connection.
///
/// A short read at any point is reported as `ChannelError::Closed`: the
/// peer is gone, not sending garbage.
pub struct FramedChannel {
    reader: Reader,
    writer: Writer,
    config: FrameConfig,
    closed: bool,
}

impl std::fmt::Debug for FramedChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedChannel")
            .field("config", &self.config)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl FramedChannel {
    /// Wrap a bidirectional stream.
    pub fn new<S>(stream: S, config: FrameConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer, config)
    }

    /// Wrap separate read and write halves.
    pub fn from_parts<R, W>(reader: R, writer: W, config: FrameConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            config,
            closed: false,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &FrameConfig {
        &self.config
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// `Frame` errors leave the channel usable. I/O failures close it.
    pub async fn send(&mut self, message: &Message) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        let frame = self.config.encode(message)?;
        trace!(cm = %message.cm, len = frame.len(), "Sending frame");

        let result = async {
            self.writer.write_all(&frame).await?;
            self.writer.flush().await
        }
        .await;
        result.map_err(|e| self.fail(e))
    }

    /// Receive one message.
    ///
    /// # Errors
    ///
    /// Returns `ChannelError::Closed` when the peer hangs up, including
    /// mid-frame.
    pub async fn recv(&mut self) -> Result<Message, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        let mut header = [0_u8; HEADER_LEN];
        if let Err(e) = self.reader.read_exact(&mut header).await {
            return Err(self.fail(e));
        }
        let size = match self.config.check_prefix(header) {
            Ok(size) => size,
            Err(e) => {
                // The stream position is lost once a frame is skipped.
                self.closed = true;
                return Err(e.into());
            }
        };

        let mut payload = vec![0_u8; size];
        if let Err(e) = self.reader.read_exact(&mut payload).await {
            return Err(self.fail(e));
        }
        let message = self.config.decode(&payload)?;
        trace!(cm = %message.cm, len = size, "Received frame");
        Ok(message)
    }

    /// Shut down the write half. Further sends fail with `Closed`.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.writer.shutdown().await {
            debug!(error = %e, "Channel shutdown failed");
        }
    }

    fn fail(&mut self, error: std::io::Error) -> ChannelError {
        self.closed = true;
        match error.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted => {
                debug!(error = %error, "Peer closed channel");
                ChannelError::Closed
            }
            _ => ChannelError::Io(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FrameError;
    use crate::message::Command;
    use pybridge_core::Primitive;

    fn pair(config: FrameConfig) -> (FramedChannel, FramedChannel) {
        let (a, b) = tokio::io::duplex(4096);
        (FramedChannel::new(a, config), FramedChannel::new(b, config))
    }

    #[tokio::test]
    async fn test_send_and_recv() {
        let (mut host, mut child) = pair(FrameConfig::default());

        host.send(&Message::eval("1+2")).await.unwrap();
        let received = child.recv().await.unwrap();
        assert_eq!(received.cm, Command::Eval);
        assert_eq!(received.data_str(), Some("1+2"));

        child
            .send(&Message::new(Command::Res).with_data(Primitive::Int(3)))
            .await
            .unwrap();
        let reply = host.recv().await.unwrap();
        assert_eq!(reply.cm, Command::Res);
        assert_eq!(reply.data().as_i64(), Some(3));
    }

    #[tokio::test]
    async fn test_frame_split_across_reads() {
        let config = FrameConfig::default();
        let frame = config.encode(&Message::eval("1+2")).unwrap();
        let reader = tokio_test::io::Builder::new()
            .read(&frame[..2])
            .read(&frame[2..7])
            .read(&frame[7..])
            .build();
        let mut channel = FramedChannel::from_parts(reader, tokio::io::sink(), config);
        let message = channel.recv().await.unwrap();
        assert_eq!(message.data_str(), Some("1+2"));
    }

    #[tokio::test]
    async fn test_send_writes_one_prefixed_frame() {
        let config = FrameConfig::default();
        let frame = config.encode(&Message::new(Command::Done)).unwrap();
        let len = u32::try_from(frame.len() - HEADER_LEN).unwrap();
        assert_eq!(&frame[..HEADER_LEN], &len.to_le_bytes());
        let writer = tokio_test::io::Builder::new().write(&frame).build();
        let mut channel = FramedChannel::from_parts(tokio::io::empty(), writer, config);
        channel.send(&Message::new(Command::Done)).await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_drop_reads_as_closed() {
        let (mut host, child) = pair(FrameConfig::default());
        drop(child);
        assert!(matches!(host.recv().await, Err(ChannelError::Closed)));
        assert!(host.is_closed());
        assert!(matches!(
            host.send(&Message::exec("pass")).await,
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_short_frame_reads_as_closed() {
        let (a, mut raw) = tokio::io::duplex(64);
        let mut host = FramedChannel::new(a, FrameConfig::default());
        raw.write_all(&10_u32.to_le_bytes()).await.unwrap();
        raw.write_all(&[0x80, 0x81]).await.unwrap();
        drop(raw);
        assert!(matches!(host.recv().await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn test_oversized_send_keeps_channel_open() {
        let (mut host, mut child) = pair(FrameConfig::default().with_max_payload(32));
        let err = host
            .send(&Message::exec("x".repeat(100)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ChannelError::Frame(FrameError::PayloadTooLarge { .. })
        ));
        assert!(err.is_recoverable());
        assert!(!host.is_closed());

        host.send(&Message::new(Command::Done)).await.unwrap();
        assert_eq!(child.recv().await.unwrap().cm, Command::Done);
    }
}
