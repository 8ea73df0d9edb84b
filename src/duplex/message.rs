use std::io;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use super::{Chunk, Duplex, Inbox, Latch};
use crate::error::WebSocketError;

/// Instructions for the side that owns the actual message socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send one message carrying these bytes.
    Data(Vec<u8>),
    /// Send a close frame and stop.
    Close,
}

/// Message-socket end of a [`MessageConn`]: received messages go into
/// `inbound`, messages to send come out of `outbound`.
#[derive(Debug)]
pub struct MessagePort {
    pub inbound: mpsc::UnboundedSender<Chunk>,
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
}

/// Byte-stream view of a message-based (upgraded) connection.
pub struct MessageConn {
    inbox: Mutex<Inbox>,
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: Latch,
}

impl MessageConn {
    pub fn channel() -> (Self, MessagePort) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let conn = Self {
            inbox: Mutex::new(Inbox::new(inbound_rx)),
            outbound: outbound_tx,
            closed: Latch::new(),
        };
        let port = MessagePort {
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        (conn, port)
    }
}

#[async_trait]
impl Duplex for MessageConn {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut closed = self.closed.waiter();
        let mut inbox = self.inbox.lock().await;
        let res = tokio::select! {
            biased;
            _ = closed.wait() => Ok(0),
            res = inbox.read(buf) => res,
        };
        if let Err(e) = &res {
            warn!("Read err: {}", e);
        }
        res
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.is_released() {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.outbound
            .send(Outbound::Data(buf.to_vec()))
            .map_err(|_| {
                let err = WebSocketError::SendError("connection is gone".to_string());
                warn!("Write err: {}", err);
                io::Error::from(err)
            })?;
        Ok(buf.len())
    }

    async fn close(&self) -> io::Result<()> {
        if !self.closed.release() {
            return Ok(());
        }
        debug!("conn close");
        // the socket may already be gone; nothing left to tell it then
        let _ = self.outbound.send(Outbound::Close);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_each_write_is_one_message() {
        let (conn, mut port) = MessageConn::channel();

        conn.write_all(b"Waiting for partner...\n").await.unwrap();
        conn.write_all(b"hi").await.unwrap();

        assert_eq!(
            port.outbound.recv().await,
            Some(Outbound::Data(b"Waiting for partner...\n".to_vec()))
        );
        assert_eq!(port.outbound.recv().await, Some(Outbound::Data(b"hi".to_vec())));
    }

    #[tokio::test]
    async fn test_large_message_is_not_truncated() {
        let (conn, port) = MessageConn::channel();
        let message = vec![b'x'; 100];
        port.inbound.send(Ok(message.clone())).unwrap();
        drop(port);

        let mut buf = [0u8; 30];
        let mut received = Vec::new();
        loop {
            let n = conn.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn test_close_sends_one_close_frame() {
        let (conn, mut port) = MessageConn::channel();

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        drop(conn);

        assert_eq!(port.outbound.recv().await, Some(Outbound::Close));
        assert_eq!(port.outbound.recv().await, None);
    }

    #[tokio::test]
    async fn test_write_fails_once_socket_is_gone() {
        let (conn, port) = MessageConn::channel();
        drop(port);

        let err = conn.write(b"anyone?").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_protocol_error_reaches_reader() {
        let (conn, port) = MessageConn::channel();
        port.inbound
            .send(Err(io::Error::new(io::ErrorKind::InvalidData, "bad frame")))
            .unwrap();

        let mut buf = [0u8; 8];
        let err = conn.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
