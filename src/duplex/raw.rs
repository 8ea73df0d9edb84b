use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::debug;

use super::{Duplex, Latch};

/// Byte-stream transport (TCP in production) used as-is.
pub struct RawSocket<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    closed: Latch,
}

impl<S> RawSocket<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: Latch::new(),
        }
    }
}

#[async_trait]
impl<S> Duplex for RawSocket<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut closed = self.closed.waiter();
        let mut reader = self.reader.lock().await;
        tokio::select! {
            biased;
            _ = closed.wait() => Ok(0),
            res = reader.read(buf) => res,
        }
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.is_released() {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.writer.lock().await.write(buf).await
    }

    async fn close(&self) -> io::Result<()> {
        if !self.closed.release() {
            return Ok(());
        }
        debug!("raw socket close");
        self.writer.lock().await.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_reads_and_writes_pass_through() {
        let mock = Builder::new()
            .read(b"hello")
            .write(b"world")
            .build();
        let socket = RawSocket::new(mock);

        let mut buf = [0u8; 16];
        let n = socket.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");

        socket.write_all(b"world").await.unwrap();
        socket.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_ends_pending_read() {
        let (_client, server) = tokio::io::duplex(64);
        let socket = std::sync::Arc::new(RawSocket::new(server));

        let reader = socket.clone();
        let pending = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            reader.read(&mut buf).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        socket.close().await.unwrap();

        let n = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("read should finish after close")
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let (mut client, server) = tokio::io::duplex(64);
        let socket = RawSocket::new(server);

        socket.close().await.unwrap();
        socket.close().await.unwrap();

        let err = socket.write(b"late").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);

        // the peer observes end of stream
        let mut buf = Vec::new();
        client.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());
    }
}
