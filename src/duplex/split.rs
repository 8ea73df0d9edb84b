use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{Chunk, Duplex, Inbox, Latch, LatchWaiter, COPY_BUF_SIZE};
use crate::markov::TextGenerator;

/// A connection whose inbound bytes are mirrored into the generator.
///
/// A background task copies everything the connection receives into an
/// internal pipe (which is what `read` returns) and then trains the
/// generator with it. Writes and close go straight to the connection.
/// Closing releases the completion latch handed out by [`SplitPipe::spawn`].
pub struct SplitPipe<C> {
    inbox: Mutex<Inbox>,
    conn: Arc<C>,
    mirror: SyncMutex<Option<JoinHandle<()>>>,
    closing: AtomicBool,
    done: Latch,
}

impl<C> SplitPipe<C>
where
    C: Duplex + 'static,
{
    pub fn spawn(conn: C, sink: Arc<dyn TextGenerator>) -> (Self, LatchWaiter) {
        let conn = Arc::new(conn);
        let (tx, rx) = mpsc::unbounded_channel();
        let mirror = tokio::spawn(mirror(conn.clone(), tx, sink));

        let done = Latch::new();
        let waiter = done.waiter();
        let pipe = Self {
            inbox: Mutex::new(Inbox::new(rx)),
            conn,
            mirror: SyncMutex::new(Some(mirror)),
            closing: AtomicBool::new(false),
            done,
        };
        (pipe, waiter)
    }

    fn stop_mirror(&self) {
        if let Some(handle) = self.mirror.lock().take() {
            handle.abort();
        }
    }
}

async fn mirror<C: Duplex>(
    conn: Arc<C>,
    pipe: mpsc::UnboundedSender<Chunk>,
    sink: Arc<dyn TextGenerator>,
) {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        match conn.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if pipe.send(Ok(buf[..n].to_vec())).is_err() {
                    break;
                }
                sink.train(&buf[..n]);
            }
            Err(e) => {
                let _ = pipe.send(Err(e));
                break;
            }
        }
    }
}

#[async_trait]
impl<C> Duplex for SplitPipe<C>
where
    C: Duplex + 'static,
{
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut done = self.done.waiter();
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            biased;
            _ = done.wait() => Ok(0),
            res = inbox.read(buf) => res,
        }
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.conn.write(buf).await
    }

    async fn close(&self) -> io::Result<()> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!("socket close");
        self.stop_mirror();
        let res = self.conn.close().await;
        self.done.release();
        res
    }
}

impl<C> Drop for SplitPipe<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.mirror.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplex::{MessageConn, Outbound, RawSocket};
    use crate::markov::{MarkovChain, MockTextGenerator};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_inbound_bytes_are_read_and_trained() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut generator = MockTextGenerator::new();
        generator
            .expect_train()
            .withf(|chunk: &[u8]| chunk == b"hello there\n")
            .times(1)
            .return_const(());
        let (pipe, _done) = SplitPipe::spawn(RawSocket::new(server), Arc::new(generator));

        client.write_all(b"hello there\n").await.unwrap();

        let mut buf = [0u8; 64];
        let n = pipe.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello there\n");

        // training happens right after the pipe hand-off
        tokio::time::sleep(Duration::from_millis(20)).await;
        pipe.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_eof_reaches_reader() {
        let (mut client, server) = tokio::io::duplex(1024);
        let chain = Arc::new(MarkovChain::new(2));
        let (pipe, _done) = SplitPipe::spawn(RawSocket::new(server), chain.clone());

        client.write_all(b"good morning").await.unwrap();
        client.shutdown().await.unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 4];
        loop {
            let n = pipe.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"good morning");
        assert_eq!(chain.generate(10), "good morning");
    }

    #[tokio::test]
    async fn test_close_releases_completion_latch() {
        let (conn, mut port) = MessageConn::channel();
        let (pipe, mut done) = SplitPipe::spawn(conn, Arc::new(MarkovChain::new(2)));

        pipe.write_all(b"bye").await.unwrap();
        assert!(!done.is_released());

        pipe.close().await.unwrap();
        pipe.close().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), done.wait())
            .await
            .expect("close should release the latch");

        assert_eq!(port.outbound.recv().await, Some(Outbound::Data(b"bye".to_vec())));
        assert_eq!(port.outbound.recv().await, Some(Outbound::Close));

        let mut buf = [0u8; 4];
        assert_eq!(pipe.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_waiters() {
        let (conn, _port) = MessageConn::channel();
        let (pipe, mut done) = SplitPipe::spawn(conn, Arc::new(MarkovChain::new(2)));

        drop(pipe);
        tokio::time::timeout(Duration::from_secs(1), done.wait())
            .await
            .expect("dropping the pipe should release waiters");
    }
}
