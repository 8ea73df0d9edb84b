//! Duplex stream module
//!
//! One read/write/close capability shared by every transport a participant
//! can arrive on. Transport kinds are only distinguished where a stream is
//! constructed; matchmaking and relaying see `Box<dyn Duplex>`.

mod message;
mod raw;
mod split;

pub use message::{MessageConn, MessagePort, Outbound};
pub use raw::RawSocket;
pub use split::SplitPipe;

use std::io;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

/// Buffer size used by copy loops.
pub const COPY_BUF_SIZE: usize = 32 * 1024;

/// A piece of inbound data, or the error that ended the inbound side.
pub type Chunk = io::Result<Vec<u8>>;

pub type BoxDuplex = Box<dyn Duplex>;

#[async_trait]
pub trait Duplex: Send + Sync {
    /// Read into `buf`. `Ok(0)` means end of stream.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    async fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Close the stream. Only the first call has an effect.
    async fn close(&self) -> io::Result<()>;

    async fn write_all(&self, mut buf: &[u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.write(buf).await? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => buf = &buf[n..],
            }
        }
        Ok(())
    }
}

/// One-shot completion signal. Released at most once; any number of waiters.
#[derive(Debug)]
pub struct Latch {
    tx: watch::Sender<bool>,
}

impl Latch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Returns `true` for the call that actually released the latch.
    pub fn release(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_released(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn waiter(&self) -> LatchWaiter {
        LatchWaiter {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct LatchWaiter {
    rx: watch::Receiver<bool>,
}

impl LatchWaiter {
    pub fn is_released(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the latch is released or dropped.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Reader side of a chunk pipe. Chunks larger than the caller's buffer are
/// handed out over several reads; empty chunks are skipped.
#[derive(Debug)]
pub(crate) struct Inbox {
    rx: mpsc::UnboundedReceiver<Chunk>,
    pending: Vec<u8>,
    pos: usize,
}

impl Inbox {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Chunk>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
            pos: 0,
        }
    }

    pub(crate) async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.pending.len() {
            match self.rx.recv().await {
                Some(Ok(chunk)) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Some(Err(e)) => return Err(e),
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
