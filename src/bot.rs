//! Synthetic partner
//!
//! A duplex stream that answers every write with a generated sentence after
//! a short delay. What was written is ignored; a write only triggers a reply.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::config::BotConfig;
use crate::duplex::{Chunk, Duplex, Inbox, Latch};
use crate::markov::TextGenerator;

pub struct Bot {
    inbox: Mutex<Inbox>,
    replies: mpsc::UnboundedSender<Chunk>,
    generator: Arc<dyn TextGenerator>,
    delay: Duration,
    max_words: usize,
    closed: Latch,
}

impl Bot {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &BotConfig) -> Self {
        let (replies, rx) = mpsc::unbounded_channel();
        Self {
            inbox: Mutex::new(Inbox::new(rx)),
            replies,
            generator,
            delay: config.reply_delay(),
            max_words: config.max_words,
            closed: Latch::new(),
        }
    }

    /// Schedule one delayed reply. Fire and forget: nobody waits on it and
    /// a reply that finds the bot closed is dropped.
    fn speak(&self) {
        let replies = self.replies.clone();
        let generator = self.generator.clone();
        let closed = self.closed.waiter();
        let delay = self.delay;
        let max_words = self.max_words;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if closed.is_released() {
                return;
            }

            let reply = generator.generate(max_words);
            if reply.is_empty() {
                debug!("bot has nothing to say yet");
                return;
            }

            let mut bytes = reply.into_bytes();
            bytes.push(b'\n');
            if replies.send(Ok(bytes)).is_err() {
                debug!("bot reply dropped");
            }
        });
    }
}

#[async_trait]
impl Duplex for Bot {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut closed = self.closed.waiter();
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            biased;
            _ = closed.wait() => Ok(0),
            res = inbox.read(buf) => res,
        }
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if !self.closed.is_released() {
            self.speak();
        }
        Ok(buf.len())
    }

    async fn close(&self) -> io::Result<()> {
        if self.closed.release() {
            debug!("bot close");
        }
        Ok(())
    }
}
