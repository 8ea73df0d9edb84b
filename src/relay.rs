//! Bidirectional relay between two matched streams.

use std::io;

use tracing::{debug, warn};

use crate::duplex::{BoxDuplex, Duplex, COPY_BUF_SIZE};

pub const FOUND_PARTNER: &[u8] = b"Found one! Say hi.\n";

/// Copy `from` into `to` until `from` reaches end of stream or either side fails.
pub async fn pump(from: &dyn Duplex, to: &dyn Duplex) -> io::Result<u64> {
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut copied = 0u64;
    loop {
        let n = from.read(&mut buf).await?;
        if n == 0 {
            return Ok(copied);
        }
        to.write_all(&buf[..n]).await?;
        copied += n as u64;
    }
}

/// Run one session between `a` and `b`.
///
/// Both copy directions run until the first of them ends; its result is the
/// session's result and the other direction is dropped. Both streams are
/// then closed exactly once.
pub async fn chat(a: BoxDuplex, b: BoxDuplex) -> io::Result<()> {
    // a partner that can't hear the greeting will fail the copy loop anyway
    let _ = a.write_all(FOUND_PARTNER).await;
    let _ = b.write_all(FOUND_PARTNER).await;

    let result = tokio::select! {
        res = pump(&*a, &*b) => res,
        res = pump(&*b, &*a) => res,
    };

    if let Err(e) = &result {
        warn!("chat err: {}", e);
    }

    if let Err(e) = a.close().await {
        debug!("close after chat: {}", e);
    }
    if let Err(e) = b.close().await {
        debug!("close after chat: {}", e);
    }

    result.map(|_| ())
}
