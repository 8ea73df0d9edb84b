//! Per-connection entry point.

use tokio::net::TcpListener;
use tracing::{error, info};
use uuid::Uuid;

use crate::duplex::{Duplex, RawSocket, SplitPipe};
use crate::matchmaker::MatchOutcome;
use crate::{AppState, Result};

/// Drive one participant from arrival to the end of their session.
///
/// The connection's inbound bytes are mirrored into the generator, the
/// participant is handed to the matchmaker, and the call returns once the
/// participant's stream has been closed. Returning from the matchmaker is
/// not enough: a participant whose offer was claimed is finished only when
/// the claimer's session closes their stream.
pub async fn drive<C>(state: &AppState, conn: C, peer: &str) -> MatchOutcome
where
    C: Duplex + 'static,
{
    let id = Uuid::new_v4();
    info!(session = %id, peer, "participant connected");

    let (stream, mut done) = SplitPipe::spawn(conn, state.generator.clone());
    let outcome = state.matchmaker.match_stream(Box::new(stream)).await;
    done.wait().await;

    info!(session = %id, peer, ?outcome, "participant finished");
    outcome
}

/// Accept raw TCP participants until accepting fails.
///
/// An accept error is returned to the caller, which is expected to shut the
/// process down.
pub async fn serve_raw(listener: TcpListener, state: AppState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Raw chat listener ready at {}", addr);
    }

    loop {
        let (stream, addr) = listener.accept().await.map_err(|e| {
            error!("Accept error: {}", e);
            e
        })?;

        let state = state.clone();
        tokio::spawn(async move {
            drive(&state, RawSocket::new(stream), &addr.to_string()).await;
        });
    }
}
