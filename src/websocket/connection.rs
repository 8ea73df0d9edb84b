use std::io;
use std::time::Duration;

use actix::prelude::*;
use actix_web_actors::ws;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::duplex::{Chunk, MessagePort, Outbound};
use crate::error::WebSocketError;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// One outgoing websocket frame.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// Turns the relay's byte chunks into frames without altering any byte.
///
/// A multibyte character cut by a chunk boundary is held back until the
/// rest of it arrives. Bytes that can never be valid UTF-8 go out as binary
/// frames.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut rest = buf.as_slice();
        while !rest.is_empty() {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    frames.push(Frame::Text(text.to_owned()));
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    if !valid.is_empty() {
                        // valid_up_to guarantees this prefix decodes
                        frames.push(Frame::Text(String::from_utf8_lossy(valid).into_owned()));
                    }
                    match e.error_len() {
                        Some(len) => {
                            frames.push(Frame::Binary(tail[..len].to_vec()));
                            rest = &tail[len..];
                        }
                        None => {
                            self.pending = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        frames
    }

    /// Whatever is still held back, as a final binary frame.
    fn flush(&mut self) -> Option<Frame> {
        if self.pending.is_empty() {
            return None;
        }
        Some(Frame::Binary(std::mem::take(&mut self.pending)))
    }
}

/// WebSocket actor that owns the upgraded socket and bridges it to a
/// [`MessageConn`](crate::duplex::MessageConn): every received frame becomes
/// an inbound chunk, every outbound instruction becomes a frame.
pub struct WsConnection {
    id: Uuid,
    peer_addr: String,
    inbound: Option<mpsc::UnboundedSender<Chunk>>,
    outbound: Option<mpsc::UnboundedReceiver<Outbound>>,
    carry: Utf8Carry,
}

impl WsConnection {
    pub fn new(port: MessagePort, peer_addr: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer_addr,
            inbound: Some(port.inbound),
            outbound: Some(port.outbound),
            carry: Utf8Carry::default(),
        }
    }

    /// Hand a received message to the reader; stop if nobody reads anymore.
    fn forward(&mut self, chunk: Chunk, ctx: &mut <Self as Actor>::Context) {
        let delivered = match &self.inbound {
            Some(tx) => tx.send(chunk).is_ok(),
            None => false,
        };
        if !delivered {
            ctx.stop();
        }
    }

    fn send_frame(frame: Frame, ctx: &mut <Self as Actor>::Context) {
        match frame {
            Frame::Text(text) => ctx.text(text),
            Frame::Binary(bytes) => ctx.binary(bytes),
        }
    }

    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |_act, ctx| {
            ctx.ping(b"");
        });
    }
}

impl Actor for WsConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection established with {} (id: {})", self.peer_addr, self.id);

        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|msg| (msg, rx))
            }));
        }

        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // dropping the sender is what the reader sees as end of stream
        self.inbound.take();
        info!("WebSocket connection closed with {} (id: {})", self.peer_addr, self.id);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                self.forward(Ok(text.as_bytes().to_vec()), ctx);
            }
            Ok(ws::Message::Binary(bin)) => {
                self.forward(Ok(bin.to_vec()), ctx);
            }
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error handling WebSocket message from {}: {}", self.peer_addr, e);
                let err = WebSocketError::ConnectionError(e.to_string());
                self.forward(Err(io::Error::from(err)), ctx);
                ctx.stop();
            }
        }
    }
}

impl StreamHandler<Outbound> for WsConnection {
    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        match msg {
            Outbound::Data(bytes) => {
                for frame in self.carry.push(&bytes) {
                    Self::send_frame(frame, ctx);
                }
            }
            Outbound::Close => {
                if let Some(frame) = self.carry.flush() {
                    Self::send_frame(frame, ctx);
                }
                ctx.close(None);
                ctx.stop();
            }
        }
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!("Session side of {} went away (id: {})", self.peer_addr, self.id);
        ctx.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Frame {
        Frame::Text(s.to_string())
    }

    #[test]
    fn test_whole_text_is_one_frame() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push("café\n".as_bytes()), vec![text("café\n")]);
        assert_eq!(carry.flush(), None);
    }

    #[test]
    fn test_split_character_is_held_until_complete() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(b"caf\xc3"), vec![text("caf")]);
        assert_eq!(carry.push(b"\xa9\n"), vec![text("é\n")]);

        // a four-byte character arriving one byte at a time
        let crab = "🦀".as_bytes();
        assert!(carry.push(&crab[..1]).is_empty());
        assert!(carry.push(&crab[1..3]).is_empty());
        assert_eq!(carry.push(&crab[3..]), vec![text("🦀")]);
    }

    #[test]
    fn test_invalid_bytes_go_out_as_binary() {
        let mut carry = Utf8Carry::default();
        assert_eq!(
            carry.push(b"ok\xffstill ok\xc3("),
            vec![
                text("ok"),
                Frame::Binary(vec![0xff]),
                text("still ok"),
                Frame::Binary(vec![0xc3]),
                text("("),
            ]
        );
        assert_eq!(carry.flush(), None);
    }

    #[test]
    fn test_unfinished_character_is_flushed_as_binary() {
        let mut carry = Utf8Carry::default();
        assert_eq!(carry.push(b"bye\xe2\x82"), vec![text("bye")]);
        assert_eq!(carry.flush(), Some(Frame::Binary(vec![0xe2, 0x82])));
        assert_eq!(carry.flush(), None);
    }
}
