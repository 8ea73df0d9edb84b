//! Matchmaking
//!
//! Pairs waiting participants through a single-slot rendezvous. A caller
//! either claims the participant already waiting in the slot, or offers
//! itself and waits. An offer nobody claims within the wait window is
//! withdrawn and the participant gets a bot instead.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

use crate::bot::Bot;
use crate::config::{BotConfig, MatchmakingConfig};
use crate::duplex::BoxDuplex;
use crate::markov::TextGenerator;
use crate::relay;

pub const WAITING_FOR_PARTNER: &[u8] = b"Waiting for partner...\n";

/// How a single `match_stream` call ended.
#[derive(Debug)]
pub enum MatchOutcome {
    /// The stream was claimed by another caller, which runs the session.
    HandedOff,
    /// This caller ran a session with another human.
    Human(io::Result<()>),
    /// Nobody showed up in time; this caller ran a session with a bot.
    Bot(io::Result<()>),
}

struct Offer {
    ticket: u64,
    stream: BoxDuplex,
    accepted: oneshot::Sender<()>,
}

enum Rendezvous {
    /// Took the waiting offer; we now own both streams.
    Claimed { partner: BoxDuplex, own: BoxDuplex },
    /// Nobody was waiting; our stream now sits in the slot.
    Offered { ticket: u64, accepted: oneshot::Receiver<()> },
}

/// Holds at most one outstanding offer. Every transition happens under the
/// lock, so an offer is either claimed once or withdrawn once, never both.
pub struct PairingSlot {
    offer: Mutex<Option<Offer>>,
    tickets: AtomicU64,
}

impl PairingSlot {
    pub fn new() -> Self {
        Self {
            offer: Mutex::new(None),
            tickets: AtomicU64::new(1),
        }
    }

    async fn claim_or_offer(&self, stream: BoxDuplex) -> Rendezvous {
        let mut slot = self.offer.lock().await;

        if let Some(offer) = slot.take() {
            // the offerer may have gone away; the stream is ours either way
            let _ = offer.accepted.send(());
            debug!(ticket = offer.ticket, "claimed waiting offer");
            return Rendezvous::Claimed {
                partner: offer.stream,
                own: stream,
            };
        }

        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let (accepted_tx, accepted_rx) = oneshot::channel();
        *slot = Some(Offer {
            ticket,
            stream,
            accepted: accepted_tx,
        });
        debug!(ticket, "offered stream");
        Rendezvous::Offered {
            ticket,
            accepted: accepted_rx,
        }
    }

    /// Take back our own offer. `None` if it was claimed in the meantime.
    async fn withdraw(&self, ticket: u64) -> Option<BoxDuplex> {
        let mut slot = self.offer.lock().await;
        match slot.take() {
            Some(offer) if offer.ticket == ticket => Some(offer.stream),
            other => {
                *slot = other;
                None
            }
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.offer.lock().await.is_none()
    }
}

impl Default for PairingSlot {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Matchmaker {
    slot: PairingSlot,
    wait: Duration,
    bot: BotConfig,
    generator: Arc<dyn TextGenerator>,
}

impl Matchmaker {
    pub fn new(
        matchmaking: &MatchmakingConfig,
        bot: BotConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            slot: PairingSlot::new(),
            wait: matchmaking.partner_wait(),
            bot,
            generator,
        }
    }

    pub fn slot(&self) -> &PairingSlot {
        &self.slot
    }

    /// Find `stream` a partner and run the session.
    ///
    /// Returns when the session this call runs is over, or right after the
    /// hand-off when another caller claimed `stream` and runs it instead.
    /// Callers that need to know when the stream itself is finished must
    /// wait on its own completion signal.
    pub async fn match_stream(&self, stream: BoxDuplex) -> MatchOutcome {
        if let Err(e) = stream.write_all(WAITING_FOR_PARTNER).await {
            debug!("could not announce wait: {}", e);
        }

        match self.slot.claim_or_offer(stream).await {
            Rendezvous::Claimed { partner, own } => {
                info!("paired two participants");
                MatchOutcome::Human(relay::chat(partner, own).await)
            }
            Rendezvous::Offered { ticket, accepted } => {
                match tokio::time::timeout(self.wait, accepted).await {
                    // claimed, or the claimer vanished after taking the stream
                    Ok(_) => MatchOutcome::HandedOff,
                    Err(_) => match self.slot.withdraw(ticket).await {
                        Some(stream) => {
                            info!("no partner after {:?}, pairing with bot", self.wait);
                            let bot = Bot::new(self.generator.clone(), &self.bot);
                            MatchOutcome::Bot(relay::chat(Box::new(bot), stream).await)
                        }
                        None => MatchOutcome::HandedOff,
                    },
                }
            }
        }
    }
}
