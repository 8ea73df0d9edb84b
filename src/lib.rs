pub mod bot;
pub mod config;
pub mod duplex;
pub mod error;
pub mod markov;
pub mod matchmaker;
pub mod relay;
pub mod session;
pub mod websocket;

use std::sync::Arc;

use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use duplex::{Duplex, MessageConn, RawSocket, SplitPipe};
pub use markov::{MarkovChain, TextGenerator};
pub use matchmaker::{MatchOutcome, Matchmaker};

/// Application state shared by the web workers and the raw listener
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub generator: Arc<dyn TextGenerator>,
    pub matchmaker: Arc<Matchmaker>,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        let chain = MarkovChain::new(config.generator.prefix_len);
        info!("Markov generator using {}-word prefixes", chain.prefix_len());
        Self::with_generator(config, Arc::new(chain))
    }

    pub fn with_generator(config: Settings, generator: Arc<dyn TextGenerator>) -> Self {
        let matchmaker = Matchmaker::new(
            &config.matchmaking,
            config.bot.clone(),
            generator.clone(),
        );

        Self {
            config: Arc::new(config),
            generator,
            matchmaker: Arc::new(matchmaker),
        }
    }
}
