use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
    pub raw_port: u16,
    pub workers: u32,
}

impl ServerConfig {
    /// Address advertised to browsers on the chat page.
    pub fn public_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MatchmakingConfig {
    /// How long a participant waits for a human partner before a bot is substituted.
    pub partner_wait_ms: u64,
}

impl MatchmakingConfig {
    pub fn partner_wait(&self) -> Duration {
        Duration::from_millis(self.partner_wait_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub reply_delay_ms: u64,
    pub max_words: usize,
}

impl BotConfig {
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    pub prefix_len: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub matchmaking: MatchmakingConfig,
    pub bot: BotConfig,
    pub generator: GeneratorConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            server: ServerConfig {
                host: "localhost".to_string(),
                http_port: 4000,
                raw_port: 4001,
                workers: num_cpus::get() as u32,
            },
            matchmaking: MatchmakingConfig { partner_wait_ms: 5000 },
            bot: BotConfig {
                reply_delay_ms: 1000,
                max_words: 10,
            },
            generator: GeneratorConfig { prefix_len: 2 },
        }
    }
}

fn with_defaults(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    builder
        .set_default("environment", "development")?
        .set_default("server.host", "localhost")?
        .set_default("server.http_port", 4000)?
        .set_default("server.raw_port", 4001)?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("matchmaking.partner_wait_ms", 5000)?
        .set_default("bot.reply_delay_ms", 1000)?
        .set_default("bot.max_words", 10)?
        .set_default("generator.prefix_len", 2)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = with_defaults(Config::builder())?
            .set_default("environment", run_mode.as_str())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // E.g., `APP_MATCHMAKING__PARTNER_WAIT_MS=2000` sets `Settings.matchmaking.partner_wait_ms`
            .add_source(
                Environment::with_prefix("app")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        s.try_deserialize()
    }
}
