//! Text generation module
//!
//! A word-level Markov chain trained on everything human participants type,
//! used by the bot to produce plausible replies.

use std::collections::HashMap;

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::Rng;

/// Collaborator contract for the bot's text source.
///
/// Both operations are called concurrently from many sessions, so
/// implementations carry their own synchronization.
#[cfg_attr(test, mockall::automock)]
pub trait TextGenerator: Send + Sync {
    /// Ingest one chunk of observed conversation.
    fn train(&self, chunk: &[u8]);

    /// Produce at most `max_words` words from the trained corpus.
    fn generate(&self, max_words: usize) -> String;
}

/// Sliding window of the last `n` words seen.
#[derive(Debug, Clone)]
struct Prefix(Vec<String>);

impl Prefix {
    fn new(len: usize) -> Self {
        Self(vec![String::new(); len])
    }

    fn key(&self) -> String {
        self.0.join(" ")
    }

    fn shift(&mut self, word: &str) {
        if self.0.is_empty() {
            return;
        }
        self.0.remove(0);
        self.0.push(word.to_string());
    }
}

#[derive(Debug)]
pub struct MarkovChain {
    prefix_len: usize,
    chain: RwLock<HashMap<String, Vec<String>>>,
}

impl MarkovChain {
    pub fn new(prefix_len: usize) -> Self {
        Self {
            prefix_len,
            chain: RwLock::new(HashMap::new()),
        }
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    /// Number of distinct prefixes with at least one recorded successor.
    pub fn prefix_count(&self) -> usize {
        self.chain.read().len()
    }

    pub fn generate_with<R: Rng + ?Sized>(&self, rng: &mut R, max_words: usize) -> String {
        let chain = self.chain.read();
        let mut prefix = Prefix::new(self.prefix_len);
        let mut words: Vec<&str> = Vec::new();

        while words.len() < max_words {
            let next = match chain.get(&prefix.key()) {
                Some(choices) => match choices.choose(&mut *rng) {
                    Some(word) => word,
                    None => break,
                },
                None => break,
            };
            words.push(next);
            prefix.shift(next);
        }

        words.join(" ")
    }
}

impl TextGenerator for MarkovChain {
    fn train(&self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        let mut prefix = Prefix::new(self.prefix_len);
        let mut chain = self.chain.write();

        for word in text.split_whitespace() {
            chain.entry(prefix.key()).or_default().push(word.to_string());
            prefix.shift(word);
        }
    }

    fn generate(&self, max_words: usize) -> String {
        self.generate_with(&mut rand::thread_rng(), max_words)
    }
}
