use crate::words::WordList;
use clap::Parser;
use log::{info, warn};
use shared::DEFAULT_PORT;
use std::path::PathBuf;

pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Command line configuration of the room server
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Config {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Messages queued per connection before it is treated as gone
    #[arg(short, long, default_value_t = DEFAULT_OUTBOUND_BUFFER)]
    pub outbound_buffer: usize,

    /// Word list file, one word per line (built-in list when omitted)
    #[arg(short, long)]
    pub words: Option<PathBuf>,
}

impl Config {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub async fn load_words(&self) -> std::io::Result<WordList> {
        let Some(path) = &self.words else {
            return Ok(WordList::builtin());
        };

        let words = WordList::load(path).await?;
        if words.is_empty() {
            warn!("Word list {} is empty, no round can start", path.display());
        } else {
            info!("Loaded {} words from {}", words.len(), path.display());
        }
        Ok(words)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            words: None,
        }
    }
}
