use clap::Parser;
use log::{error, info};
use server::config::Config;
use server::network::Server;
use server::registry::RoomRegistry;
use server::session::SessionContext;
use server::turn::TurnEngine;
use std::sync::Arc;

/// Main-method of the application.
/// Parses command-line arguments, builds the shared room registry and runs
/// the WebSocket server until it fails or Ctrl+C is pressed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    let words = config.load_words().await?;

    let registry = Arc::new(RoomRegistry::new());
    let ctx = SessionContext::new(registry, TurnEngine::new(words));

    let server = Server::bind(&config.address(), ctx, config.outbound_buffer).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
