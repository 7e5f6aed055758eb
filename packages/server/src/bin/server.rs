//! Realtime conversation gateway server.
//!
//! Accepts WebSocket connections from authenticated users and brokers
//! presence, conversation rooms and message fan-out.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin roka-server
//! cargo run --bin roka-server -- --host 0.0.0.0 --port 3000 --token-secret <secret>
//! ```

use std::sync::Arc;

use clap::Parser;

use roka_server::{
    gateway::{Gateway, GatewayConfig},
    infrastructure::{HmacTokenVerifier, InMemoryChatStore, InMemoryTeamDirectory, InMemoryUserDirectory},
    ui::Server,
};
use roka_shared::{logger::setup_logger, time::SystemClock};

const DEV_SECRET: &str = "insecure-dev-secret";

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Realtime conversation gateway over WebSocket", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Shared secret used to verify bearer tokens
    #[arg(long, default_value = DEV_SECRET)]
    token_secret: String,

    /// Maximum concurrent connections per user
    #[arg(long, default_value_t = 5)]
    max_connections_per_user: usize,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();
    if args.token_secret == DEV_SECRET {
        tracing::warn!("Running with the built-in dev token secret; pass --token-secret in production");
    }

    // Initialize dependencies in order:
    // 1. Clock
    // 2. Collaborators (token verifier + in-memory stores)
    // 3. Gateway
    // 4. Server

    // 1. Shared clock
    let clock = Arc::new(SystemClock);

    // 2. Collaborators. The bundled stores are in-memory; a production
    //    deployment wires the platform's durable stores in here instead.
    let verifier = Arc::new(HmacTokenVerifier::new(
        args.token_secret.as_bytes(),
        clock.clone(),
    ));
    let chat_store = Arc::new(InMemoryChatStore::new(clock.clone()));
    let teams = Arc::new(InMemoryTeamDirectory::new());
    let users = Arc::new(InMemoryUserDirectory::new());

    // 3. Gateway facade
    let config = GatewayConfig {
        max_connections_per_user: args.max_connections_per_user,
        ..GatewayConfig::default()
    };
    let gateway = Arc::new(Gateway::new(
        config, verifier, chat_store, teams, users, clock,
    ));

    // 4. Create and run the server
    let server = Server::new(gateway);
    if let Err(e) = server.run(args.host, args.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
