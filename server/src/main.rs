use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::sync::Arc;

/// Main-method of the application.
/// Parses command-line arguments, binds the listener and runs the server until
/// every session has ended or Ctrl+C is pressed.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[command(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Number of players admitted before the server stops accepting
        #[arg(short = 'c', long, default_value = "2")]
        max_connections: usize,
        /// Roster capacity of the game
        #[arg(short = 'm', long, default_value_t = shared::MAX_PLAYERS)]
        max_players: usize,
        /// I/O failures a connection may absorb before it is dropped
        #[arg(short, long, default_value_t = shared::ERROR_TOLERANCE)]
        error_tolerance: u32,
    }

    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig::new(format!("{}:{}", args.host, args.port))
        .with_max_connections(args.max_connections)
        .with_max_players(args.max_players)
        .with_error_tolerance(args.error_tolerance);

    let (server, listener) = Server::bind(config).await?;
    let server_handle = tokio::spawn(Arc::clone(&server).run(listener));
    tokio::pin!(server_handle);

    // Handle shutdown gracefully
    tokio::select! {
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => info!("Game over, server exiting"),
                Ok(Err(e)) => error!("Server stopped with error: {}", e),
                Err(e) => error!("Server task panicked: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            server.shutdown().await;
            if let Err(e) = server_handle.await {
                error!("Server task panicked: {}", e);
            }
        }
    }

    Ok(())
}
