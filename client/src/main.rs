use clap::Parser;
use client::{input, network};
use log::{error, info, warn};
use shared::ClientRequest;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    info!("Controls: s = start, p = pause, q = quit, up/down/left/right, move <dx> <dy>");

    let connection = network::GameConnection::connect(&args.server).await?;
    let (mut sender, mut receiver, mut view) = connection.into_parts();

    // Print every server line as it arrives
    let responses = tokio::spawn(async move {
        loop {
            match receiver.next_line().await {
                Ok(Some(line)) => {
                    println!("{}", line);
                    if let Ok(response) = line.parse() {
                        view.apply_response(&response);
                    }
                }
                Ok(None) => {
                    info!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    error!("Failed reading from server: {}", e);
                    break;
                }
            }
        }
        view
    });

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = stdin.next_line().await? {
        let Some(request) = input::parse_input(&line) else {
            warn!("Unknown input {:?}", line.trim());
            continue;
        };

        if let Err(e) = sender.send(&request).await {
            error!("Failed writing to server: {}", e);
            break;
        }
        if request == ClientRequest::Quit {
            break;
        }
    }

    if let Err(e) = sender.close().await {
        warn!("Failed to close connection: {}", e);
    }

    let view = responses.await?;
    info!("Final phase: {:?}, players: {:?}", view.phase, view.players);

    Ok(())
}
