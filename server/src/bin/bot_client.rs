//! Headless bot that joins the relay and walks in a circle.
//!
//! Useful for smoke-testing a running relay or putting a few extra players
//! in the world while developing a client.

use clap::Parser;
use futures::{SinkExt, StreamExt};
use log::{info, warn};
use rand::Rng;
use shared::{
    decode_server_message, encode_client_message, ClientMessage, JoinRequest, PlayerState,
    ServerMessage, DEFAULT_Y,
};
use std::time::Duration;
use tokio::time::interval;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless bot client for the relay")]
struct Args {
    /// Relay URL to connect to
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:3000")]
    server: String,

    /// Display name of the bot
    #[arg(short, long, default_value = "bot")]
    name: String,

    /// Milliseconds between updates
    #[arg(short = 'i', long, default_value = "100")]
    interval_ms: u64,

    /// Number of updates to send before leaving
    #[arg(short = 'c', long, default_value = "100")]
    count: u32,

    /// Radius of the walked circle
    #[arg(short = 'r', long, default_value = "5.0")]
    radius: f64,
}

/// Position on the circle after `step` updates
fn circle_state(step: u32, radius: f64) -> PlayerState {
    let angle = step as f64 * 0.1;
    PlayerState {
        x: radius * angle.cos(),
        y: DEFAULT_Y,
        z: radius * angle.sin(),
        yaw: angle + std::f64::consts::FRAC_PI_2,
        ..PlayerState::default()
    }
}

fn describe(message: &ServerMessage) -> String {
    match message {
        ServerMessage::Init { players } => format!("init with {} player(s)", players.len()),
        ServerMessage::PlayerJoined { player } => format!("{} ({}) joined", player.name, player.id),
        ServerMessage::PlayerUpdate { player } => format!(
            "{} at ({:.2}, {:.2}, {:.2})",
            player.id, player.state.x, player.state.y, player.state.z
        ),
        ServerMessage::PlayerLeft { id } => format!("{} left", id),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let id = format!("bot-{:08x}", rand::thread_rng().gen::<u32>());

    info!("Connecting to {} as {} ({})", args.server, args.name, id);
    let (ws_stream, _) = connect_async(args.server.as_str()).await?;
    let (mut sink, mut source) = ws_stream.split();

    let join = ClientMessage::Join(JoinRequest {
        y: Some(DEFAULT_Y),
        ..JoinRequest::new(id.clone(), args.name.clone())
    });
    sink.send(Message::text(encode_client_message(&join)?)).await?;

    let reader = tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => match decode_server_message(text.as_str()) {
                    Ok(message) => info!("{}", describe(&message)),
                    Err(e) => warn!("Unexpected frame from relay: {}", e),
                },
                Ok(Message::Close(_)) => {
                    info!("Relay closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("Connection error: {}", e);
                    break;
                }
            }
        }
    });

    let mut ticker = interval(Duration::from_millis(args.interval_ms.max(1)));
    for step in 0..args.count {
        ticker.tick().await;
        let update = ClientMessage::Update(circle_state(step, args.radius));
        if let Err(e) = sink.send(Message::text(encode_client_message(&update)?)).await {
            warn!("Failed to send update: {}", e);
            break;
        }
    }

    info!("Sent {} updates, leaving", args.count);
    sink.close().await?;
    reader.abort();

    Ok(())
}
