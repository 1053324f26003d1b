//! Sotto terminal client.
//!
//! Connects to a relay, announces a fresh X25519 key, and bridges stdin
//! lines to encrypted envelopes. All session logic lives in `sotto-core`;
//! this binary only does socket and terminal I/O.

use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use sotto_core::{ParticipantSession, SessionEvent};
use sotto_proto::Envelope;

#[derive(Parser, Debug)]
#[command(name = "sotto", version, about = "End-to-end encrypted chat over a relay")]
struct Args {
    /// Display name to claim at the relay
    #[arg(short, long, env = "SOTTO_NAME")]
    name: String,

    /// Relay WebSocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8080/ws", env = "SOTTO_RELAY_URL")]
    url: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sotto=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let (ws, _) = connect_async(&args.url)
        .await
        .wrap_err_with(|| format!("failed to connect to relay at {}", args.url))?;
    let (mut ws_sender, mut ws_receiver) = ws.split();

    let mut session = ParticipantSession::new(args.name.clone());

    // First frame: announce ourselves. The relay replies with the roster and
    // every present participant's handshake.
    let hello = session.hello().to_json().map_err(|e| eyre!(e))?;
    ws_sender.send(Message::Text(hello)).await?;

    println!("connected to {} as `{}`", args.url, args.name);
    println!("type a message and press enter; /who lists peers; /quit exits");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line {
                    "/quit" => break,
                    "/who" => {
                        let mut peers = session.ready_peers();
                        peers.sort_unstable();
                        if peers.is_empty() {
                            println!("* nobody else here yet");
                        } else {
                            println!("* ready peers: {}", peers.join(", "));
                        }
                    }
                    text => {
                        let outbound = session.send_message(text);
                        if outbound.is_empty() {
                            println!("* no peers ready, message not sent");
                        }
                        for envelope in outbound {
                            let json = envelope.to_json().map_err(|e| eyre!(e))?;
                            ws_sender.send(Message::Text(json)).await?;
                        }
                    }
                }
            }

            frame = ws_receiver.next() => {
                let Some(frame) = frame else {
                    println!("* relay closed the connection");
                    break;
                };
                match frame? {
                    Message::Text(text) => {
                        match Envelope::from_json(&text) {
                            Ok(envelope) => {
                                for event in session.handle_envelope(envelope) {
                                    print_event(&event);
                                }
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Unparseable frame from relay");
                            }
                        }
                    }
                    Message::Close(_) => {
                        println!("* relay closed the connection");
                        break;
                    }
                    _ => {} // Ping/Pong handled by tungstenite, Binary ignored
                }
            }
        }
    }

    let _ = ws_sender.send(Message::Close(None)).await;
    Ok(())
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::PeerReady { peer_id } => {
            println!("* {} joined (secure channel ready)", peer_id);
        }
        SessionEvent::MessageReceived { from, text } => {
            println!("{}: {}", from, text);
        }
        SessionEvent::PeerLeft { peer_id } => {
            println!("* {} left", peer_id);
        }
        SessionEvent::MessageDropped { from, reason } => {
            println!("* dropped a message from {}: {}", from, reason);
        }
        SessionEvent::HandshakeRejected { peer_id, reason } => {
            println!("* rejected handshake from {}: {}", peer_id, reason);
        }
        SessionEvent::RelayError { message } => {
            println!("* relay error: {}", message);
        }
    }
}
