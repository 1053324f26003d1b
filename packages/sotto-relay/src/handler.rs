//! WebSocket connection handler.
//!
//! Manages individual WebSocket connections: the first frame must be the
//! participant's handshake (which doubles as registration), after which
//! envelopes are routed through the relay state until the socket closes.
//!
//! The relay never parses cryptographic payloads beyond checking that the
//! handshake's public key field is well-formed base64 of the right length —
//! nonces and ciphertext pass through opaque.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use sotto_proto::{decode_fixed, Envelope, PUBLIC_KEY_LEN};

use crate::state::RelayState;

/// Handle a single WebSocket connection.
///
/// Runs for the lifetime of the connection:
/// 1. Waits for the client's `handshake` envelope and claims its name
/// 2. Replays the roster and every cached handshake to the newcomer
/// 3. Broadcasts the newcomer's handshake to everyone else
/// 4. Spawns a sender task and routes inbound envelopes until close
/// 5. Unregisters and broadcasts `left` on disconnect
pub async fn handle_websocket(socket: WebSocket, state: RelayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound channel for this client, drained by the sender task below.
    // Unbounded so that fan-out from other connections never blocks.
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    // ── Step 1: Registration (first frame is the handshake) ───────────────

    let max_bytes = state.config.max_envelope_bytes;
    let (client_id, handshake) = loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => match parse_frame(&text, max_bytes) {
                Ok(env @ Envelope::Handshake { .. }) => match validate_handshake(&env) {
                    Ok(name) => break (name, env),
                    Err(reason) => {
                        let err = Envelope::Error { message: reason };
                        if send_frame(&mut ws_sender, &err).await.is_err() {
                            return;
                        }
                    }
                },
                Ok(_) => {
                    let err = Envelope::Error {
                        message: "first frame must be a handshake".to_string(),
                    };
                    if send_frame(&mut ws_sender, &err).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    if let Envelope::Error { message } = &err {
                        tracing::warn!(reason = message.as_str(), "Rejected registration frame");
                    }
                    if send_frame(&mut ws_sender, &err).await.is_err() {
                        return;
                    }
                }
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = ws_sender.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | None => {
                return; // Connection closed before registration
            }
            _ => continue,
        }
    };

    // ── Step 2: Claim the name ────────────────────────────────────────────

    if !state.register(&client_id, tx, handshake.clone()) {
        tracing::warn!(name = client_id.as_str(), "Name already in use, closing");
        let err = Envelope::Error {
            message: format!("name `{}` is already in use", client_id),
        };
        let _ = send_frame(&mut ws_sender, &err).await;
        let _ = ws_sender.send(Message::Close(None)).await;
        return;
    }

    // ── Step 3: Bring the newcomer up to date ─────────────────────────────

    // Roster snapshot first, then every present participant's handshake, so
    // the newcomer can establish a channel with each without anyone having
    // to re-announce
    state.send_to(
        &client_id,
        Envelope::Roster {
            participants: state.roster(),
        },
    );
    for cached in state.cached_handshakes(&client_id) {
        state.send_to(&client_id, cached);
    }

    // Announce the newcomer to everyone already present
    state.broadcast_except(&client_id, &handshake);

    // ── Step 4: Sender task ───────────────────────────────────────────────

    let sender_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            match envelope.to_json() {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize envelope");
                }
            }
        }
    });

    // ── Step 5: Route inbound envelopes ───────────────────────────────────

    while let Some(msg_result) = ws_receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => match parse_frame(&text, max_bytes) {
                Ok(envelope) => route_envelope(&state, &client_id, envelope),
                Err(err) => {
                    if let Envelope::Error { message } = &err {
                        tracing::warn!(
                            name = client_id.as_str(),
                            reason = message.as_str(),
                            "Rejected inbound frame"
                        );
                    }
                    state.send_to(&client_id, err);
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!(name = client_id.as_str(), "Client sent close frame");
                break;
            }
            Err(e) => {
                tracing::warn!(name = client_id.as_str(), error = %e, "WebSocket error");
                break;
            }
            _ => {} // Ping/Pong handled by axum, Binary ignored
        }
    }

    // ── Step 6: Cleanup ───────────────────────────────────────────────────

    state.unregister(&client_id);
    state.broadcast_except(
        &client_id,
        &Envelope::Left {
            from: client_id.clone(),
        },
    );
    sender_task.abort();
    tracing::info!(name = client_id.as_str(), "WebSocket disconnected");
}

/// Parse one inbound text frame, enforcing the size cap before any JSON
/// work. Applies to every frame, registration included. The Err side is the
/// error envelope to send back to the client.
fn parse_frame(text: &str, max_bytes: usize) -> Result<Envelope, Envelope> {
    if text.len() > max_bytes {
        return Err(Envelope::Error {
            message: format!("frame exceeds {} bytes", max_bytes),
        });
    }
    Envelope::from_json(text).map_err(|e| Envelope::Error {
        message: format!("invalid envelope: {}", e),
    })
}

/// Check a registration handshake: non-empty name and a public key field
/// that decodes to exactly 32 bytes. Returns the claimed name.
fn validate_handshake(envelope: &Envelope) -> Result<String, String> {
    let Envelope::Handshake { from, public_key } = envelope else {
        return Err("first frame must be a handshake".to_string());
    };
    if from.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    if let Err(e) = decode_fixed::<PUBLIC_KEY_LEN>("public_key", public_key) {
        return Err(e.to_string());
    }
    Ok(from.clone())
}

/// Route one envelope from a registered participant.
///
/// The relay enforces sender honesty (`from` must match the connection's
/// registered name) and envelope class: relay-originated kinds sent by a
/// client are dropped. Messages to absent recipients are dropped silently —
/// delivery is best-effort by design and the sender is not notified.
fn route_envelope(state: &RelayState, client_id: &str, envelope: Envelope) {
    match &envelope {
        Envelope::Handshake { from, .. } => {
            if from != client_id {
                reject_spoof(state, client_id, from);
                return;
            }
            // Re-announcement: refresh the cache and fan out again. Clients
            // treat duplicates as idempotent.
            state.update_handshake(client_id, envelope.clone());
            state.broadcast_except(client_id, &envelope);
        }

        Envelope::Message { from, to, .. } => {
            if from != client_id {
                reject_spoof(state, client_id, from);
                return;
            }
            if !state.send_to(to, envelope.clone()) {
                tracing::debug!(
                    from = client_id,
                    to = to.as_str(),
                    "Recipient not connected, dropping"
                );
            }
        }

        Envelope::Roster { .. } | Envelope::Left { .. } | Envelope::Error { .. } => {
            tracing::warn!(
                name = client_id,
                "Dropped relay-originated envelope kind sent by client"
            );
        }
    }
}

fn reject_spoof(state: &RelayState, client_id: &str, claimed: &str) {
    tracing::warn!(
        name = client_id,
        claimed = claimed,
        "Envelope `from` does not match registered name"
    );
    state.send_to(
        client_id,
        Envelope::Error {
            message: "envelope `from` must match your registered name".to_string(),
        },
    );
}

async fn send_frame(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    envelope: &Envelope,
) -> Result<(), axum::Error> {
    match envelope.to_json() {
        Ok(json) => ws_sender.send(Message::Text(json)).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize envelope");
            Ok(())
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
