//! Sotto Relay Server
//!
//! A lightweight WebSocket relay for end-to-end encrypted chat:
//!
//! 1. **Handshake fan-out**: A participant's first frame announces its name
//!    and X25519 public key. The relay broadcasts it, caches it, and replays
//!    every cached handshake to each newcomer so all pairs can derive keys.
//!
//! 2. **Opaque message routing**: Encrypted `message` envelopes are
//!    forwarded verbatim to their single addressed recipient. Absent
//!    recipients mean a silent drop — delivery is best-effort.
//!
//! 3. **Membership notifications**: Roster snapshots on join and `left`
//!    broadcasts on disconnect keep every participant's peer set current.
//!
//! **Privacy**: The relay never sees plaintext or keys capable of
//! decryption. All E2E encryption happens client-side — the relay only reads
//! the `type`, `from` and `to` routing fields.

mod handler;
mod state;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::{RelayConfig, RelayState};

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "sotto-relay", version, about = "Sotto E2EE chat relay server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "RELAY_PORT")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_BIND")]
    bind: String,

    /// Maximum inbound frame size in bytes
    #[arg(long, default_value_t = 64 * 1024, env = "MAX_ENVELOPE_BYTES")]
    max_envelope_bytes: usize,
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sotto_relay=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = RelayConfig {
        port: args.port,
        bind: args.bind,
        max_envelope_bytes: args.max_envelope_bytes,
    };

    let state = RelayState::new(config.clone());

    // Build router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.bind, config.port);
    tracing::info!("Sotto relay server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for participant connections.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "sotto-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Statistics endpoint.
async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(json!({
        "participants": state.participant_count(),
        "roster": state.roster(),
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_json_structure() {
        let json_val = json!({
            "status": "ok",
            "service": "sotto-relay",
            "version": env!("CARGO_PKG_VERSION"),
        });
        assert_eq!(json_val["status"], "ok");
        assert_eq!(json_val["service"], "sotto-relay");
    }

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.max_envelope_bytes, 64 * 1024);
    }

    #[tokio::test]
    async fn test_state_creation() {
        let state = RelayState::new(RelayConfig::default());
        assert_eq!(state.participant_count(), 0);
    }
}
