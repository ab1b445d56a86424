use super::state::AppState;
use crate::relay::{self, StreamParams};
use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Connection URL for /stream with ts/nonce/sig embedded.
    pub url: String,
    /// Epoch millis after which the embedded token is no longer accepted.
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /healthz
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "ok": true, "service": state.config.service.name }))
}

/// GET /relay/token
///
/// Token issuance for trusted callers: mints a fresh time-boxed capability
/// and embeds it into the public /stream URL. Fails with 500 while the
/// relay's public URL is not configured, rather than handing out a URL
/// nobody can dial.
pub async fn issue_token(State(state): State<AppState>) -> Response {
    let Some(base_url) = state.config.token.public_url.clone() else {
        error!("token requested but token.public_url is not configured");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Relay configuration missing on server.".to_string(),
            }),
        )
            .into_response();
    };

    let token = state.signer.mint();
    let url = format!(
        "{}?ts={}&nonce={}&sig={}",
        base_url, token.ts, token.nonce, token.sig
    );

    info!(expires_at = token.expires_at, "issued relay token");

    (
        StatusCode::OK,
        Json(TokenResponse {
            url,
            expires_at: token.expires_at,
        }),
    )
        .into_response()
}

/// GET /stream - WebSocket upgrade path.
///
/// Validation happens after the upgrade completes so the rejection can carry
/// a distinguishable close code; no resource beyond the accepted socket is
/// committed before the token checks out.
pub async fn stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| {
        relay::handle_socket(socket, state.config, state.signer, state.dialer, params)
    })
}
