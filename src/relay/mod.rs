//! The relay core: token-gated WebSocket listener, upstream dialer, and the
//! per-session pump.
//!
//! Flow per connection: validate the capability embedded in the upgrade
//! request (no network round-trip), dial upstream with the server-held
//! credential, tell the client `{"type":"ready"}`, then forward frames both
//! ways until either side goes away. A rejected request never triggers an
//! upstream dial.

mod capture;
mod dialer;
pub mod messages;
mod session;

pub use capture::AudioCapture;
pub use dialer::{DialError, UpstreamDialer, UpstreamSocket};
pub use session::{RelaySession, SessionStats};

use crate::auth::{now_millis, TokenSigner};
use crate::config::Config;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use messages::{
    ControlMessage, CLOSE_UNAUTHORIZED, CLOSE_UPSTREAM_ERROR, CLOSE_UPSTREAM_FORBIDDEN,
    REASON_UNAUTHORIZED, REASON_UPSTREAM_ERROR, REASON_UPSTREAM_FORBIDDEN,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Query parameters of an upgrade request. All optional so that missing
/// parameters become rejections instead of routing failures.
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    pub ts: Option<String>,
    pub nonce: Option<String>,
    pub sig: Option<String>,
    /// Advisory model hint, honored only when the server allows overrides.
    pub model: Option<String>,
}

/// Drive one accepted client socket through validation, upstream dial, and
/// the forwarding pump. Owns the socket until the session is over.
pub async fn handle_socket(
    mut client: WebSocket,
    config: Arc<Config>,
    signer: Arc<TokenSigner>,
    dialer: Arc<UpstreamDialer>,
    params: StreamParams,
) {
    if let Err(reason) = signer.verify(
        params.ts.as_deref(),
        params.nonce.as_deref(),
        params.sig.as_deref(),
        now_millis(),
    ) {
        warn!(%reason, "rejected upgrade request");
        reject(&mut client, CLOSE_UNAUTHORIZED, REASON_UNAUTHORIZED).await;
        return;
    }

    let session_id = uuid::Uuid::new_v4().to_string();
    info!(session = %session_id, "client authorized");

    let upstream = match dialer.dial(params.model.as_deref()).await {
        Ok(upstream) => upstream,
        Err(DialError::Forbidden) => {
            warn!(session = %session_id, "upstream forbade the configuration");
            reject(&mut client, CLOSE_UPSTREAM_FORBIDDEN, REASON_UPSTREAM_FORBIDDEN).await;
            return;
        }
        Err(err) => {
            error!(session = %session_id, %err, "upstream dial failed");
            reject(&mut client, CLOSE_UPSTREAM_ERROR, REASON_UPSTREAM_ERROR).await;
            return;
        }
    };

    // Tell the client audio may flow. A failed send means the client is
    // already gone; run() notices immediately and tears upstream down.
    let _ = client
        .send(Message::Text(ControlMessage::Ready.to_json()))
        .await;

    let capture = config
        .capture
        .audio_dir
        .as_ref()
        .map(|dir| AudioCapture::new(dir, session_id.clone()));

    RelaySession::new(session_id, capture)
        .run(client, upstream)
        .await;
}

/// Close an accepted socket with a distinguishable status before any session
/// exists. Send errors are ignored; the handshake socket may already be gone.
async fn reject(client: &mut WebSocket, code: u16, reason: &'static str) {
    let _ = client
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}
