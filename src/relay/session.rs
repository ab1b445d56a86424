//! The per-session pump: bidirectional forwarding between one client socket
//! and one upstream socket.
//!
//! The session exclusively owns both transport handles for its lifetime.
//! Both directions are polled concurrently so a stalled write on one side
//! never blocks delivery on the other; backpressure is whatever the
//! underlying transports provide. Frames are forwarded verbatim and in
//! order. The hot path does no authentication and no audio processing.

use super::capture::AudioCapture;
use super::dialer::UpstreamSocket;
use super::messages::{
    peek_request_id, ControlMessage, CLOSE_NORMAL, CLOSE_UPSTREAM_ERROR, REASON_UPSTREAM_CLOSED,
    REASON_UPSTREAM_ERROR,
};
use axum::extract::ws::{CloseFrame, Message as ClientMessage, WebSocket};
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tracing::{debug, info, warn};

/// Per-direction forwarding counters, for diagnostics only.
#[derive(Debug, Default)]
pub struct SessionStats {
    bytes_to_upstream: AtomicU64,
    frames_to_upstream: AtomicU64,
    bytes_to_client: AtomicU64,
    frames_to_client: AtomicU64,
}

impl SessionStats {
    fn record_to_upstream(&self, bytes: usize) {
        self.bytes_to_upstream
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.frames_to_upstream.fetch_add(1, Ordering::Relaxed);
    }

    fn record_to_client(&self, bytes: usize) {
        self.bytes_to_client
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.frames_to_client.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_to_upstream(&self) -> u64 {
        self.bytes_to_upstream.load(Ordering::Relaxed)
    }

    pub fn bytes_to_client(&self) -> u64 {
        self.bytes_to_client.load(Ordering::Relaxed)
    }
}

/// How the pump stopped. Decides what, if anything, the surviving side is
/// told before both transports are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpEnd {
    /// Client closed or its stream ended.
    ClientClosed,
    /// Client transport errored mid-session.
    ClientFailed,
    /// Upstream closed or its stream ended.
    UpstreamClosed,
    /// Upstream transport errored mid-session.
    UpstreamFailed,
}

/// One client-to-upstream forwarding pairing, from accepted connection to
/// termination.
pub struct RelaySession {
    id: String,
    stats: SessionStats,
    capture: Option<AudioCapture>,
    started_at: chrono::DateTime<Utc>,
}

impl RelaySession {
    pub fn new(id: String, capture: Option<AudioCapture>) -> Self {
        Self {
            id,
            stats: SessionStats::default(),
            capture,
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Pump frames in both directions until either side closes or errors,
    /// then proactively shut the surviving side down. Termination is
    /// idempotent: closing an already-closed transport is silently ignored.
    pub async fn run(mut self, client: WebSocket, upstream: UpstreamSocket) {
        let (mut upstream_tx, mut upstream_rx) = upstream.split();
        let (mut client_tx, mut client_rx) = client.split();

        let stats = &self.stats;
        let capture = &mut self.capture;
        let session = self.id.as_str();

        let uplink = async {
            while let Some(frame) = client_rx.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(err) => {
                        debug!(session, %err, "client read error");
                        return PumpEnd::ClientFailed;
                    }
                };
                match frame {
                    ClientMessage::Binary(audio) => {
                        if let Some(capture) = capture.as_mut() {
                            capture.push(&audio);
                        }
                        stats.record_to_upstream(audio.len());
                        if upstream_tx
                            .send(UpstreamMessage::Binary(audio))
                            .await
                            .is_err()
                        {
                            return PumpEnd::UpstreamFailed;
                        }
                    }
                    // Clients may send keepalive-style control JSON; it goes
                    // through untouched like everything else.
                    ClientMessage::Text(text) => {
                        stats.record_to_upstream(text.len());
                        if upstream_tx
                            .send(UpstreamMessage::Text(text))
                            .await
                            .is_err()
                        {
                            return PumpEnd::UpstreamFailed;
                        }
                    }
                    ClientMessage::Close(_) => return PumpEnd::ClientClosed,
                    ClientMessage::Ping(_) | ClientMessage::Pong(_) => {}
                }
            }
            PumpEnd::ClientClosed
        };

        let downlink = async {
            while let Some(frame) = upstream_rx.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(err) => {
                        debug!(session, %err, "upstream read error");
                        return PumpEnd::UpstreamFailed;
                    }
                };
                match frame {
                    UpstreamMessage::Text(text) => {
                        // Transcript payloads are opaque to the relay, but a
                        // frame that is not even JSON is dropped rather than
                        // passed along; one odd frame must not kill the
                        // session.
                        if serde_json::from_str::<serde_json::Value>(&text).is_err() {
                            warn!(session, "skipping non-JSON upstream text frame");
                            continue;
                        }
                        if let Some(request_id) = peek_request_id(&text) {
                            debug!(session, %request_id, "upstream request id");
                        }
                        stats.record_to_client(text.len());
                        if client_tx.send(ClientMessage::Text(text)).await.is_err() {
                            return PumpEnd::ClientFailed;
                        }
                    }
                    UpstreamMessage::Binary(payload) => {
                        stats.record_to_client(payload.len());
                        if client_tx
                            .send(ClientMessage::Binary(payload))
                            .await
                            .is_err()
                        {
                            return PumpEnd::ClientFailed;
                        }
                    }
                    UpstreamMessage::Close(_) => return PumpEnd::UpstreamClosed,
                    UpstreamMessage::Ping(_) | UpstreamMessage::Pong(_) => {}
                    UpstreamMessage::Frame(_) => {}
                }
            }
            PumpEnd::UpstreamClosed
        };

        // Both directions run concurrently; whichever stops first decides
        // the teardown.
        let end = tokio::select! {
            end = uplink => end,
            end = downlink => end,
        };

        match end {
            PumpEnd::ClientClosed | PumpEnd::ClientFailed => {
                close_upstream(&mut upstream_tx).await;
            }
            PumpEnd::UpstreamClosed => {
                notify_client_ended(&mut client_tx).await;
            }
            PumpEnd::UpstreamFailed => {
                close_client(&mut client_tx, CLOSE_UPSTREAM_ERROR, REASON_UPSTREAM_ERROR).await;
                close_upstream(&mut upstream_tx).await;
            }
        }

        let duration_ms = (Utc::now() - self.started_at).num_milliseconds();
        info!(
            session,
            ?end,
            duration_ms,
            bytes_to_upstream = self.stats.bytes_to_upstream(),
            bytes_to_client = self.stats.bytes_to_client(),
            "session ended"
        );

        if let Some(capture) = self.capture.take() {
            capture.flush().await;
        }
    }
}

type ClientSink = SplitSink<WebSocket, ClientMessage>;
type UpstreamSink = SplitSink<UpstreamSocket, UpstreamMessage>;

/// Exactly one `ended` frame, then a normal close.
async fn notify_client_ended(client_tx: &mut ClientSink) {
    let _ = client_tx
        .send(ClientMessage::Text(ControlMessage::Ended.to_json()))
        .await;
    close_client(client_tx, CLOSE_NORMAL, REASON_UPSTREAM_CLOSED).await;
}

/// Close the client with a code and reason. Errors mean the client is
/// already gone, which is fine.
async fn close_client(client_tx: &mut ClientSink, code: u16, reason: &'static str) {
    let _ = client_tx
        .send(ClientMessage::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await;
}

async fn close_upstream(upstream_tx: &mut UpstreamSink) {
    let _ = upstream_tx.send(UpstreamMessage::Close(None)).await;
}
