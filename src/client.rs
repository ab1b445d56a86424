//! Client adapter for the relay.
//!
//! Fetches a signed connection URL from the token issuance endpoint, opens
//! the WebSocket, waits for the relay's `ready` frame, and turns upstream
//! transcript payloads into typed events. If the relay rejects the token at
//! connect time (close 4401, typically because the URL went stale between
//! issuance and dialing) the adapter re-acquires a URL and retries exactly
//! once, never more, to avoid retry storms.

use crate::relay::messages::{ControlMessage, CLOSE_UNAUTHORIZED};
use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// One recognized transcript result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEvent {
    pub text: String,
    pub is_final: bool,
}

/// Events surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A transcript payload, interim or final.
    Transcript(TranscriptEvent),
    /// The relay reported that upstream finished; no more transcripts.
    Ended,
    /// The relay closed the connection.
    Closed { code: Option<u16>, reason: String },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    url: String,
}

/// Transcript payload shape produced by the upstream service. Parsing lives
/// here, in the adapter; the relay itself never interprets transcripts.
#[derive(Debug, Deserialize)]
struct TranscriptPayload {
    channel: Channel,
    #[serde(default)]
    is_final: bool,
}

#[derive(Debug, Deserialize)]
struct Channel {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
}

/// Parse an upstream transcript payload into a typed event. Returns `None`
/// for payloads with a different shape (metadata, keepalives, ...).
pub fn parse_transcript(payload: &str) -> Option<TranscriptEvent> {
    let parsed: TranscriptPayload = serde_json::from_str(payload).ok()?;
    let text = parsed.channel.alternatives.first()?.transcript.clone();
    Some(TranscriptEvent {
        text,
        is_final: parsed.is_final,
    })
}

enum Attempt {
    Open(RelayConnection),
    Unauthorized,
}

/// Connects to a relay via its token issuance endpoint.
pub struct RelayClient {
    token_endpoint: String,
    http: reqwest::Client,
}

impl RelayClient {
    /// `token_endpoint` is the full issuance URL, e.g.
    /// `https://relay.example.com/relay/token`.
    pub fn new(token_endpoint: impl Into<String>) -> Self {
        Self {
            token_endpoint: token_endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Acquire a signed URL and open a session, retrying once on a 4401
    /// rejection.
    pub async fn connect(&self) -> Result<RelayConnection> {
        match self.try_connect().await? {
            Attempt::Open(conn) => Ok(conn),
            Attempt::Unauthorized => {
                warn!("relay rejected token, re-acquiring URL and retrying once");
                match self.try_connect().await? {
                    Attempt::Open(conn) => Ok(conn),
                    Attempt::Unauthorized => bail!("relay rejected a freshly issued token"),
                }
            }
        }
    }

    async fn fetch_socket_url(&self) -> Result<String> {
        let response = self
            .http
            .get(&self.token_endpoint)
            .send()
            .await
            .context("token endpoint unreachable")?
            .error_for_status()
            .context("token issuance failed")?;
        let token: TokenResponse = response
            .json()
            .await
            .context("token endpoint returned an unexpected body")?;
        Ok(token.url)
    }

    async fn try_connect(&self) -> Result<Attempt> {
        let url = self.fetch_socket_url().await?;
        let (mut socket, _) = connect_async(&url)
            .await
            .context("relay WebSocket handshake failed")?;

        // The relay speaks first: `ready` on success, a close frame on
        // rejection.
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    if matches!(
                        serde_json::from_str::<ControlMessage>(&text),
                        Ok(ControlMessage::Ready)
                    ) {
                        debug!("relay session ready");
                        return Ok(Attempt::Open(RelayConnection { socket }));
                    }
                }
                Some(Ok(Message::Close(Some(frame))))
                    if u16::from(frame.code) == CLOSE_UNAUTHORIZED =>
                {
                    return Ok(Attempt::Unauthorized);
                }
                Some(Ok(Message::Close(frame))) => {
                    bail!("relay closed during connect: {frame:?}");
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err).context("relay read failed during connect"),
                None => bail!("relay dropped the connection during connect"),
            }
        }
    }
}

/// An open, ready session with the relay.
pub struct RelayConnection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RelayConnection {
    /// Forward one chunk of raw audio.
    pub async fn send_audio(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.socket
            .send(Message::Binary(bytes))
            .await
            .context("audio send failed")
    }

    /// Next event, or `None` once the stream is exhausted. Payloads that are
    /// neither transcripts nor control frames are skipped.
    pub async fn next_event(&mut self) -> Result<Option<RelayEvent>> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    if matches!(
                        serde_json::from_str::<ControlMessage>(&text),
                        Ok(ControlMessage::Ended)
                    ) {
                        return Ok(Some(RelayEvent::Ended));
                    }
                    if let Some(event) = parse_transcript(&text) {
                        return Ok(Some(RelayEvent::Transcript(event)));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                    return Ok(Some(RelayEvent::Closed { code, reason }));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(err).context("relay read failed"),
                None => return Ok(None),
            }
        }
    }

    /// Close the session. Safe to call on an already-closing socket.
    pub async fn close(mut self) {
        let _ = self.socket.close(None).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interim_and_final_transcripts() {
        let payload = r#"{
            "channel": {"alternatives": [{"transcript": "hello there"}]},
            "is_final": false
        }"#;
        assert_eq!(
            parse_transcript(payload),
            Some(TranscriptEvent {
                text: "hello there".to_string(),
                is_final: false
            })
        );

        let payload = r#"{
            "channel": {"alternatives": [{"transcript": "hello there."}]},
            "is_final": true
        }"#;
        assert!(parse_transcript(payload).unwrap().is_final);
    }

    #[test]
    fn non_transcript_payloads_are_none() {
        assert!(parse_transcript(r#"{"type":"Metadata","request_id":"r"}"#).is_none());
        assert!(parse_transcript("not json").is_none());
        assert!(parse_transcript(r#"{"channel":{"alternatives":[]}}"#).is_none());
    }
}
