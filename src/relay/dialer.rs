//! Upstream connection construction and handshake.

use crate::config::UpstreamConfig;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// An established upstream WebSocket.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handshake failures, split by how the client should be told.
#[derive(Debug, Error)]
pub enum DialError {
    /// Upstream answered the handshake with 403: the configured model/tier
    /// is not provisioned for this credential. The client gets a
    /// distinguishable close so it can show an actionable message instead
    /// of a retry prompt.
    #[error("upstream forbade the requested configuration")]
    Forbidden,

    /// Upstream answered with some other non-switching status.
    #[error("upstream rejected handshake with status {0}")]
    Rejected(u16),

    /// Network-level failure before or during the handshake.
    #[error("upstream transport error: {0}")]
    Transport(#[source] tokio_tungstenite::tungstenite::Error),

    /// The configured credential is not a valid header value.
    #[error("upstream credential is not a valid header value")]
    Credential,
}

/// Builds the upstream URL from server-held configuration and performs the
/// WebSocket handshake. The credential travels only in the Authorization
/// header, so it can never leak through URLs or request logs.
#[derive(Clone)]
pub struct UpstreamDialer {
    config: UpstreamConfig,
}

impl UpstreamDialer {
    pub fn new(config: UpstreamConfig) -> Self {
        Self { config }
    }

    /// The listen URL for one session. `model_hint` is the client's advisory
    /// override; it is honored only when the feature flag allows it and the
    /// hint looks like a plain model token.
    pub fn listen_url(&self, model_hint: Option<&str>) -> String {
        let cfg = &self.config;
        let model = model_hint
            .filter(|_| cfg.allow_model_override)
            .filter(|hint| is_plain_token(hint))
            .unwrap_or(&cfg.model);

        let mut url = format!(
            "{}?model={}&language={}&interim_results={}&smart_format={}&punctuate={}",
            cfg.endpoint,
            model,
            cfg.language,
            cfg.interim_results,
            cfg.smart_format,
            cfg.punctuate,
        );
        if let Some(tier) = &cfg.tier {
            url.push_str(&format!("&tier={tier}"));
        }
        if let Some(encoding) = &cfg.encoding {
            url.push_str(&format!("&encoding={encoding}"));
        }
        if let Some(sample_rate) = cfg.sample_rate {
            url.push_str(&format!("&sample_rate={sample_rate}"));
        }
        url
    }

    /// Perform the upstream handshake for one session.
    pub async fn dial(&self, model_hint: Option<&str>) -> Result<UpstreamSocket, DialError> {
        let url = self.listen_url(model_hint);
        debug!(endpoint = %self.config.endpoint, "dialing upstream");

        let mut request = url
            .into_client_request()
            .map_err(DialError::Transport)?;
        let credential = format!("Token {}", self.config.api_key);
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&credential).map_err(|_| DialError::Credential)?,
        );

        match connect_async(request).await {
            Ok((socket, _response)) => {
                info!("upstream handshake complete");
                Ok(socket)
            }
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                let status = response.status().as_u16();
                if status == 403 {
                    Err(DialError::Forbidden)
                } else {
                    Err(DialError::Rejected(status))
                }
            }
            Err(err) => Err(DialError::Transport(err)),
        }
    }
}

/// Advisory hints must look like bare model identifiers; anything else is
/// ignored rather than spliced into the upstream URL.
fn is_plain_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
