use anyhow::{bail, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub token: TokenConfig,
    pub upstream: UpstreamConfig,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Capability-token settings shared by the issuer endpoint and the listener.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// HMAC signing secret shared with the token issuer. Required.
    pub shared_secret: String,

    /// How long a minted token stays valid, in milliseconds.
    pub ttl_ms: u64,

    /// Externally reachable WebSocket URL for the /stream endpoint,
    /// e.g. "wss://relay.example.com/stream". The issuer embeds signed
    /// parameters into this URL; issuance fails while it is unset.
    pub public_url: Option<String>,
}

/// Parameters for the upstream speech-recognition connection.
///
/// Everything here is server-trusted configuration. The only client input
/// that can influence the upstream dial is the advisory model hint, and only
/// when `allow_model_override` is enabled.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Upstream API credential. Required; sent as an Authorization header,
    /// never as a URL parameter.
    pub api_key: String,

    /// Upstream listen endpoint (overridable for tests).
    pub endpoint: String,

    pub model: String,
    pub language: String,
    pub interim_results: bool,
    pub smart_format: bool,
    pub punctuate: bool,

    /// Optional quality tier (the knob that yields HTTP 403 on projects not
    /// provisioned for it).
    pub tier: Option<String>,
    pub encoding: Option<String>,
    pub sample_rate: Option<u32>,

    /// When true, a client may pass `model=` on the upgrade URL as an
    /// advisory hint for the upstream model parameter.
    pub allow_model_override: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Directory for debug audio dumps (one raw file per session).
    /// Capture is disabled while unset.
    pub audio_dir: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut settings = config::Config::builder()
            .set_default("service.name", "speech-relay")?
            .set_default("service.http.bind", "0.0.0.0")?
            .set_default("service.http.port", 3000)?
            .set_default("token.shared_secret", "")?
            .set_default("token.ttl_ms", 30_000)?
            .set_default("upstream.api_key", "")?
            .set_default("upstream.endpoint", "wss://api.deepgram.com/v1/listen")?
            .set_default("upstream.model", "nova-3")?
            .set_default("upstream.language", "en-AU")?
            .set_default("upstream.interim_results", true)?
            .set_default("upstream.smart_format", true)?
            .set_default("upstream.punctuate", true)?
            .set_default("upstream.allow_model_override", false)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("RELAY").separator("__"));

        // Deployment-conventional variables that don't follow the RELAY__
        // prefix scheme.
        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("service.http.port", port)?;
        }
        if let Ok(key) = env::var("DEEPGRAM_API_KEY") {
            settings = settings.set_override("upstream.api_key", key)?;
        }
        if let Ok(language) = env::var("DEEPGRAM_LANGUAGE") {
            settings = settings.set_override("upstream.language", language)?;
        }
        if let Ok(secret) = env::var("RELAY_SHARED_SECRET") {
            settings = settings.set_override("token.shared_secret", secret)?;
        }
        if let Ok(url) = env::var("RELAY_PUBLIC_WS_URL") {
            settings = settings.set_override("token.public_url", url)?;
        }

        Ok(settings.build()?.try_deserialize()?)
    }

    /// Startup validation. A missing credential or signing secret is a fatal
    /// configuration error, not something to discover on the first session.
    pub fn validate(&self) -> Result<()> {
        if self.upstream.api_key.is_empty() {
            bail!("upstream.api_key is not set (DEEPGRAM_API_KEY)");
        }
        if self.token.shared_secret.is_empty() {
            bail!("token.shared_secret is not set (RELAY_SHARED_SECRET)");
        }
        if self.service.http.port == 0 {
            bail!("service.http.port cannot be 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            service: ServiceConfig {
                name: "speech-relay".to_string(),
                http: HttpConfig {
                    bind: "127.0.0.1".to_string(),
                    port: 3000,
                },
            },
            token: TokenConfig {
                shared_secret: "s3cret".to_string(),
                ttl_ms: 30_000,
                public_url: None,
            },
            upstream: UpstreamConfig {
                api_key: "dg-key".to_string(),
                endpoint: "wss://api.deepgram.com/v1/listen".to_string(),
                model: "nova-3".to_string(),
                language: "en-AU".to_string(),
                interim_results: true,
                smart_format: true,
                punctuate: true,
                tier: None,
                encoding: None,
                sample_rate: None,
                allow_model_override: false,
            },
            capture: CaptureConfig { audio_dir: None },
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let mut cfg = test_config();
        cfg.upstream.api_key = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_secret_is_fatal() {
        let mut cfg = test_config();
        cfg.token.shared_secret = String::new();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_ttl_is_allowed() {
        // A zero window still accepts a token arriving at its exact issue
        // time; tightness is the operator's call.
        let mut cfg = test_config();
        cfg.token.ttl_ms = 0;
        assert!(cfg.validate().is_ok());
    }
}
