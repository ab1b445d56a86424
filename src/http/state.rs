use crate::auth::TokenSigner;
use crate::config::Config;
use crate::relay::UpstreamDialer;
use std::sync::Arc;

/// Shared application state for HTTP handlers.
///
/// Everything in here is read-only after startup: the configuration, the
/// token signer built from the shared secret, and the upstream dialer built
/// from the server credential. Sessions share nothing else.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub signer: Arc<TokenSigner>,
    pub dialer: Arc<UpstreamDialer>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let signer = TokenSigner::new(config.token.shared_secret.clone(), config.token.ttl_ms);
        let dialer = UpstreamDialer::new(config.upstream.clone());
        Self {
            config: Arc::new(config),
            signer: Arc::new(signer),
            dialer: Arc::new(dialer),
        }
    }
}
