pub mod auth;
pub mod client;
pub mod config;
pub mod http;
pub mod relay;

pub use auth::{MintedToken, TokenError, TokenSigner};
pub use client::{RelayClient, RelayConnection, RelayEvent, TranscriptEvent};
pub use config::Config;
pub use http::{create_router, AppState};
pub use relay::{AudioCapture, DialError, RelaySession, StreamParams, UpstreamDialer};
