//! HTTP surface of the relay:
//! - GET /healthz - health check
//! - GET /relay/token - mint a signed connection URL (trusted callers)
//! - GET /stream - WebSocket upgrade, gated by the capability token

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
