use anyhow::{Context, Result};
use speech_relay::{create_router, AppState, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = Config::load("config/speech-relay")?;
    cfg.validate()?;

    info!("speech-relay v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Upstream: {} (model {}, language {})",
        cfg.upstream.endpoint, cfg.upstream.model, cfg.upstream.language
    );
    if let Some(dir) = &cfg.capture.audio_dir {
        info!("Debug audio capture enabled: {}", dir);
    }

    let bind_addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let app = create_router(AppState::new(cfg));

    info!("Listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
