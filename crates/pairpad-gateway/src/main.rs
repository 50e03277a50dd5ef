//! pairpad gateway binary.
//!
//! - Config: `pairpad.yaml` (or `$PAIRPAD_CONFIG`), strict parsing + validation
//! - WebSocket endpoint: /v1/ws?room=...&name=...
//! - Room HTTP API, /healthz and /metrics

use std::net::SocketAddr;

use tracing_subscriber::{fmt, EnvFilter};

use pairpad_gateway::{app_state::AppState, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "pairpad-gateway stopped");
        std::process::exit(1);
    }
}

async fn run() -> pairpad_core::Result<()> {
    let path = config::config_path();
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .map_err(|e| pairpad_core::PairpadError::BadRequest(format!("gateway.listen is not a socket address: {e}")))?;

    let state = AppState::from_config(cfg).await?;
    let app = router::build_router(state);

    tracing::info!(%listen, config = %path, "pairpad-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| pairpad_core::PairpadError::Transport(format!("bind {listen} failed: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| pairpad_core::PairpadError::Transport(format!("server failed: {e}")))
}
