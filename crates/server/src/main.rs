use anyhow::Result;
use blockfuse_core::config::{load_env_file, AppConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod router;
mod state;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blockfuse_core=info,server=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Interprets a Go-style `:8080` listen address as all-interfaces.
fn listen_addr(raw: &str) -> String {
    if let Some(port) = raw.strip_prefix(':') {
        return format!("0.0.0.0:{port}");
    }
    raw.to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file(".env.local");
    init_logging();

    let config = AppConfig::from_env();
    let state = state::AppState::build(&config)?;
    info!(
        el_providers = state.el.provider_count(),
        beacon = %state.beacon.source_info(),
        relays = state.relay.source_info().len(),
        "upstream clients initialized"
    );

    std::sync::Arc::clone(&state.mempool).start();

    let app = router::build(state, &config.server);
    let addr = listen_addr(&config.server.listen_addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "blockfuse listening");
    axum::serve(listener, app).await?;
    Ok(())
}
